//! In-memory storage used by tests and local runs without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::Mutex;

use super::{
    FollowerStore, InvitationStore, NewInvitation, NewPost, NewUser, Post, PostPatch, PostStore,
    Role, RoleStore, Storage, StoreError, User, UserCredentials, UserStore,
};

#[derive(Debug, Default)]
struct Inner {
    roles: Vec<Role>,
    users: HashMap<i64, UserCredentials>,
    invitations: HashMap<String, (i64, DateTime<Utc>)>,
    posts: HashMap<i64, Post>,
    // (user_id, follower_id)
    followers: HashSet<(i64, i64)>,
    next_user_id: i64,
    next_post_id: i64,
}

/// All stores over one lock, so multi-row operations stay atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    user_lookups: AtomicUsize,
}

impl MemoryStore {
    /// Store seeded with the `user`, `moderator` and `admin` roles.
    #[must_use]
    pub fn seeded() -> Self {
        let roles = vec![
            Role {
                id: 1,
                name: "user".to_string(),
                description: "A user can create posts and comments".to_string(),
                level: 1,
            },
            Role {
                id: 2,
                name: "moderator".to_string(),
                description: "A moderator can update other users posts".to_string(),
                level: 2,
            },
            Role {
                id: 3,
                name: "admin".to_string(),
                description: "An admin can update and delete other users posts".to_string(),
                level: 3,
            },
        ];
        Self {
            inner: Mutex::new(Inner {
                roles,
                next_user_id: 1,
                next_post_id: 1,
                ..Inner::default()
            }),
            user_lookups: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn into_storage(self: Arc<Self>) -> Storage {
        Storage {
            users: self.clone(),
            roles: self.clone(),
            invitations: self.clone(),
            posts: self.clone(),
            followers: self,
        }
    }

    /// Whether `follower_id` currently follows `user_id`.
    pub async fn is_following(&self, follower_id: i64, user_id: i64) -> bool {
        self.inner
            .lock()
            .await
            .followers
            .contains(&(user_id, follower_id))
    }

    /// Number of `UserStore::get_by_id` calls served so far.
    #[must_use]
    pub fn user_lookups(&self) -> usize {
        self.user_lookups.load(Ordering::SeqCst)
    }

    /// Insert a user directly with the given id and role, bypassing invitations.
    ///
    /// # Errors
    /// `StoreError::NotFound` if the role is unknown.
    pub async fn insert_user(
        &self,
        id: i64,
        username: &str,
        role: &str,
        password_hash: &str,
        is_active: bool,
    ) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().await;
        let role = inner
            .roles
            .iter()
            .find(|candidate| candidate.name == role)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        let user = User {
            id,
            username: username.to_string(),
            email: format!("{username}@agora.test"),
            role,
            is_active,
            created_at: Utc::now(),
        };
        inner.users.insert(
            id,
            UserCredentials {
                user: user.clone(),
                password_hash: password_hash.to_string(),
            },
        );
        inner.next_user_id = inner.next_user_id.max(id + 1);
        Ok(user)
    }

    /// Insert a post owned by `user_id` with a fixed id.
    pub async fn insert_post(&self, id: i64, user_id: i64, title: &str) -> Post {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let post = Post {
            id,
            user_id,
            title: title.to_string(),
            content: String::new(),
            tags: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        inner.posts.insert(id, post.clone());
        inner.next_post_id = inner.next_post_id.max(id + 1);
        post
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock().await;
        inner
            .users
            .get(&id)
            .map(|credentials| credentials.user.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn get_credentials(&self, email: &str) -> Result<UserCredentials, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .users
            .values()
            .find(|credentials| credentials.user.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_and_invite(
        &self,
        user: NewUser,
        invitation: NewInvitation,
    ) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.users.values().any(|c| c.user.email == user.email) {
            return Err(StoreError::Conflict("email"));
        }
        if inner.users.values().any(|c| c.user.username == user.username) {
            return Err(StoreError::Conflict("username"));
        }
        let role = inner
            .roles
            .iter()
            .find(|candidate| candidate.name == user.role)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        let id = inner.next_user_id;
        inner.next_user_id += 1;
        let created = User {
            id,
            username: user.username,
            email: user.email,
            role,
            is_active: false,
            created_at: Utc::now(),
        };
        inner.users.insert(
            id,
            UserCredentials {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        inner
            .invitations
            .insert(invitation.digest, (id, invitation.expires_at));
        Ok(created)
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn get_by_name(&self, name: &str) -> Result<Role, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .roles
            .iter()
            .find(|role| role.name == name)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl InvitationStore for MemoryStore {
    async fn create_invitation(
        &self,
        user_id: i64,
        invitation: NewInvitation,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        inner
            .invitations
            .insert(invitation.digest, (user_id, invitation.expires_at));
        Ok(())
    }

    async fn activate(&self, digest: &str, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        let user_id = match inner.invitations.get(digest) {
            Some((user_id, expires_at)) if *expires_at > now => *user_id,
            _ => return Err(StoreError::NotFound),
        };
        let credentials = inner.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        credentials.user.is_active = true;
        inner.invitations.remove(digest);
        Ok(user_id)
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create(&self, post: NewPost) -> Result<Post, StoreError> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_post_id;
        inner.next_post_id += 1;
        let now = Utc::now();
        let created = Post {
            id,
            user_id: post.user_id,
            title: post.title,
            content: post.content,
            tags: post.tags,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        inner.posts.insert(id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Post, StoreError> {
        let inner = self.inner.lock().await;
        inner.posts.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update(&self, id: i64, patch: PostPatch) -> Result<Post, StoreError> {
        let mut inner = self.inner.lock().await;
        let post = inner.posts.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(title) = patch.title {
            post.title = title;
        }
        if let Some(content) = patch.content {
            post.content = content;
        }
        post.version += 1;
        post.updated_at = Utc::now();
        Ok(post.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .posts
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl FollowerStore for MemoryStore {
    async fn follow(&self, follower_id: i64, user_id: i64) -> Result<(), StoreError> {
        if follower_id == user_id {
            return Err(StoreError::Conflict("self"));
        }
        let mut inner = self.inner.lock().await;
        if !inner.users.contains_key(&user_id) || !inner.users.contains_key(&follower_id) {
            return Err(StoreError::NotFound);
        }
        if !inner.followers.insert((user_id, follower_id)) {
            return Err(StoreError::Conflict("follow"));
        }
        Ok(())
    }

    async fn unfollow(&self, follower_id: i64, user_id: i64) -> Result<(), StoreError> {
        if follower_id == user_id {
            return Err(StoreError::Conflict("self"));
        }
        self.inner
            .lock()
            .await
            .followers
            .remove(&(user_id, follower_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "hash".to_string(),
            role: "user".to_string(),
        }
    }

    fn invitation(digest: &str, ttl: Duration) -> NewInvitation {
        NewInvitation {
            digest: digest.to_string(),
            expires_at: Utc::now() + ttl,
        }
    }

    #[tokio::test]
    async fn create_and_invite_rejects_duplicates() {
        let store = MemoryStore::seeded();
        let created = store
            .create_and_invite(new_user("alice"), invitation("d1", Duration::hours(1)))
            .await;
        assert!(matches!(created, Ok(ref user) if !user.is_active && user.role.level == 1));

        let duplicate = store
            .create_and_invite(new_user("alice"), invitation("d2", Duration::hours(1)))
            .await;
        assert!(matches!(duplicate, Err(StoreError::Conflict("email"))));
    }

    #[tokio::test]
    async fn activate_consumes_invitation() {
        let store = MemoryStore::seeded();
        let user = store
            .create_and_invite(new_user("bob"), invitation("digest", Duration::hours(1)))
            .await
            .expect("user created");

        let activated = store.activate("digest", Utc::now()).await;
        assert!(matches!(activated, Ok(id) if id == user.id));
        assert!(
            UserStore::get_by_id(&store, user.id)
                .await
                .is_ok_and(|u| u.is_active)
        );

        let replay = store.activate("digest", Utc::now()).await;
        assert!(matches!(replay, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn activate_rejects_expired_invitation() {
        let store = MemoryStore::seeded();
        store
            .create_and_invite(new_user("carol"), invitation("old", Duration::seconds(-1)))
            .await
            .expect("user created");
        let result = store.activate("old", Utc::now()).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn post_update_bumps_version() {
        let store = MemoryStore::seeded();
        store.insert_post(10, 2, "hello").await;
        let updated = store
            .update(
                10,
                PostPatch {
                    title: Some("edited".to_string()),
                    content: None,
                },
            )
            .await
            .expect("post updated");
        assert_eq!(updated.title, "edited");
        assert_eq!(updated.version, 1);
        assert!(matches!(store.delete(10).await, Ok(())));
        assert!(matches!(store.delete(10).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn follow_edges() {
        let store = MemoryStore::seeded();
        store.insert_user(2, "alice", "user", "hash", true).await.expect("alice");
        store.insert_user(3, "bob", "user", "hash", true).await.expect("bob");

        assert!(matches!(store.follow(3, 2).await, Ok(())));
        assert!(store.is_following(3, 2).await);
        assert!(!store.is_following(2, 3).await);

        assert!(matches!(store.follow(3, 2).await, Err(StoreError::Conflict("follow"))));
        assert!(matches!(store.follow(3, 3).await, Err(StoreError::Conflict("self"))));
        assert!(matches!(store.follow(3, 99).await, Err(StoreError::NotFound)));

        assert!(matches!(store.unfollow(3, 2).await, Ok(())));
        assert!(!store.is_following(3, 2).await);
        // Removing a missing edge is not an error
        assert!(matches!(store.unfollow(3, 2).await, Ok(())));
        assert!(matches!(store.unfollow(2, 2).await, Err(StoreError::Conflict("self"))));
    }
}
