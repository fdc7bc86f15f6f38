//! One-time invitation tokens for account activation.
//!
//! Only the SHA-256 digest of a token is persisted. The plaintext is handed to
//! the caller once, wrapped in a `SecretString`, and never logged.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::store::{InvitationStore, NewInvitation, NewUser, StoreError, User, UserStore};

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum InvitationError {
    #[error("invitation not found")]
    NotFound,
    #[error("failed to generate invitation token: {0}")]
    Entropy(String),
    #[error("invalid invitation ttl")]
    Ttl,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Generate a fresh plaintext token: 256 bits from the OS RNG, URL-safe base64.
///
/// # Errors
/// Returns an error if the OS RNG fails.
pub fn generate_token() -> Result<SecretString, InvitationError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| InvitationError::Entropy(e.to_string()))?;
    Ok(SecretString::from(Base64UrlUnpadded::encode_string(&bytes)))
}

/// Lowercase hex SHA-256 of the plaintext, the only form that is stored.
#[must_use]
pub fn digest(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct InvitationManager {
    users: Arc<dyn UserStore>,
    invitations: Arc<dyn InvitationStore>,
}

impl InvitationManager {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, invitations: Arc<dyn InvitationStore>) -> Self {
        Self { users, invitations }
    }

    fn invitation_for(
        plaintext: &SecretString,
        ttl: Duration,
    ) -> Result<NewInvitation, InvitationError> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or(InvitationError::Ttl)?;
        Ok(NewInvitation {
            digest: digest(plaintext.expose_secret()),
            expires_at,
        })
    }

    /// Persist a new invitation for an existing user and return its plaintext.
    ///
    /// # Errors
    /// Returns an error if token generation or storage fails.
    #[instrument(skip(self))]
    pub async fn issue_invitation(
        &self,
        user_id: i64,
        ttl: Duration,
    ) -> Result<SecretString, InvitationError> {
        let plaintext = generate_token()?;
        let invitation = Self::invitation_for(&plaintext, ttl)?;
        self.invitations
            .create_invitation(user_id, invitation)
            .await?;
        debug!(user_id, "invitation issued");
        Ok(plaintext)
    }

    /// Create an inactive user together with its invitation.
    ///
    /// # Errors
    /// `StoreError::Conflict` (wrapped) for a duplicate email or username.
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn register(
        &self,
        user: NewUser,
        ttl: Duration,
    ) -> Result<(User, SecretString), InvitationError> {
        let plaintext = generate_token()?;
        let invitation = Self::invitation_for(&plaintext, ttl)?;
        let created = self.users.create_and_invite(user, invitation).await?;
        debug!(user_id = created.id, "user registered with pending invitation");
        Ok((created, plaintext))
    }

    /// Consume the invitation and activate its user.
    ///
    /// # Errors
    /// `InvitationError::NotFound` when the token is unknown, expired or
    /// already used.
    #[instrument(skip_all)]
    pub async fn activate(&self, plaintext: &str) -> Result<(), InvitationError> {
        let digest = digest(plaintext);
        match self.invitations.activate(&digest, Utc::now()).await {
            Ok(user_id) => {
                debug!(user_id, "user activated");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(InvitationError::NotFound),
            Err(err) => Err(err.into()),
        }
    }
}
