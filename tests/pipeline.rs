//! End-to-end checks of the request pipeline over the in-memory stores.

use agora::{
    agora::{AppConfig, AppState, router},
    auth::{
        BasicAuthConfig, JwtAuthenticator, RateLimiter, TokenAuthenticator, UserResolver,
        password, rate_limit::FixedWindowLimiter,
    },
    cache::memory::MemoryUserCache,
    store::memory::MemoryStore,
};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use base64ct::{Base64, Encoding};
use chrono::Utc;
use secrecy::SecretString;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

const TOKEN_SECRET: &str = "pipeline-test-secret";
const SERVICE: &str = "agora-test";
const OPERATOR_USER: &str = "ops";
const OPERATOR_PASS: &str = "hunter2";

fn authenticator() -> JwtAuthenticator {
    JwtAuthenticator::new(
        &SecretString::from(TOKEN_SECRET),
        SERVICE,
        Duration::from_secs(3600),
    )
    .expect("authenticator")
}

fn state(store: &Arc<MemoryStore>) -> AppState {
    AppState::new(
        store.clone().into_storage(),
        Arc::new(authenticator()),
        AppConfig::new(BasicAuthConfig {
            username: OPERATOR_USER.to_string(),
            password: SecretString::from(OPERATOR_PASS),
        }),
    )
    .expect("state")
}

fn app(store: &Arc<MemoryStore>) -> Router {
    router(state(store))
}

fn bearer(user_id: i64) -> String {
    let token = authenticator().issue_for(user_id).expect("token");
    format!("Bearer {token}")
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.expect("infallible")
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// Users 1 (admin), 2 (user, post owner) and 3 (user), with post 10 owned by 2.
async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::seeded());
    store
        .insert_user(1, "root", "admin", "unused", true)
        .await
        .expect("admin");
    store
        .insert_user(2, "alice", "user", "unused", true)
        .await
        .expect("alice");
    store
        .insert_user(3, "bob", "user", "unused", true)
        .await
        .expect("bob");
    store.insert_post(10, 2, "hello").await;
    store
}

#[tokio::test]
async fn admin_deletes_foreign_post() {
    let store = seeded_store().await;
    let app = app(&store);

    let request = Request::builder()
        .method("DELETE")
        .uri("/v1/posts/10")
        .header(header::AUTHORIZATION, bearer(1))
        .body(Body::empty())
        .expect("request");
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let request = Request::builder()
        .uri("/v1/posts/10")
        .header(header::AUTHORIZATION, bearer(1))
        .body(Body::empty())
        .expect("request");
    assert_eq!(send(&app, request).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn plain_user_cannot_patch_foreign_post() {
    let store = seeded_store().await;
    let app = app(&store);

    let mut request = json_request("PATCH", "/v1/posts/10", &json!({ "title": "mine now" }));
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, bearer(3).parse().expect("header"));
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await, json!({ "error": "forbidden" }));
}

#[tokio::test]
async fn owner_patches_own_post() {
    let store = seeded_store().await;
    let app = app(&store);

    let mut request = json_request("PATCH", "/v1/posts/10", &json!({ "title": "edited" }));
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, bearer(2).parse().expect("header"));
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["title"], "edited");
    assert_eq!(body["version"], 1);
}

#[tokio::test]
async fn expired_token_rejected_before_resolution() {
    let store = seeded_store().await;
    let app = app(&store);

    let auth = authenticator();
    let claims = auth.claims_for(1, Utc::now().timestamp() - 7200);
    let token = auth.generate_token(&claims).expect("token");

    let request = Request::builder()
        .method("DELETE")
        .uri("/v1/posts/10")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request");
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({ "error": "unauthorized" }));
    assert_eq!(store.user_lookups(), 0);
}

#[tokio::test]
async fn foreign_signature_and_missing_header_rejected() {
    let store = seeded_store().await;
    let app = app(&store);

    let forged = JwtAuthenticator::new(
        &SecretString::from("someone-else"),
        SERVICE,
        Duration::from_secs(3600),
    )
    .expect("authenticator")
    .issue_for(1)
    .expect("token");

    for authorization in [Some(format!("Bearer {forged}")), Some("Token abc".to_string()), None] {
        let mut builder = Request::builder().uri("/v1/users/1");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let response = send(&app, builder.body(Body::empty()).expect("request")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    assert_eq!(store.user_lookups(), 0);
}

#[tokio::test]
async fn token_for_deleted_user_is_unauthorized() {
    let store = seeded_store().await;
    let app = app(&store);

    let request = Request::builder()
        .uri("/v1/users/1")
        .header(header::AUTHORIZATION, bearer(404))
        .body(Body::empty())
        .expect("request");
    assert_eq!(send(&app, request).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cached_principal_skips_storage() {
    let store = seeded_store().await;
    let cache = Arc::new(MemoryUserCache::new());
    let resolver = UserResolver::new(store.clone().into_storage().users).with_cache(cache.clone());
    let app = router(state(&store).with_resolver(resolver));

    for _ in 0..3 {
        let request = Request::builder()
            .uri("/v1/users/2")
            .header(header::AUTHORIZATION, bearer(2))
            .body(Body::empty())
            .expect("request");
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["username"], "alice");
    }

    assert_eq!(store.user_lookups(), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn register_activate_login_flow() {
    let store = Arc::new(MemoryStore::seeded());
    let app = app(&store);

    let registration = json!({
        "username": "carol",
        "email": "carol@example.com",
        "password": "correct horse"
    });
    let response = send(
        &app,
        json_request("POST", "/v1/authentication/user", &registration),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["user"]["is_active"], false);
    assert_eq!(body["user"]["role"]["name"], "user");
    let invitation = body["token"].as_str().expect("invitation").to_string();
    let user_id = body["user"]["id"].as_i64().expect("id");

    // Same email again
    let response = send(
        &app,
        json_request("POST", "/v1/authentication/user", &registration),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let login = json!({ "email": "carol@example.com", "password": "correct horse" });

    // Inactive accounts cannot log in
    let response = send(&app, json_request("POST", "/v1/authentication/token", &login)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let activate = |token: &str| {
        Request::builder()
            .method("PUT")
            .uri(format!("/v1/users/activate/{token}"))
            .body(Body::empty())
            .expect("request")
    };
    assert_eq!(
        send(&app, activate(&invitation)).await.status(),
        StatusCode::NO_CONTENT
    );
    // Single use
    assert_eq!(
        send(&app, activate(&invitation)).await.status(),
        StatusCode::NOT_FOUND
    );

    let wrong = json!({ "email": "carol@example.com", "password": "wrong horse" });
    let response = send(&app, json_request("POST", "/v1/authentication/token", &wrong)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, json_request("POST", "/v1/authentication/token", &login)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let token = json_body(response).await["token"]
        .as_str()
        .expect("token")
        .to_string();

    let request = Request::builder()
        .uri(format!("/v1/users/{user_id}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request");
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["email"], "carol@example.com");
}

#[tokio::test]
async fn invalid_registration_is_bad_request() {
    let store = Arc::new(MemoryStore::seeded());
    let app = app(&store);

    let response = send(
        &app,
        json_request(
            "POST",
            "/v1/authentication/user",
            &json!({ "username": "dave", "email": "not-an-email", "password": "secret" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_with_prehashed_password() {
    let store = Arc::new(MemoryStore::seeded());
    let hash = password::hash("letmein").expect("hash");
    store
        .insert_user(7, "erin", "moderator", &hash, true)
        .await
        .expect("erin");
    let app = app(&store);

    let response = send(
        &app,
        json_request(
            "POST",
            "/v1/authentication/token",
            &json!({ "email": "erin@agora.test", "password": "letmein" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let token = json_body(response).await["token"]
        .as_str()
        .expect("token")
        .to_string();
    let claims = authenticator().validate_token(&token).expect("claims");
    assert_eq!(claims.sub, 7);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_window_rolls_over() {
    let store = Arc::new(MemoryStore::seeded());
    let limiter: Arc<dyn RateLimiter> =
        Arc::new(FixedWindowLimiter::new(20, Duration::from_secs(5)));
    let app = router(state(&store).with_rate_limiter(limiter));

    let health = |client: &str| {
        Request::builder()
            .uri("/v1/health")
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .expect("request")
    };

    for _ in 0..20 {
        assert_eq!(send(&app, health("203.0.113.7")).await.status(), StatusCode::OK);
    }

    let response = send(&app, health("203.0.113.7")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    // Other clients keep their own window
    assert_eq!(send(&app, health("198.51.100.1")).await.status(), StatusCode::OK);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(send(&app, health("203.0.113.7")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn openapi_requires_operator_credentials() {
    let store = Arc::new(MemoryStore::seeded());
    let app = app(&store);

    let response = send(
        &app,
        Request::builder()
            .uri("/v1/openapi.json")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok()),
        Some(r#"Basic realm="restricted", charset="UTF-8""#)
    );

    let wrong = Base64::encode_string(format!("{OPERATOR_USER}:nope").as_bytes());
    let response = send(
        &app,
        Request::builder()
            .uri("/v1/openapi.json")
            .header(header::AUTHORIZATION, format!("Basic {wrong}"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let good = Base64::encode_string(format!("{OPERATOR_USER}:{OPERATOR_PASS}").as_bytes());
    let response = send(
        &app,
        Request::builder()
            .uri("/v1/openapi.json")
            .header(header::AUTHORIZATION, format!("Basic {good}"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let document = json_body(response).await;
    assert!(document["paths"]["/v1/posts/{id}"].is_object());
}

#[tokio::test]
async fn request_id_is_generated_or_propagated() {
    let store = Arc::new(MemoryStore::seeded());
    let app = app(&store);

    let response = send(
        &app,
        Request::builder()
            .uri("/v1/health")
            .header("x-request-id", "req-123")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok()),
        Some("req-123")
    );

    let response = send(
        &app,
        Request::builder()
            .uri("/v1/health")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    let generated = response
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    assert!(generated.is_some_and(|id| ulid::Ulid::from_string(&id).is_ok()));
    assert!(response.headers().contains_key("x-app"));
}

#[tokio::test]
async fn follow_and_unfollow() {
    let store = seeded_store().await;
    let app = app(&store);

    let put = |uri: &str, user_id: i64| {
        Request::builder()
            .method("PUT")
            .uri(uri)
            .header(header::AUTHORIZATION, bearer(user_id))
            .body(Body::empty())
            .expect("request")
    };

    let response = send(&app, put("/v1/users/2/follow", 3)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(store.is_following(3, 2).await);

    let response = send(&app, put("/v1/users/2/follow", 3)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        json_body(response).await,
        json!({ "error": "already following that user" })
    );

    let response = send(&app, put("/v1/users/3/follow", 3)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = send(&app, put("/v1/users/404/follow", 3)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, put("/v1/users/2/unfollow", 3)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!store.is_following(3, 2).await);

    // Repeating an unfollow is harmless
    let response = send(&app, put("/v1/users/2/unfollow", 3)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn follow_requires_bearer_token() {
    let store = seeded_store().await;
    let app = app(&store);

    let request = Request::builder()
        .method("PUT")
        .uri("/v1/users/2/follow")
        .body(Body::empty())
        .expect("request");
    assert_eq!(send(&app, request).await.status(), StatusCode::UNAUTHORIZED);
    assert!(!store.is_following(3, 2).await);
}

#[tokio::test]
async fn extra_whitespace_after_bearer_scheme_rejected() {
    let store = seeded_store().await;
    let app = app(&store);

    let token = authenticator().issue_for(2).expect("token");
    for authorization in [format!("Bearer   {token}"), format!("Bearer {token} ")] {
        let request = Request::builder()
            .uri("/v1/users/2")
            .header(header::AUTHORIZATION, authorization)
            .body(Body::empty())
            .expect("request");
        assert_eq!(send(&app, request).await.status(), StatusCode::UNAUTHORIZED);
    }
    assert_eq!(store.user_lookups(), 0);
}

#[tokio::test]
async fn unknown_email_and_wrong_password_look_alike() {
    let store = Arc::new(MemoryStore::seeded());
    let hash = password::hash("letmein").expect("hash");
    store
        .insert_user(7, "erin", "user", &hash, true)
        .await
        .expect("erin");
    let app = app(&store);

    let mut bodies = Vec::new();
    for email in ["erin@agora.test", "nobody@agora.test"] {
        let response = send(
            &app,
            json_request(
                "POST",
                "/v1/authentication/token",
                &json!({ "email": email, "password": "wrong" }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(json_body(response).await);
    }
    assert_eq!(bodies[0], bodies[1]);
}
