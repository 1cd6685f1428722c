//! API Integration Tests
//!
//! Drive the full router in-process with `tower::ServiceExt::oneshot`,
//! backed by the in-memory user and revocation stores.
//!
//! Author: hephaex@gmail.com

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use scribe_api::auth::{auth_middleware, current_user};
use scribe_api::{create_router, state::AppState};
use scribe_core::config::AppConfig;
use scribe_core::user::InMemoryUserRepository;
use scribe_core::{
    Identity, PasswordConfig, PasswordHasher, Role, TokenClaims, TokenType, UserRepository,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const ALICE_PASSWORD: &str = "alice-pass-1";
const ROOT_PASSWORD: &str = "root-pass-1";

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    users: Arc<InMemoryUserRepository>,
}

// Light Argon2 parameters keep logins fast
fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.password = PasswordConfig {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
        output_len: Some(32),
    };
    config
}

fn setup_with(config: AppConfig) -> TestApp {
    let hasher = PasswordHasher::new(config.password.clone()).unwrap();
    let users = Arc::new(InMemoryUserRepository::new());
    users
        .create("alice", &hasher.hash(ALICE_PASSWORD).unwrap(), Role::User)
        .unwrap();
    users
        .create("root", &hasher.hash(ROOT_PASSWORD).unwrap(), Role::Admin)
        .unwrap();

    let state = Arc::new(AppState::in_memory(config, users.clone()).unwrap());
    TestApp {
        router: create_router(state.clone()),
        state,
        users,
    }
}

fn setup() -> TestApp {
    setup_with(test_config())
}

/// Helper to create a test request
fn create_json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn login(app: &TestApp, username: &str, password: &str) -> (StatusCode, Value) {
    send(
        &app.router,
        create_json_request(
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": username, "password": password })),
        ),
    )
    .await
}

async fn login_tokens(app: &TestApp, username: &str, password: &str) -> (String, String) {
    let (status, body) = login(app, username, password).await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    (
        body["token"].as_str().unwrap().to_string(),
        body["refreshToken"].as_str().unwrap().to_string(),
    )
}

async fn me(app: &TestApp, token: Option<&str>) -> (StatusCode, Value) {
    send(
        &app.router,
        create_json_request("GET", "/api/v1/users/bloguser/me", token, None),
    )
    .await
}

// =============================================================================
// Health and documentation
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = setup();
    let (status, json) = send(
        &app.router,
        Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert!(json["uptime_seconds"].is_number());
}

#[tokio::test]
async fn test_openapi_document() {
    let app = setup();
    let (status, json) = send(
        &app.router,
        create_json_request("GET", "/api-docs/openapi.json", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/v1/auth/login"].is_object());
    assert!(json["components"]["securitySchemes"]["bearer_auth"].is_object());
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_success() {
    let app = setup();
    let (status, json) = login(&app, "alice", ALICE_PASSWORD).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["tokenType"], "Bearer");
    assert_eq!(json["expiresIn"], 30 * 60);
    assert_eq!(json["token"].as_str().unwrap().split('.').count(), 3);
    assert!(json["refreshToken"].is_string());
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = setup();
    let corrupt = app.users.create("mallory", "not-a-hash", Role::User).unwrap();
    let inactive = app
        .users
        .create(
            "dormant",
            &app.state.passwords.hash(ALICE_PASSWORD).unwrap(),
            Role::User,
        )
        .unwrap();
    app.users.set_active(inactive.id, false).unwrap();

    for (username, password) in [
        ("alice", "wrong-password"),
        ("nobody", ALICE_PASSWORD),
        (corrupt.username.as_str(), ALICE_PASSWORD),
        ("dormant", ALICE_PASSWORD),
    ] {
        let (status, json) = login(&app, username, password).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{username}");
        assert_eq!(json["code"], "INVALID_CREDENTIALS", "{username}");
    }
}

async fn fastest_login(app: &TestApp, username: &str, password: &str) -> std::time::Duration {
    let mut best = std::time::Duration::MAX;
    for _ in 0..3 {
        let started = std::time::Instant::now();
        let (status, _) = login(app, username, password).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{username}");
        best = best.min(started.elapsed());
    }
    best
}

#[tokio::test]
async fn test_login_failures_take_comparable_time() {
    let mut config = test_config();
    config.password.memory_cost = 8192;
    config.password.time_cost = 2;
    let app = setup_with(config);
    app.users.create("mallory", "not-a-hash", Role::User).unwrap();
    let dormant = app
        .users
        .create(
            "dormant",
            &app.state.passwords.hash(ALICE_PASSWORD).unwrap(),
            Role::User,
        )
        .unwrap();
    app.users.set_active(dormant.id, false).unwrap();

    let wrong_password = fastest_login(&app, "alice", "wrong-password").await;
    for username in ["nobody", "mallory", "dormant"] {
        let elapsed = fastest_login(&app, username, ALICE_PASSWORD).await;
        assert!(
            elapsed * 4 >= wrong_password,
            "{username} took {elapsed:?}, wrong password took {wrong_password:?}"
        );
    }
}

#[tokio::test]
async fn test_login_upgrades_outdated_hash() {
    let app = setup();
    let old = PasswordHasher::new(PasswordConfig {
        memory_cost: 256,
        time_cost: 1,
        parallelism: 1,
        output_len: Some(32),
    })
    .unwrap();
    let user = app
        .users
        .create("legacy", &old.hash("legacy-pass-1").unwrap(), Role::User)
        .unwrap();
    assert!(app.state.passwords.needs_upgrade(&user.password_hash));

    let (status, _) = login(&app, "legacy", "legacy-pass-1").await;
    assert_eq!(status, StatusCode::OK);

    let stored = app.state.users.find_by_id(user.id).await.unwrap().unwrap();
    assert_ne!(stored.password_hash, user.password_hash);
    assert!(stored.password_hash.contains("m=1024"));
    assert!(!app.state.passwords.needs_upgrade(&stored.password_hash));

    // Still logs in with the upgraded hash
    let (status, _) = login(&app, "legacy", "legacy-pass-1").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_migrates_bcrypt_hash() {
    let app = setup();
    let user = app
        .users
        .create(
            "old-timer",
            &bcrypt::hash("bcrypt-pass-1", 4).unwrap(),
            Role::User,
        )
        .unwrap();

    let (status, _) = login(&app, "old-timer", "bcrypt-pass-1").await;
    assert_eq!(status, StatusCode::OK);

    let stored = app.state.users.find_by_id(user.id).await.unwrap().unwrap();
    assert!(stored.password_hash.starts_with("$argon2id$"));
}

#[tokio::test]
async fn test_failed_login_keeps_hash() {
    let app = setup();
    let before = app.state.users.find_by_username("alice").await.unwrap().unwrap();

    let (status, _) = login(&app, "alice", "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let after = app.state.users.find_by_username("alice").await.unwrap().unwrap();
    assert_eq!(before.password_hash, after.password_hash);
}

// =============================================================================
// Middleware
// =============================================================================

#[tokio::test]
async fn test_token_required_vs_invalid() {
    let app = setup();

    let (status, json) = me(&app, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "TOKEN_REQUIRED");

    let (status, json) = me(&app, Some("garbage.token.value")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_scenario_a_me_returns_identity() {
    let app = setup();
    let (access, _) = login_tokens(&app, "alice", ALICE_PASSWORD).await;

    let (status, json) = me(&app, Some(&access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_id"], 1);
    assert_eq!(json["username"], "alice");
    assert_eq!(json["role"], "user");
}

#[tokio::test]
async fn test_bare_token_accepted() {
    let app = setup();
    let (access, _) = login_tokens(&app, "alice", ALICE_PASSWORD).await;

    let request = Request::builder()
        .uri("/api/v1/users/bloguser/me")
        .header(header::AUTHORIZATION, access)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_token_rejected_as_access() {
    let app = setup();
    let (_, refresh) = login_tokens(&app, "alice", ALICE_PASSWORD).await;

    let (status, json) = me(&app, Some(&refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let app = setup();
    let now = chrono::Utc::now().timestamp();
    let claims = TokenClaims::new(
        &Identity::new(1_i64, "alice", Role::User),
        TokenType::Access,
        app.state.tokens.codec().issuer(),
        10,
        now - 100,
    );
    let token = app.state.tokens.codec().encode(&claims).unwrap();

    let (status, json) = me(&app, Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_method_rule_protects_post_only() {
    let app = setup();

    let (status, json) = send(
        &app.router,
        create_json_request("POST", "/api/v1/users/comment", None, Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "TOKEN_REQUIRED");

    // GET is public; no route is mounted there
    let (status, _) = send(
        &app.router,
        create_json_request("GET", "/api/v1/users/comment", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_context_cleared_after_request() {
    let app = setup();
    let (access, _) = login_tokens(&app, "alice", ALICE_PASSWORD).await;

    let (status, _) = me(&app, Some(&access)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(current_user().is_none());
}

// =============================================================================
// Admin access
// =============================================================================

fn guarded_router(state: Arc<AppState>, hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route(
            "/api/v1/admin/reports",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "reached"
                }
            }),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

#[tokio::test]
async fn test_scenario_d_user_forbidden_on_admin_path() {
    let app = setup();
    let hits = Arc::new(AtomicUsize::new(0));
    let router = guarded_router(app.state.clone(), hits.clone());
    let (access, _) = login_tokens(&app, "alice", ALICE_PASSWORD).await;

    let (status, json) = send(
        &router,
        create_json_request("GET", "/api/v1/admin/reports", Some(&access), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let (admin_access, _) = login_tokens(&app, "root", ROOT_PASSWORD).await;
    let (status, _) = send(
        &router,
        create_json_request("GET", "/api/v1/admin/reports", Some(&admin_access), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_admin_lists_users_without_hashes() {
    let app = setup();
    let (access, _) = login_tokens(&app, "root", ROOT_PASSWORD).await;

    let (status, json) = send(
        &app.router,
        create_json_request("GET", "/api/v1/admin/users", Some(&access), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let users = json.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1]["role"], "admin");
    assert!(users.iter().all(|u| u.get("password_hash").is_none()));
}

#[tokio::test]
async fn test_configured_superadmin_id() {
    let mut config = test_config();
    config.jwt.superadmin_id = Some("1".to_string());
    let app = setup_with(config);
    let (access, _) = login_tokens(&app, "alice", ALICE_PASSWORD).await;

    let (status, _) = send(
        &app.router,
        create_json_request("GET", "/api/v1/admin/users", Some(&access), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Logout and refresh
// =============================================================================

#[tokio::test]
async fn test_scenario_b_logout_revokes_tokens() {
    let app = setup();
    let (access, refresh) = login_tokens(&app, "alice", ALICE_PASSWORD).await;

    let (status, _) = send(
        &app.router,
        create_json_request(
            "POST",
            "/api/v1/auth/logout",
            Some(&access),
            Some(json!({ "refreshToken": refresh })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = me(&app, Some(&access)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "TOKEN_INVALID");

    let (status, _) = send(
        &app.router,
        create_json_request(
            "POST",
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_body() {
    let app = setup();
    let (access, refresh) = login_tokens(&app, "alice", ALICE_PASSWORD).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/logout")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = me(&app, Some(&access)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    // Refresh token was not supplied, so it still works
    assert!(app
        .state
        .tokens
        .validate(&refresh, TokenType::Refresh)
        .await
        .is_some());
}

#[tokio::test]
async fn test_logout_ignores_foreign_refresh_token() {
    let app = setup();
    let (alice_access, _) = login_tokens(&app, "alice", ALICE_PASSWORD).await;
    let (_, root_refresh) = login_tokens(&app, "root", ROOT_PASSWORD).await;

    let (status, _) = send(
        &app.router,
        create_json_request(
            "POST",
            "/api/v1/auth/logout",
            Some(&alice_access),
            Some(json!({ "refreshToken": root_refresh })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app
        .state
        .tokens
        .validate(&root_refresh, TokenType::Refresh)
        .await
        .is_some());
}

#[tokio::test]
async fn test_scenario_c_refresh_rotation() {
    let app = setup();
    let (_, refresh) = login_tokens(&app, "alice", ALICE_PASSWORD).await;

    let refresh_request = |token: &str| {
        create_json_request(
            "POST",
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refreshToken": token })),
        )
    };

    let (status, json) = send(&app.router, refresh_request(&refresh)).await;
    assert_eq!(status, StatusCode::OK);
    let new_access = json["token"].as_str().unwrap().to_string();
    assert_ne!(json["refreshToken"].as_str().unwrap(), refresh);

    let (status, body) = me(&app, Some(&new_access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");

    // The consumed refresh token is single-use
    let (status, json) = send(&app.router, refresh_request(&refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let app = setup();
    let (access, _) = login_tokens(&app, "alice", ALICE_PASSWORD).await;

    let (status, _) = send(
        &app.router,
        create_json_request(
            "POST",
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refreshToken": access })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Password change
// =============================================================================

#[tokio::test]
async fn test_change_password() {
    let app = setup();
    let (access, _) = login_tokens(&app, "alice", ALICE_PASSWORD).await;
    let change = |old: &str, new: &str| {
        create_json_request(
            "PUT",
            "/api/v1/auth/password",
            Some(&access),
            Some(json!({ "oldPassword": old, "newPassword": new })),
        )
    };

    let (status, json) = send(&app.router, change("wrong-old-1", "new-secret-2")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "INVALID_CREDENTIALS");

    let (status, json) = send(&app.router, change(ALICE_PASSWORD, "short")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");

    let (status, _) = send(&app.router, change(ALICE_PASSWORD, "new-secret-2")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = login(&app, "alice", ALICE_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&app, "alice", "new-secret-2").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_requires_token() {
    let app = setup();
    let (status, json) = send(
        &app.router,
        create_json_request(
            "PUT",
            "/api/v1/auth/password",
            None,
            Some(json!({ "oldPassword": "a", "newPassword": "b" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "TOKEN_REQUIRED");
}
