//! Scribe API - HTTP server for the scribe blog backend
//!
//! Wires the token engine from `scribe-core` into axum: a global auth
//! middleware, the login/refresh/logout/password endpoints, and the
//! endpoints that exercise user and admin access.
//!
//! Author: hephaex@gmail.com

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::{middleware, routing::get, Json, Router};
use state::AppState;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// OpenAPI document served at `/api-docs/openapi.json`
#[derive(OpenApi)]
#[openapi(
    info(title = "Scribe API", description = "Blog backend authentication"),
    paths(
        handlers::health::health_check,
        handlers::auth::login_handler,
        handlers::auth::refresh_handler,
        handlers::auth::logout_handler,
        handlers::auth::change_password_handler,
        handlers::users::me_handler,
        handlers::users::list_users_handler,
    ),
    components(schemas(
        error::ApiError,
        handlers::health::HealthResponse,
        handlers::auth::LoginRequest,
        handlers::auth::TokenResponse,
        handlers::auth::RefreshRequest,
        handlers::auth::LogoutRequest,
        handlers::auth::ChangePasswordRequest,
        handlers::auth::MessageResponse,
        handlers::users::MeResponse,
        handlers::users::UserSummary,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness"),
        (name = "auth", description = "Token issuance and revocation"),
        (name = "users", description = "Authenticated user endpoints"),
        (name = "admin", description = "Admin-only endpoints"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the full application router
///
/// The auth middleware wraps every route, so access rules apply uniformly
/// by path.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(routes::api_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
