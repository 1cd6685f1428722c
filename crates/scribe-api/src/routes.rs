//! API route definitions
//!
//! Which routes need a token is decided by the auth middleware's
//! [`AccessPolicy`](crate::auth::AccessPolicy), not by the route table.
//!
//! Author: hephaex@gmail.com

use crate::handlers::{auth, users};
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Authentication
        .route("/api/v1/auth/login", post(auth::login_handler))
        .route("/api/v1/auth/refresh", post(auth::refresh_handler))
        .route("/api/v1/auth/logout", post(auth::logout_handler))
        .route("/api/v1/auth/password", put(auth::change_password_handler))
        // Users
        .route("/api/v1/users/bloguser/me", get(users::me_handler))
        // Admin
        .route("/api/v1/admin/users", get(users::list_users_handler))
}
