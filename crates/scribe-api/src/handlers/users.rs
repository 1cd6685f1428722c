//! User handlers
//!
//! Author: hephaex@gmail.com

use crate::auth::current_user;
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, Json};
use scribe_core::{SubjectId, UserRecord};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Identity of the caller
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    /// Numeric or string subject id, as issued
    #[schema(value_type = String)]
    pub user_id: SubjectId,
    pub username: String,
    pub role: String,
}

/// Account listing entry; never includes the password hash
#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub is_active: bool,
}

impl From<UserRecord> for UserSummary {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role.to_string(),
            is_active: user.is_active,
        }
    }
}

/// Current user, read from the request-scoped context
#[utoipa::path(
    get,
    path = "/api/v1/users/bloguser/me",
    tag = "users",
    responses(
        (status = 200, description = "Authenticated caller", body = MeResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler() -> Result<Json<MeResponse>, AppError> {
    let user = current_user().ok_or(AppError::TokenRequired)?;

    Ok(Json(MeResponse {
        user_id: user.subject_id,
        username: user.username,
        role: user.role.to_string(),
    }))
}

/// List all accounts (admin only)
#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    tag = "admin",
    responses(
        (status = 200, description = "All accounts", body = Vec<UserSummary>),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Not an admin", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    let users = state.users.list().await?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect()))
}
