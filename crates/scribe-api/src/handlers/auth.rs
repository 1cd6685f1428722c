//! Authentication API handlers
//!
//! Login, token refresh, logout and password change. Login failures of every
//! kind produce the same `INVALID_CREDENTIALS` response; the audit log keeps
//! the actual reason.
//!
//! Author: hephaex@gmail.com

use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::auth::UserContext;
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, http::HeaderMap, Extension, Json};
use scribe_core::auth::password::validate_password_strength;
use scribe_core::{TokenPair, TokenType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;

/// Login request
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Issued token pair
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// Access token
    pub token: String,
    pub refresh_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

impl TokenResponse {
    fn new(pair: TokenPair, expires_in: u64) -> Self {
        Self {
            token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Refresh request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request; the body is optional
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    /// Refresh token to revoke along with the access token
    pub refresh_token: Option<String>,
}

/// Password change request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

fn login_failed(username: &str, reason: &str, headers: &HeaderMap) -> AppError {
    audit_log(&AuditEvent::LoginFailure {
        username: username.to_string(),
        reason: reason.to_string(),
        ip_address: extract_ip_address(headers),
        user_agent: extract_user_agent(headers),
    });
    AppError::InvalidCredentials
}

/// Login with username and password
///
/// Returns an access and refresh token pair. A stored hash at outdated
/// parameters is replaced after a successful match.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = state.users.find_by_username(&request.username).await?;

    // Unknown and inactive accounts still pay one password verification
    let hasher = Arc::clone(&state.passwords);
    let stored = user
        .as_ref()
        .filter(|u| u.is_active)
        .map(|u| u.password_hash.clone());
    let password = request.password;
    let (matched, new_hash) = tokio::task::spawn_blocking(move || match stored {
        Some(stored) => hasher.verify_and_upgrade(&password, &stored),
        None => {
            hasher.verify_absent(&password);
            (false, None)
        }
    })
    .await
    .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))?;

    let user = match user {
        None => return Err(login_failed(&request.username, "unknown_user", &headers)),
        Some(user) if !user.is_active => {
            return Err(login_failed(&request.username, "inactive", &headers))
        }
        Some(user) => user,
    };
    if !matched {
        return Err(login_failed(&request.username, "invalid_password", &headers));
    }

    let rehashed = match new_hash {
        Some(hash) => match state.users.update_password_hash(user.id, &hash).await {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Failed to persist upgraded password hash");
                false
            }
        },
        None => false,
    };

    let pair = state.tokens.issue_pair(&user.identity())?;

    audit_log(&AuditEvent::LoginSuccess {
        subject_id: user.id.to_string(),
        username: user.username.clone(),
        ip_address: extract_ip_address(&headers),
        user_agent: extract_user_agent(&headers),
        rehashed,
    });

    Ok(Json(TokenResponse::new(pair, state.tokens.access_ttl_secs())))
}

/// Exchange a refresh token for a new pair
///
/// The presented refresh token is revoked; reusing it fails.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New tokens issued", body = TokenResponse),
        (status = 401, description = "Invalid, expired or reused refresh token", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let rotated = state.tokens.rotate_refresh(request.refresh_token.trim()).await;

    audit_log(&AuditEvent::TokenRefresh {
        ip_address: extract_ip_address(&headers),
        user_agent: extract_user_agent(&headers),
        success: rotated.is_some(),
    });

    let pair = rotated.ok_or(AppError::TokenInvalid)?;
    Ok(Json(TokenResponse::new(pair, state.tokens.access_ttl_secs())))
}

/// Logout
///
/// Revokes the presented access token and, if supplied, the caller's own
/// refresh token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    headers: HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> Result<Json<MessageResponse>, AppError> {
    state.tokens.revoke(&user.token).await;

    let mut refresh_revoked = false;
    if let Some(refresh_token) = body.and_then(|Json(b)| b.refresh_token) {
        // Only the caller's own refresh token may be revoked here
        let owned = state
            .tokens
            .codec()
            .check(&refresh_token, Some(TokenType::Refresh))
            .is_some_and(|claims| claims.subject_id == user.subject_id);
        if owned {
            refresh_revoked = state.tokens.revoke(&refresh_token).await;
        }
    }

    audit_log(&AuditEvent::Logout {
        subject_id: user.subject_id.to_string(),
        username: user.username.clone(),
        ip_address: extract_ip_address(&headers),
        refresh_revoked,
    });

    Ok(Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// Change the caller's password
#[utoipa::path(
    put,
    path = "/api/v1/auth/password",
    tag = "auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "New password too weak", body = crate::error::ApiError),
        (status = 401, description = "Old password does not match", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    headers: HeaderMap,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    validate_password_strength(&request.new_password).map_err(AppError::BadRequest)?;

    let id = user
        .subject_id
        .as_i64()
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;
    let record = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    let hasher = Arc::clone(&state.passwords);
    let stored = record.password_hash;
    let ChangePasswordRequest {
        old_password,
        new_password,
    } = request;
    let new_hash = tokio::task::spawn_blocking(move || {
        if !hasher.verify(&old_password, &stored) {
            return Ok(None);
        }
        hasher.hash(&new_password).map(Some)
    })
    .await
    .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
    .map_err(|e| AppError::Internal(e.to_string()))?;

    let audit = |success: bool| {
        audit_log(&AuditEvent::PasswordChange {
            subject_id: user.subject_id.to_string(),
            username: user.username.clone(),
            ip_address: extract_ip_address(&headers),
            success,
        })
    };

    let Some(new_hash) = new_hash else {
        audit(false);
        return Err(AppError::InvalidCredentials);
    };
    state.users.update_password_hash(id, &new_hash).await?;
    audit(true);

    Ok(Json(MessageResponse {
        message: "Password changed successfully".to_string(),
    }))
}
