//! Authentication middleware for protecting routes
//!
//! Every request is classified by method and path. Public requests pass
//! through untouched; protected ones must carry a valid, unrevoked access
//! token, and admin paths additionally require an admin identity. On success
//! the caller's [`UserContext`] is added to request extensions and scoped as
//! the current user for the rest of the request.

use super::context::{self, UserContext};
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use scribe_core::config::{AccessConfig, ConfigError};
use scribe_core::{SubjectId, TokenType};
use std::sync::Arc;
use thiserror::Error;

/// What a request needs before it reaches its handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    User,
    Admin,
}

/// Path classification rules
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    /// Exact paths, checked first
    pub public_paths: Vec<String>,
    pub admin_prefixes: Vec<String>,
    pub protected_prefixes: Vec<String>,
    /// Prefixes protected only for one method
    pub method_rules: Vec<(Method, String)>,
    /// Subject granted admin access whatever its role
    pub superadmin_id: Option<SubjectId>,
}

impl AccessPolicy {
    pub fn from_config(
        access: &AccessConfig,
        superadmin_id: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let method_rules = access
            .method_rules
            .iter()
            .map(|rule| {
                Method::from_bytes(rule.method.trim().to_ascii_uppercase().as_bytes())
                    .map(|method| (method, rule.prefix.clone()))
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "access.method_rules".to_string(),
                        value: rule.method.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            public_paths: access.public_paths.clone(),
            admin_prefixes: access.admin_prefixes.clone(),
            protected_prefixes: access.protected_prefixes.clone(),
            method_rules,
            superadmin_id: superadmin_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .and_then(|id| id.parse().ok()),
        })
    }

    pub fn classify(&self, method: &Method, path: &str) -> Access {
        if self.public_paths.iter().any(|p| p == path) {
            return Access::Public;
        }
        if self.admin_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return Access::Admin;
        }
        if self
            .protected_prefixes
            .iter()
            .any(|p| path.starts_with(p.as_str()))
        {
            return Access::User;
        }
        if self
            .method_rules
            .iter()
            .any(|(m, p)| m == method && path.starts_with(p.as_str()))
        {
            return Access::User;
        }
        Access::Public
    }

    pub fn allows_admin(&self, user: &UserContext) -> bool {
        user.is_admin() || self.superadmin_id.as_ref() == Some(&user.subject_id)
    }
}

/// Authentication middleware errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication token required")]
    TokenRequired,

    #[error("Token is invalid or expired")]
    TokenInvalid,

    #[error("Insufficient permissions")]
    Forbidden,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AuthError::TokenRequired => (StatusCode::UNAUTHORIZED, ApiError::token_required()),
            AuthError::TokenInvalid => (StatusCode::UNAUTHORIZED, ApiError::token_invalid()),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, ApiError::forbidden()),
        };

        (status, Json(body)).into_response()
    }
}

/// Read the token from `Authorization`, with or without a `Bearer` scheme
pub fn extract_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::TokenRequired)?
        .to_str()
        .map_err(|_| AuthError::TokenInvalid)?
        .trim();

    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => value,
    };

    // A scheme with nothing after it trims down to the scheme itself
    if token.is_empty() || token.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::TokenRequired);
    }
    Ok(token.to_string())
}

/// Authentication middleware, installed with `from_fn_with_state`
///
/// ```ignore
/// let app = Router::new()
///     .merge(routes::api_routes())
///     .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
///     .with_state(state);
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let path = request.uri().path().to_string();
    let access = state.policy.classify(request.method(), &path);
    if access == Access::Public {
        return Ok(next.run(request).await);
    }

    // Extract context for audit logging
    let ip_address = extract_ip_address(request.headers());
    let user_agent = extract_user_agent(request.headers());

    let token = extract_token(request.headers())?;

    let claims = match state
        .tokens
        .validate_detailed(&token, TokenType::Access)
        .await
    {
        Ok(claims) => claims,
        Err(e) => {
            audit_log(&AuditEvent::InvalidToken {
                resource: path,
                reason: e.reason().to_string(),
                ip_address,
                user_agent,
            });
            return Err(AuthError::TokenInvalid);
        }
    };

    let user = UserContext::from_claims(claims, token);

    if access == Access::Admin && !state.policy.allows_admin(&user) {
        audit_log(&AuditEvent::AccessDenied {
            subject_id: user.subject_id.to_string(),
            role: user.role.to_string(),
            resource: path,
            ip_address,
            user_agent,
        });
        return Err(AuthError::Forbidden);
    }

    request.extensions_mut().insert(user.clone());
    Ok(context::scope(user, next.run(request)).await)
}
