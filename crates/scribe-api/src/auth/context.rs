//! Request-scoped identity
//!
//! The auth middleware runs the rest of the request inside
//! [`CURRENT_USER`]'s scope, so the identity disappears when the handler's
//! future completes or is dropped. Handlers can take it from request
//! extensions (`Extension<UserContext>`) or call [`current_user`].

use scribe_core::{Role, SubjectId, TokenClaims};
use std::future::Future;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub subject_id: SubjectId,
    pub username: String,
    pub role: Role,
    /// Raw access token, needed to revoke it on logout
    pub token: String,
}

impl UserContext {
    pub fn from_claims(claims: TokenClaims, token: impl Into<String>) -> Self {
        Self {
            subject_id: claims.subject_id,
            username: claims.username,
            role: claims.role,
            token: token.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

tokio::task_local! {
    static CURRENT_USER: UserContext;
}

/// Run `f` with `user` as the current identity
pub async fn scope<F: Future>(user: UserContext, f: F) -> F::Output {
    CURRENT_USER.scope(user, f).await
}

/// Identity of the request being handled, if it was authenticated
pub fn current_user() -> Option<UserContext> {
    CURRENT_USER.try_with(Clone::clone).ok()
}
