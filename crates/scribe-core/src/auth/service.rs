//! Token pair issuance, validation, revocation and refresh rotation
//!
//! [`TokenService::validate_detailed`] combines the stateless codec checks
//! with the revocation lookup for every protected request. Refresh rotation
//! instead claims the old token atomically in the revocation store.

use super::claims::{unix_now, Identity, TokenClaims, TokenType};
use super::codec::{CodecError, DecodeError, TokenCodec};
use super::revocation::RevocationStore;
use crate::config::{ConfigError, JwtConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Access and refresh tokens issued together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Why a token failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Token has been revoked")]
    Revoked,
}

impl ValidationError {
    /// Short label for logs
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::Decode(e) => e.reason(),
            ValidationError::Revoked => "revoked",
        }
    }
}

/// Token lifecycle service, shared by every request
#[derive(Clone)]
pub struct TokenService {
    codec: Arc<TokenCodec>,
    store: Arc<dyn RevocationStore>,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("codec", &self.codec)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Requires `refresh_ttl_secs > access_ttl_secs > 0`
    pub fn new(
        codec: TokenCodec,
        store: Arc<dyn RevocationStore>,
        access_ttl_secs: u64,
        refresh_ttl_secs: u64,
    ) -> Result<Self, ConfigError> {
        if access_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_ACCESS_TOKEN_EXPIRE_MINUTES".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if refresh_ttl_secs <= access_ttl_secs {
            return Err(ConfigError::Invalid {
                key: "JWT_REFRESH_TOKEN_EXPIRE_MINUTES".to_string(),
                reason: "must be greater than the access token lifetime".to_string(),
            });
        }

        Ok(Self {
            codec: Arc::new(codec),
            store,
            access_ttl_secs,
            refresh_ttl_secs,
        })
    }

    pub fn from_config(
        config: &JwtConfig,
        store: Arc<dyn RevocationStore>,
    ) -> Result<Self, ConfigError> {
        Self::new(
            TokenCodec::from_config(config)?,
            store,
            config.access_ttl_secs(),
            config.refresh_ttl_secs(),
        )
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Access token lifetime, reported to clients as `expiresIn`
    pub fn access_ttl_secs(&self) -> u64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> u64 {
        self.refresh_ttl_secs
    }

    /// Issue a single token of the given type
    pub fn issue(&self, identity: &Identity, token_type: TokenType) -> Result<String, CodecError> {
        let ttl = match token_type {
            TokenType::Access => self.access_ttl_secs,
            TokenType::Refresh => self.refresh_ttl_secs,
        };
        let claims = TokenClaims::new(identity, token_type, self.codec.issuer(), ttl, unix_now());
        self.codec.encode(&claims)
    }

    /// Issue a fresh access and refresh token for `identity`
    ///
    /// Issuance never touches the revocation store.
    pub fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, CodecError> {
        Ok(TokenPair {
            access_token: self.issue(identity, TokenType::Access)?,
            refresh_token: self.issue(identity, TokenType::Refresh)?,
        })
    }

    /// Decode with a strict type check, then consult the revocation store
    pub async fn validate_detailed(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<TokenClaims, ValidationError> {
        let claims = self.codec.decode(token, Some(expected))?;
        if self.store.is_revoked(&claims.token_id).await {
            return Err(ValidationError::Revoked);
        }
        Ok(claims)
    }

    pub async fn validate(&self, token: &str, expected: TokenType) -> Option<TokenClaims> {
        match self.validate_detailed(token, expected).await {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!(reason = e.reason(), expected = %expected, "Token rejected");
                None
            }
        }
    }

    /// Revoke a token of either type until its own expiry
    ///
    /// Returns false when the token does not decode, including when it has
    /// already expired.
    pub async fn revoke(&self, token: &str) -> bool {
        let claims = match self.codec.decode(token, None) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(reason = e.reason(), "Nothing to revoke");
                return false;
            }
        };
        self.revoke_claims(&claims).await;
        true
    }

    async fn revoke_claims(&self, claims: &TokenClaims) {
        let ttl = claims.remaining_secs(unix_now());
        self.store.mark_revoked(&claims.token_id, ttl).await;
        debug!(
            jti = %claims.token_id,
            token_type = %claims.token_type,
            ttl,
            "Token revoked"
        );
    }

    /// Exchange a refresh token for a new pair, consuming the old one
    ///
    /// The old token is claimed with [`RevocationStore::revoke_if_absent`],
    /// so of any number of concurrent rotations of one token exactly one gets
    /// a pair.
    pub async fn rotate_refresh(&self, refresh_token: &str) -> Option<TokenPair> {
        let claims = match self.codec.decode(refresh_token, Some(TokenType::Refresh)) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(reason = e.reason(), "Refresh token rejected");
                return None;
            }
        };

        let ttl = claims.remaining_secs(unix_now());
        if !self.store.revoke_if_absent(&claims.token_id, ttl).await {
            debug!(jti = %claims.token_id, "Refresh token already used or revoked");
            return None;
        }

        match self.issue_pair(&claims.identity()) {
            Ok(pair) => {
                info!(subject = %claims.subject_id, "Refresh token rotated");
                Some(pair)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to issue rotated token pair");
                None
            }
        }
    }
}
