//! Token claims and identity types
//!
//! The claims payload keeps the field names the blog frontend already reads
//! (`user_id`, `username`, `role`, `type`, `jti`, `iat`, `exp`), so tokens stay
//! decodable by any conformant JWT library.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Identity of an authenticated principal
///
/// Numeric ids come from the relational store, string ids from external
/// identity providers. Both round-trip through a token unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubjectId {
    Int(i64),
    Str(String),
}

impl SubjectId {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SubjectId::Int(id) => Some(*id),
            SubjectId::Str(s) => s.parse().ok(),
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectId::Int(id) => write!(f, "{id}"),
            SubjectId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for SubjectId {
    fn from(id: i64) -> Self {
        SubjectId::Int(id)
    }
}

impl From<String> for SubjectId {
    fn from(id: String) -> Self {
        SubjectId::Str(id)
    }
}

impl From<&str> for SubjectId {
    fn from(id: &str) -> Self {
        SubjectId::Str(id.to_string())
    }
}

/// Parses configuration values: digits become `Int`, anything else `Str`.
impl FromStr for SubjectId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(s.parse::<i64>()
            .map(SubjectId::Int)
            .unwrap_or_else(|_| SubjectId::Str(s.to_string())))
    }
}

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    #[serde(alias = "USER")]
    User,
    #[serde(alias = "ADMIN")]
    Admin,
    #[serde(alias = "SUPER")]
    Super,
}

impl Role {
    /// Admin paths accept both admin and super
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Super)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Super => "super",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown role: {0}")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "super" => Ok(Role::Super),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

// Roles are stored as text columns
impl TryFrom<String> for Role {
    type Error = ParseRoleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Token type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base identity a token pair is stamped from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject_id: SubjectId,
    pub username: String,
    pub role: Role,
}

impl Identity {
    pub fn new(subject_id: impl Into<SubjectId>, username: impl Into<String>, role: Role) -> Self {
        Self {
            subject_id: subject_id.into(),
            username: username.into(),
            role,
        }
    }
}

/// JWT payload
///
/// Claims are immutable once encoded; revocation only records the `jti`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject identity
    #[serde(rename = "user_id")]
    pub subject_id: SubjectId,
    /// Display name, informational only
    #[serde(default)]
    pub username: String,
    pub role: Role,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Unique token id, the revocation key
    #[serde(rename = "jti")]
    pub token_id: String,
    /// Issued at (Unix seconds)
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Expiration (Unix seconds)
    #[serde(rename = "exp")]
    pub expires_at: i64,
    /// Token issuer
    pub iss: String,
}

impl TokenClaims {
    /// Stamp fresh claims for `identity` with a new `jti`
    pub fn new(
        identity: &Identity,
        token_type: TokenType,
        issuer: &str,
        ttl_secs: u64,
        now: i64,
    ) -> Self {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        Self {
            subject_id: identity.subject_id.clone(),
            username: identity.username.clone(),
            role: identity.role,
            token_type,
            token_id: Uuid::new_v4().simple().to_string(),
            issued_at: now,
            expires_at: now.saturating_add(ttl),
            iss: issuer.to_string(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            subject_id: self.subject_id.clone(),
            username: self.username.clone(),
            role: self.role,
        }
    }

    /// A token is dead at its expiry second, not after it
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Seconds until expiry, clamped at zero
    pub fn remaining_secs(&self, now: i64) -> u64 {
        u64::try_from(self.expires_at.saturating_sub(now)).unwrap_or(0)
    }
}

pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
