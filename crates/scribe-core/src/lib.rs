//! Scribe Core - authentication engine for the scribe blog backend
//!
//! This crate contains everything the HTTP layer needs to authenticate
//! requests without knowing how tokens or credentials are stored:
//! - Configuration loading ([`config`])
//! - Password hashing with transparent re-hash ([`auth::password`])
//! - Signed token encoding and decoding ([`auth::codec`])
//! - Token revocation with a shared store and local fallback ([`auth::revocation`])
//! - Token pair issuance, validation and refresh rotation ([`auth::service`])
//! - The credential repository contract ([`user`])
//!
//! Author: hephaex@gmail.com

pub mod auth;
pub mod config;
pub mod user;

pub use auth::{
    Identity, PasswordConfig, PasswordHasher, RevocationStore, Role, SubjectId, TokenClaims,
    TokenCodec, TokenPair, TokenService, TokenType,
};
pub use config::{AppConfig, ConfigError};
pub use user::{InMemoryUserRepository, PgUserRepository, RepositoryError, UserRecord, UserRepository};
