//! Scribe Configuration Management
//!
//! Handles configuration from environment variables and TOML files with
//! sensible defaults for development. Secrets and token lifetimes are checked
//! by [`AppConfig::validate`] so misconfiguration fails at startup rather than
//! on the first request.

use crate::auth::password::PasswordConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Development signing secret; `validate` accepts it but servers log a warning.
pub const DEVELOPMENT_SECRET: &str = "development-secret-key-change-in-production";

/// Minimum accepted length of the HMAC signing secret in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Credential database
    pub database: DatabaseConfig,

    /// Token signing and lifetimes
    pub jwt: JwtConfig,

    /// Shared revocation store
    pub redis: RedisConfig,

    /// Argon2 target parameters
    pub password: PasswordConfig,

    /// Path classification for the auth middleware
    pub access: AccessConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        set_string("API_HOST", &mut self.server.host);
        set_parsed("API_PORT", &mut self.server.port)?;

        // PostgreSQL
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.postgres_url = Some(url);
        }
        set_parsed("DATABASE_POOL_SIZE", &mut self.database.pool_size)?;

        // JWT
        set_string("JWT_SECRET_KEY", &mut self.jwt.secret_key);
        set_string("JWT_ALGORITHM", &mut self.jwt.algorithm);
        set_parsed(
            "JWT_ACCESS_TOKEN_EXPIRE_MINUTES",
            &mut self.jwt.access_token_expire_minutes,
        )?;
        set_parsed(
            "JWT_REFRESH_TOKEN_EXPIRE_MINUTES",
            &mut self.jwt.refresh_token_expire_minutes,
        )?;
        set_string("JWT_REVOKE_PREFIX", &mut self.jwt.revoke_prefix);
        set_string("JWT_ISSUER", &mut self.jwt.issuer);
        if let Ok(id) = std::env::var("SUPERADMIN_ID") {
            self.jwt.superadmin_id = Some(id).filter(|s| !s.trim().is_empty());
        }

        // Redis
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.redis.url = Some(url).filter(|s| !s.trim().is_empty());
        }
        set_parsed("REDIS_TIMEOUT_MS", &mut self.redis.timeout_ms)?;

        // Logging
        set_string("LOG_LEVEL", &mut self.logging.level);
        set_parsed("LOG_JSON", &mut self.logging.json_format)?;

        Ok(())
    }

    /// Check values that would otherwise only fail on the first request
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jwt.validate()
    }
}

fn set_string(key: &str, target: &mut String) {
    if let Ok(value) = std::env::var(key) {
        *target = value;
    }
}

fn set_parsed<T: FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(key) {
        *target = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Database connection configuration
///
/// Without a PostgreSQL URL the server keeps credentials in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub postgres_url: Option<String>,

    /// PostgreSQL connection pool size
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            pool_size: 8,
        }
    }
}

/// Token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// HMAC secret used to sign and verify tokens
    pub secret_key: String,

    /// Signing algorithm name (HS256, HS384 or HS512)
    pub algorithm: String,

    /// Access token lifetime in minutes
    pub access_token_expire_minutes: u64,

    /// Refresh token lifetime in minutes, strictly greater than the access lifetime
    pub refresh_token_expire_minutes: u64,

    /// Key prefix for revocation records in the shared store
    pub revoke_prefix: String,

    /// Token issuer, written to and checked against the `iss` claim
    pub issuer: String,

    /// Subject id granted admin access regardless of role
    pub superadmin_id: Option<String>,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret_key: DEVELOPMENT_SECRET.to_string(),
            algorithm: "HS256".to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_minutes: 7 * 24 * 60,
            revoke_prefix: "revoked:jwt:".to_string(),
            issuer: "scribe".to_string(),
            superadmin_id: None,
        }
    }
}

impl JwtConfig {
    /// Access token lifetime in seconds
    pub fn access_ttl_secs(&self) -> u64 {
        self.access_token_expire_minutes.saturating_mul(60)
    }

    /// Refresh token lifetime in seconds
    pub fn refresh_ttl_secs(&self) -> u64 {
        self.refresh_token_expire_minutes.saturating_mul(60)
    }

    /// Parse the configured algorithm, accepting only the HMAC family
    pub fn signing_algorithm(&self) -> Result<jsonwebtoken::Algorithm, ConfigError> {
        use jsonwebtoken::Algorithm;

        let invalid = || ConfigError::InvalidValue {
            key: "JWT_ALGORITHM".to_string(),
            value: self.algorithm.clone(),
        };
        match Algorithm::from_str(self.algorithm.trim()).map_err(|_| invalid())? {
            alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) => Ok(alg),
            _ => Err(invalid()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET_KEY".to_string(),
                reason: format!("secret must be at least {MIN_SECRET_LEN} bytes"),
            });
        }
        self.signing_algorithm()?;
        if self.access_token_expire_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_ACCESS_TOKEN_EXPIRE_MINUTES".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.refresh_token_expire_minutes <= self.access_token_expire_minutes {
            return Err(ConfigError::Invalid {
                key: "JWT_REFRESH_TOKEN_EXPIRE_MINUTES".to_string(),
                reason: "must be greater than the access token lifetime".to_string(),
            });
        }
        Ok(())
    }
}

/// Shared revocation store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL; revocations stay process-local when unset
    pub url: Option<String>,

    /// Upper bound for a single Redis round trip
    pub timeout_ms: u64,

    /// Minimum delay between reconnect attempts while Redis is down
    pub reconnect_interval_secs: u64,

    /// How often the in-memory fallback drops expired records
    pub compaction_interval_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 1500,
            reconnect_interval_secs: 30,
            compaction_interval_secs: 300,
        }
    }
}

/// Method-conditioned protection rule, e.g. `POST /api/v1/users/comment`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodRule {
    pub method: String,
    pub prefix: String,
}

/// Path classification used by the auth middleware
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Exact paths that never require a token (highest precedence)
    pub public_paths: Vec<String>,

    /// Prefixes that require an admin identity
    pub admin_prefixes: Vec<String>,

    /// Prefixes that require any authenticated identity
    pub protected_prefixes: Vec<String>,

    /// Prefixes that require authentication only for a given method
    pub method_rules: Vec<MethodRule>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            public_paths: vec![
                "/api/v1/auth/login".to_string(),
                "/api/v1/auth/refresh".to_string(),
            ],
            admin_prefixes: vec!["/api/v1/admin".to_string()],
            protected_prefixes: vec![
                "/api/v1/users/bloguser".to_string(),
                "/api/v1/auth/logout".to_string(),
                "/api/v1/auth/password".to_string(),
            ],
            method_rules: vec![MethodRule {
                method: "POST".to_string(),
                prefix: "/api/v1/users/comment".to_string(),
            }],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `scribe_api=debug,tower_http=info`
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "scribe_api=debug,scribe_core=info,tower_http=debug".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration for {key}: {reason}")]
    Invalid { key: String, reason: String },
}
