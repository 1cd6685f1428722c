//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::AccessPolicy;
use anyhow::Context;
use scribe_core::auth::{spawn_compaction, MemoryRevocationStore, RedisRevocationStore};
use scribe_core::config::{AppConfig, DEVELOPMENT_SECRET};
use scribe_core::user::{InMemoryUserRepository, PgUserRepository};
use scribe_core::{PasswordHasher, RevocationStore, Role, TokenService, UserRepository};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Token issuance, validation and revocation
    pub tokens: TokenService,
    /// Password hashing at the configured target parameters
    pub passwords: Arc<PasswordHasher>,
    /// Credential store
    pub users: Arc<dyn UserRepository>,
    /// Path classification for the auth middleware
    pub policy: AccessPolicy,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        tokens: TokenService,
        passwords: PasswordHasher,
        users: Arc<dyn UserRepository>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            tokens,
            passwords: Arc::new(passwords),
            users,
            policy,
        }
    }

    /// State with process-local revocations and the given repository
    pub fn in_memory(config: AppConfig, users: Arc<dyn UserRepository>) -> anyhow::Result<Self> {
        let store: Arc<dyn RevocationStore> = Arc::new(MemoryRevocationStore::new());
        Self::assemble(config, store, users)
    }

    fn assemble(
        config: AppConfig,
        store: Arc<dyn RevocationStore>,
        users: Arc<dyn UserRepository>,
    ) -> anyhow::Result<Self> {
        let tokens = TokenService::from_config(&config.jwt, store)?;
        let passwords = PasswordHasher::new(config.password.clone())?;
        let policy = AccessPolicy::from_config(&config.access, config.jwt.superadmin_id.as_deref())?;
        Ok(Self::new(config, tokens, passwords, users, policy))
    }

    /// Build the production state: Redis revocations when configured,
    /// PostgreSQL credentials when configured, in-memory otherwise
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        config.validate()?;
        if config.jwt.secret_key == DEVELOPMENT_SECRET {
            warn!("JWT_SECRET_KEY not set, using the development secret");
        }

        let compaction_interval = Duration::from_secs(config.redis.compaction_interval_secs.max(1));
        let store: Arc<dyn RevocationStore> = match config.redis.url.as_deref() {
            Some(url) => {
                let redis = RedisRevocationStore::connect(
                    url,
                    config.jwt.revoke_prefix.clone(),
                    Duration::from_millis(config.redis.timeout_ms),
                    Duration::from_secs(config.redis.reconnect_interval_secs),
                )
                .await
                .context("invalid REDIS_URL")?;
                spawn_compaction(redis.fallback(), compaction_interval);
                Arc::new(redis)
            }
            None => {
                info!("REDIS_URL not set, revocations are process-local");
                let memory = Arc::new(MemoryRevocationStore::new());
                spawn_compaction(Arc::clone(&memory), compaction_interval);
                memory
            }
        };

        let users: Arc<dyn UserRepository> = match config.database.postgres_url.as_deref() {
            Some(url) => Arc::new(
                PgUserRepository::connect(url, config.database.pool_size)
                    .await
                    .context("failed to connect to PostgreSQL")?,
            ),
            None => {
                warn!("DATABASE_URL not set, using an in-memory user store");
                let repo = InMemoryUserRepository::new();
                seed_admin_from_env(&repo, &config)?;
                Arc::new(repo)
            }
        };

        Self::assemble(config, store, users)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Seed an admin account into the in-memory store for local development
fn seed_admin_from_env(repo: &InMemoryUserRepository, config: &AppConfig) -> anyhow::Result<()> {
    let (Ok(username), Ok(password)) = (
        std::env::var("SCRIBE_ADMIN_USERNAME"),
        std::env::var("SCRIBE_ADMIN_PASSWORD"),
    ) else {
        return Ok(());
    };

    let hash = PasswordHasher::new(config.password.clone())?.hash(&password)?;
    let user = repo.create(&username, &hash, Role::Admin)?;
    info!(username = %user.username, id = user.id, "Seeded admin account");
    Ok(())
}
