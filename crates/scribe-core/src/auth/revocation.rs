//! Revoked token storage
//!
//! A revocation record maps a token id (`jti`) to the moment its token would
//! have expired anyway. Records are never needed past that moment, so every
//! backend stores them with a TTL and may drop them lazily.
//!
//! [`RedisRevocationStore`] shares revocations between server instances. When
//! Redis is unreachable it degrades to its embedded [`MemoryRevocationStore`];
//! revocations recorded during an outage are then only visible to this
//! process.

use super::claims::unix_now;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Storage for revoked token ids
///
/// Neither method fails: backend errors are handled inside the store.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record `token_id` as revoked for `ttl_secs` from now.
    ///
    /// Idempotent; marking an id again overwrites its record.
    async fn mark_revoked(&self, token_id: &str, ttl_secs: u64);

    /// True iff an unexpired revocation record exists for `token_id`
    async fn is_revoked(&self, token_id: &str) -> bool;

    /// Atomically record `token_id` unless it is already revoked.
    ///
    /// Returns true only for the one caller that created the record, which
    /// makes it the single-use gate for refresh rotation. A zero TTL claims
    /// nothing.
    async fn revoke_if_absent(&self, token_id: &str, ttl_secs: u64) -> bool;
}

/// Errors talking to the shared store; always recovered by the fallback
#[derive(Debug, Error)]
pub enum RevocationError {
    #[error("Revocation store timed out")]
    Timeout,

    #[error("Revocation store unavailable, next reconnect attempt pending")]
    Unavailable,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Writes between two inline compactions of the in-memory map
const COMPACT_EVERY: usize = 1024;

/// Process-local revocation map
#[derive(Debug, Default)]
pub struct MemoryRevocationStore {
    entries: Mutex<HashMap<String, i64>>,
    writes: AtomicUsize,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        // The map holds no invariants a panicking writer could break
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Revoke `token_id` until the Unix timestamp `expires_at`
    ///
    /// Expired records are compacted once every `COMPACT_EVERY` writes.
    pub fn revoke_until(&self, token_id: &str, expires_at: i64) {
        let mut entries = self.entries();
        self.compact_if_due(&mut entries);
        entries.insert(token_id.to_string(), expires_at);
    }

    /// Revoke `token_id` for `ttl_secs` from now
    pub fn revoke_for(&self, token_id: &str, ttl_secs: u64) {
        self.revoke_until(token_id, expiry_after(ttl_secs));
    }

    /// Record `token_id` until `expires_at` unless an unexpired record exists
    ///
    /// Check and insert happen under one lock.
    pub fn claim_until(&self, token_id: &str, expires_at: i64) -> bool {
        let now = unix_now();
        let mut entries = self.entries();
        if matches!(entries.get(token_id), Some(&exp) if exp > now) {
            return false;
        }
        self.compact_if_due(&mut entries);
        entries.insert(token_id.to_string(), expires_at);
        true
    }

    fn compact_if_due(&self, entries: &mut HashMap<String, i64>) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % COMPACT_EVERY == 0 {
            let now = unix_now();
            entries.retain(|_, exp| *exp > now);
        }
    }

    pub fn contains(&self, token_id: &str) -> bool {
        self.contains_at(token_id, unix_now())
    }

    /// Lookup against an explicit clock; an expired record is dropped on read
    pub fn contains_at(&self, token_id: &str, now: i64) -> bool {
        let mut entries = self.entries();
        match entries.get(token_id) {
            Some(&exp) if exp > now => true,
            Some(_) => {
                entries.remove(token_id);
                false
            }
            None => false,
        }
    }

    /// Drop every expired record, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(unix_now())
    }

    pub fn purge_expired_at(&self, now: i64) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, exp| *exp > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn mark_revoked(&self, token_id: &str, ttl_secs: u64) {
        if ttl_secs == 0 {
            return;
        }
        self.revoke_for(token_id, ttl_secs);
    }

    async fn is_revoked(&self, token_id: &str) -> bool {
        self.contains(token_id)
    }

    async fn revoke_if_absent(&self, token_id: &str, ttl_secs: u64) -> bool {
        ttl_secs > 0 && self.claim_until(token_id, expiry_after(ttl_secs))
    }
}

fn expiry_after(ttl_secs: u64) -> i64 {
    let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
    unix_now().saturating_add(ttl)
}

/// Redis-backed revocation store with in-memory fallback
///
/// Records are written as `SET <prefix><jti> 1 EX <ttl>` and checked with
/// `EXISTS`; rotation claims use `SET ... NX EX`. Each call, including any
/// reconnect it triggers, is bounded by one `timeout`.
pub struct RedisRevocationStore {
    client: redis::Client,
    connection: RwLock<Option<ConnectionManager>>,
    last_attempt: Mutex<Option<Instant>>,
    key_prefix: String,
    timeout: Duration,
    reconnect_interval: Duration,
    fallback: Arc<MemoryRevocationStore>,
}

impl std::fmt::Debug for RedisRevocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRevocationStore")
            .field("key_prefix", &self.key_prefix)
            .field("timeout", &self.timeout)
            .field("reconnect_interval", &self.reconnect_interval)
            .finish_non_exhaustive()
    }
}

impl RedisRevocationStore {
    /// Create the store and make a first connection attempt
    ///
    /// Only an unparseable URL is an error. An unreachable server leaves the
    /// store running on its fallback until a reconnect succeeds.
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        timeout: Duration,
        reconnect_interval: Duration,
    ) -> Result<Self, RevocationError> {
        let client = redis::Client::open(url)?;
        let store = Self {
            client,
            connection: RwLock::new(None),
            last_attempt: Mutex::new(None),
            key_prefix: key_prefix.into(),
            timeout,
            reconnect_interval,
            fallback: Arc::new(MemoryRevocationStore::new()),
        };

        if let Err(e) = store.bounded(store.connection()).await {
            warn!(error = %e, "Redis unreachable at startup, revocations stay process-local");
        }
        Ok(store)
    }

    /// The in-memory store used while Redis is unavailable
    pub fn fallback(&self) -> Arc<MemoryRevocationStore> {
        Arc::clone(&self.fallback)
    }

    fn key(&self, token_id: &str) -> String {
        format!("{}{}", self.key_prefix, token_id)
    }

    async fn connection(&self) -> Result<ConnectionManager, RevocationError> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        {
            let mut last = self
                .last_attempt
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if matches!(*last, Some(at) if at.elapsed() < self.reconnect_interval) {
                return Err(RevocationError::Unavailable);
            }
            *last = Some(Instant::now());
        }

        let conn = self.client.get_connection_manager().await?;

        let mut slot = self.connection.write().await;
        let conn = slot.get_or_insert(conn).clone();
        info!(prefix = %self.key_prefix, "Connected to Redis revocation store");
        Ok(conn)
    }

    /// Run one store operation, reconnect included, under a single timeout
    async fn bounded<T>(
        &self,
        op: impl std::future::Future<Output = Result<T, RevocationError>>,
    ) -> Result<T, RevocationError> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| RevocationError::Timeout)?
    }

    async fn try_mark(&self, token_id: &str, ttl_secs: u64) -> Result<(), RevocationError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            conn.set_ex::<_, _, ()>(self.key(token_id), 1u8, ttl_secs)
                .await?;
            Ok(())
        })
        .await
    }

    async fn try_exists(&self, token_id: &str) -> Result<bool, RevocationError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            Ok(conn.exists::<_, bool>(self.key(token_id)).await?)
        })
        .await
    }

    async fn try_claim(&self, token_id: &str, ttl_secs: u64) -> Result<bool, RevocationError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let reply: Option<String> = redis::cmd("SET")
                .arg(self.key(token_id))
                .arg(1u8)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs)
                .query_async(&mut conn)
                .await?;
            Ok(reply.is_some())
        })
        .await
    }
}

fn log_fallback(op: &str, error: &RevocationError) {
    match error {
        RevocationError::Unavailable => debug!(op, "Redis down, using in-memory revocations"),
        _ => warn!(op, error = %error, "Redis revocation call failed, using in-memory fallback"),
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn mark_revoked(&self, token_id: &str, ttl_secs: u64) {
        if ttl_secs == 0 {
            return;
        }
        if let Err(e) = self.try_mark(token_id, ttl_secs).await {
            log_fallback("mark_revoked", &e);
            self.fallback.revoke_for(token_id, ttl_secs);
        }
    }

    async fn is_revoked(&self, token_id: &str) -> bool {
        match self.try_exists(token_id).await {
            // Records written during an outage only exist locally
            Ok(found) => found || self.fallback.contains(token_id),
            Err(e) => {
                log_fallback("is_revoked", &e);
                self.fallback.contains(token_id)
            }
        }
    }

    async fn revoke_if_absent(&self, token_id: &str, ttl_secs: u64) -> bool {
        if ttl_secs == 0 || self.fallback.contains(token_id) {
            return false;
        }
        match self.try_claim(token_id, ttl_secs).await {
            Ok(claimed) => claimed,
            Err(e) => {
                log_fallback("revoke_if_absent", &e);
                self.fallback.claim_until(token_id, expiry_after(ttl_secs))
            }
        }
    }
}

/// Periodically drop expired records from an in-memory store
pub fn spawn_compaction(store: Arc<MemoryRevocationStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = store.len(), "Compacted revocation records");
            }
        }
    })
}
