//! Credential repository
//!
//! The token engine never stores credentials itself; login and password
//! changes read and update them through [`UserRepository`].
//!
//! Author: hephaex@gmail.com

use crate::auth::claims::{Identity, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("User not found")]
    NotFound,

    #[error("Username already exists")]
    Duplicate,
}

/// Stored credential
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_active: bool,
}

impl UserRecord {
    pub fn identity(&self) -> Identity {
        Identity::new(self.id, self.username.clone(), self.role)
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepositoryError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepositoryError>;

    async fn list(&self) -> Result<Vec<UserRecord>, RepositoryError>;

    /// Replace the stored hash, e.g. after a transparent re-hash
    async fn update_password_hash(&self, id: i64, password_hash: &str)
        -> Result<(), RepositoryError>;
}

/// In-process repository for development and tests
#[derive(Debug)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<i64, UserRecord>>,
    next_id: AtomicI64,
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an active user with an already-hashed password
    pub fn create(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<UserRecord, RepositoryError> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.values().any(|u| u.username == username) {
            return Err(RepositoryError::Duplicate);
        }

        let record = UserRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            is_active: true,
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    pub fn set_active(&self, id: i64, is_active: bool) -> Result<(), RepositoryError> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.is_active = is_active;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepositoryError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = users.values().cloned().collect();
        all.sort_by_key(|u| u.id);
        Ok(all)
    }

    async fn update_password_hash(
        &self,
        id: i64,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }
}

/// PostgreSQL repository over the `users` table
///
/// Expected columns: `id BIGINT`, `username TEXT`, `password_hash TEXT`,
/// `role TEXT`, `is_active BOOLEAN`.
#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let query = r#"
            SELECT id, username, password_hash, role, is_active
            FROM users
            WHERE username = $1
        "#;

        Ok(sqlx::query_as::<_, UserRecord>(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepositoryError> {
        let query = r#"
            SELECT id, username, password_hash, role, is_active
            FROM users
            WHERE id = $1
        "#;

        Ok(sqlx::query_as::<_, UserRecord>(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        let query = r#"
            SELECT id, username, password_hash, role, is_active
            FROM users
            ORDER BY id
        "#;

        Ok(sqlx::query_as::<_, UserRecord>(query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_password_hash(
        &self,
        id: i64,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
