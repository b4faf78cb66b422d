//! Identity store access. The relay only reads accounts.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::RwLock;

use super::error::ServiceError;
use crate::config::DatabaseConfig;
use crate::models::{Account, AccountId};

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, ServiceError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, ServiceError>;
    async fn health_check(&self) -> Result<(), ServiceError>;
}

/// PostgreSQL-backed account store reading the shared `accounts` table.
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a pool that connects on first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, ServiceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy(&config.url)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, ServiceError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, email, password_hash, active FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, ServiceError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, email, password_hash, active FROM accounts WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                ServiceError::Database(e)
            })?;
        Ok(())
    }
}

/// Account store held in memory, for tests and local development.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account) -> Result<(), ServiceError> {
        self.accounts
            .write()
            .map_err(|e| anyhow::anyhow!("Account store lock poisoned: {}", e))?
            .insert(account.id, account);
        Ok(())
    }

    pub fn update<F>(&self, id: AccountId, change: F) -> Result<bool, ServiceError>
    where
        F: FnOnce(&mut Account),
    {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|e| anyhow::anyhow!("Account store lock poisoned: {}", e))?;
        Ok(match accounts.get_mut(&id) {
            Some(account) => {
                change(account);
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, ServiceError> {
        let accounts = self
            .accounts
            .read()
            .map_err(|e| anyhow::anyhow!("Account store lock poisoned: {}", e))?;
        Ok(accounts.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, ServiceError> {
        let accounts = self
            .accounts
            .read()
            .map_err(|e| anyhow::anyhow!("Account store lock poisoned: {}", e))?;
        Ok(accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
