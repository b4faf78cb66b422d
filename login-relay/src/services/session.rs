//! Per-domain session access: is-authenticated, establish, terminate.

use async_trait::async_trait;
use std::sync::Mutex;
use tower_sessions::Session;

use super::error::ServiceError;
use crate::models::AccountId;

pub const ACCOUNT_ID_KEY: &str = "relay.account_id";

#[async_trait]
pub trait SessionAccess: Send + Sync {
    /// Account the browser is authenticated as on this domain, if any.
    async fn account_id(&self) -> Result<Option<AccountId>, ServiceError>;

    async fn is_authenticated(&self) -> Result<bool, ServiceError> {
        Ok(self.account_id().await?.is_some())
    }

    /// Start an authenticated session for `account_id` under a fresh id.
    async fn establish(&self, account_id: AccountId) -> Result<(), ServiceError>;

    /// Destroy the current session.
    async fn terminate(&self) -> Result<(), ServiceError>;
}

#[async_trait]
impl SessionAccess for Session {
    async fn account_id(&self) -> Result<Option<AccountId>, ServiceError> {
        Ok(self.get::<AccountId>(ACCOUNT_ID_KEY).await?)
    }

    async fn establish(&self, account_id: AccountId) -> Result<(), ServiceError> {
        self.cycle_id().await?;
        self.insert(ACCOUNT_ID_KEY, account_id).await?;
        Ok(())
    }

    async fn terminate(&self) -> Result<(), ServiceError> {
        self.flush().await?;
        Ok(())
    }
}

/// In-memory session double recording how it was used.
#[derive(Default)]
pub struct MockSession {
    account: Mutex<Option<AccountId>>,
    events: Mutex<Vec<SessionEvent>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Established(AccountId),
    Terminated,
}

impl MockSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(account_id: AccountId) -> Self {
        Self {
            account: Mutex::new(Some(account_id)),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn record(&self, account: Option<AccountId>, event: SessionEvent) -> Result<(), ServiceError> {
        *self
            .account
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock session mutex poisoned: {}", e))? = account;
        self.events
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock session mutex poisoned: {}", e))?
            .push(event);
        Ok(())
    }
}

#[async_trait]
impl SessionAccess for MockSession {
    async fn account_id(&self) -> Result<Option<AccountId>, ServiceError> {
        let account = *self
            .account
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock session mutex poisoned: {}", e))?;
        Ok(account)
    }

    async fn establish(&self, account_id: AccountId) -> Result<(), ServiceError> {
        self.record(Some(account_id), SessionEvent::Established(account_id))
    }

    async fn terminate(&self) -> Result<(), ServiceError> {
        self.record(None, SessionEvent::Terminated)
    }
}
