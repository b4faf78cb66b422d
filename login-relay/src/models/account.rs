//! Account record as seen by the relay: the subset of the identity store's
//! user that the token scheme binds to.

use sqlx::FromRow;

pub type AccountId = i64;

/// Id carried in relay URLs planned for a hop without an authenticated
/// session. No stored account ever has it.
pub const ANONYMOUS_ACCOUNT_ID: AccountId = 0;

#[derive(Clone, FromRow)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
}

impl Account {
    pub fn new(id: AccountId, email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            password_hash: password_hash.into(),
            active: true,
        }
    }

    /// Check if the account may hold a session.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("active", &self.active)
            .finish()
    }
}
