//! Local username/password authentication on this domain.

use super::{accounts::AccountStore, error::ServiceError};
use crate::models::Account;
use crate::utils::{verify_password, Password};

/// Look up an active account by email and check its password.
pub async fn verify_credentials(
    accounts: &dyn AccountStore,
    email: &str,
    password: &Password,
) -> Result<Account, ServiceError> {
    let account = match accounts.find_by_email(email).await? {
        Some(account) if account.is_active() => account,
        Some(account) => {
            tracing::warn!(account_id = account.id, "Login attempt for blocked account");
            return Err(ServiceError::InvalidCredentials);
        }
        None => return Err(ServiceError::InvalidCredentials),
    };

    if verify_password(password, &account.password_hash).is_err() {
        tracing::warn!(account_id = account.id, "Login attempt with wrong password");
        return Err(ServiceError::InvalidCredentials);
    }

    Ok(account)
}
