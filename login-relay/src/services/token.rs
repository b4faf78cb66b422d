//! Relay token issuance and verification.
//!
//! A token is `base64url(HMAC-SHA256(timestamp ‖ account_id ‖ email))` keyed
//! with `server_secret ‖ password_hash`. Nothing is stored: a token is checked
//! by recomputing it. Because the password hash is part of the key, changing
//! the password invalidates every outstanding token for the account.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::models::{Account, AccountId};

type HmacSha256 = Hmac<Sha256>;

/// Compute the token for an account at `timestamp`.
pub fn issue_token(
    account_id: AccountId,
    email: &str,
    password_hash: &str,
    server_secret: &str,
    timestamp: i64,
) -> Result<String, anyhow::Error> {
    let key = format!("{}{}", server_secret, password_hash);
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    let message = format!("{}{}{}", timestamp, account_id, email);
    mac.update(message.as_bytes());

    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Verify a token using constant-time comparison. Any failure is `false`.
pub fn verify_token(
    token: &str,
    account_id: AccountId,
    email: &str,
    password_hash: &str,
    server_secret: &str,
    timestamp: i64,
) -> bool {
    let expected = match issue_token(account_id, email, password_hash, server_secret, timestamp) {
        Ok(expected) => expected,
        Err(e) => {
            tracing::error!(error = %e, "Failed to compute relay token");
            return false;
        }
    };

    let expected_bytes = expected.as_bytes();
    let token_bytes = token.as_bytes();

    if expected_bytes.len() != token_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(token_bytes).into()
}

/// `now - timestamp > timeout`; a token is still valid at exactly `timeout`.
pub fn is_expired(timestamp: i64, now: i64, timeout_seconds: i64) -> bool {
    now.saturating_sub(timestamp) > timeout_seconds
}

/// Token operations bound to the server secret.
#[derive(Clone)]
pub struct TokenCodec {
    server_secret: SecretString,
}

impl TokenCodec {
    pub fn new(server_secret: SecretString) -> Self {
        Self { server_secret }
    }

    pub fn issue(&self, account: &Account, timestamp: i64) -> Result<String, anyhow::Error> {
        issue_token(
            account.id,
            &account.email,
            &account.password_hash,
            self.server_secret.expose_secret(),
            timestamp,
        )
    }

    pub fn verify(&self, token: &str, account: &Account, timestamp: i64) -> bool {
        verify_token(
            token,
            account.id,
            &account.email,
            &account.password_hash,
            self.server_secret.expose_secret(),
            timestamp,
        )
    }
}
