//! Validation of a single relay hop.
//!
//! A hop starts awaiting validation and ends in exactly one of
//! [`HopState::Authorized`], [`HopState::Rejected`] or [`HopState::Expired`].
//! The checks run in a fixed order: expiry, account, existing session, token.
//! Whatever the outcome, the caller still plans the next redirect, so a
//! failed hop never stops the ring.

use axum::http::StatusCode;

use super::{
    accounts::AccountStore,
    error::RelayError,
    metrics,
    session::SessionAccess,
    token::{is_expired, TokenCodec},
};
use crate::config::RelaySettings;
use crate::models::{Account, RelayParams, ANONYMOUS_ACCOUNT_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// A new session was established from the token.
    Established,
    /// The browser already had a session here and it was kept.
    AlreadyAuthenticated,
}

#[derive(Debug)]
pub enum HopState {
    Authorized(Authorization),
    Rejected(RelayError),
    Expired,
}

impl HopState {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HopState::Authorized(_) => StatusCode::OK,
            HopState::Rejected(err) => err.status_code(),
            HopState::Expired => StatusCode::FORBIDDEN,
        }
    }

    pub fn outcome_label(&self) -> &'static str {
        match self {
            HopState::Authorized(Authorization::Established) => "established",
            HopState::Authorized(Authorization::AlreadyAuthenticated) => "already_authenticated",
            HopState::Rejected(err) => err.outcome_label(),
            HopState::Expired => "expired",
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self, HopState::Authorized(Authorization::Established))
    }
}

pub struct LoginRelay<'a> {
    settings: &'a RelaySettings,
    accounts: &'a dyn AccountStore,
    codec: &'a TokenCodec,
}

impl<'a> LoginRelay<'a> {
    pub fn new(
        settings: &'a RelaySettings,
        accounts: &'a dyn AccountStore,
        codec: &'a TokenCodec,
    ) -> Self {
        Self {
            settings,
            accounts,
            codec,
        }
    }

    /// Run the hop state machine against this domain's session.
    pub async fn authenticate(
        &self,
        params: &RelayParams,
        session: &dyn SessionAccess,
        now: i64,
    ) -> HopState {
        let state = match self.evaluate(params, session, now).await {
            Ok(authorization) => HopState::Authorized(authorization),
            Err(RelayError::TokenExpired) => HopState::Expired,
            Err(err) => {
                if let RelayError::Backend(e) = &err {
                    tracing::error!(
                        account_id = params.account_id,
                        error = %e,
                        "Relay hop failed"
                    );
                }
                HopState::Rejected(err)
            }
        };

        metrics::record_hop(state.outcome_label());
        state
    }

    async fn evaluate(
        &self,
        params: &RelayParams,
        session: &dyn SessionAccess,
        now: i64,
    ) -> Result<Authorization, RelayError> {
        let extra_logging = self.settings.extra_logging();

        if is_expired(params.timestamp, now, self.settings.timeout_seconds) {
            tracing::error!(
                severity = "critical",
                account_id = params.account_id,
                timestamp = params.timestamp,
                now = now,
                timeout = self.settings.timeout_seconds,
                "Relay token expired"
            );
            return Err(RelayError::TokenExpired);
        }

        let account = match params.account_id {
            ANONYMOUS_ACCOUNT_ID => None,
            id => self.accounts.find_by_id(id).await?,
        };
        let account = match account {
            Some(account) if account.is_active() => account,
            _ => {
                tracing::warn!(
                    account_id = params.account_id,
                    "Relay account missing or blocked"
                );
                return Err(RelayError::AccountUnavailable(params.account_id));
            }
        };

        if session.is_authenticated().await? {
            if !self.settings.force_logout {
                tracing::info!(
                    account_id = account.id,
                    "Browser already authenticated, keeping existing session"
                );
                return Ok(Authorization::AlreadyAuthenticated);
            }

            session.terminate().await?;
            if extra_logging {
                tracing::debug!(account_id = account.id, "Terminated existing session");
            }
        }

        if !self.codec.verify(&params.token, &account, params.timestamp) {
            tracing::error!(
                severity = "critical",
                account_id = account.id,
                referrer = %params.referrer,
                "Relay token rejected"
            );
            return Err(RelayError::TokenInvalid);
        }

        session.establish(account.id).await?;
        if extra_logging {
            tracing::debug!(account_id = account.id, "Relay session established");
        }

        Ok(Authorization::Established)
    }

    /// The active account holding this domain's session, if any. Relay
    /// tokens for the next hop are issued for it.
    pub async fn session_account(
        &self,
        session: &dyn SessionAccess,
    ) -> Result<Option<Account>, RelayError> {
        let Some(id) = session.account_id().await? else {
            return Ok(None);
        };
        Ok(self.accounts.find_by_id(id).await?.filter(Account::is_active))
    }
}
