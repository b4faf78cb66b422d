use axum::http::StatusCode;
use service_core::error::AppError;
use thiserror::Error;

use crate::models::{AccountId, Fingerprint};

/// Why a hop could not authenticate, or why a hop could not be planned.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Relay token expired")]
    TokenExpired,

    #[error("Relay token invalid")]
    TokenInvalid,

    #[error("Account {0} unavailable")]
    AccountUnavailable(AccountId),

    #[error("Domain {0} is not part of the relay ring")]
    DomainNotInRing(String),

    #[error("Relay ring has no domains")]
    EmptyRing,

    #[error("Referrer {0} matches no relay domain")]
    UnknownReferrer(Fingerprint),

    #[error("Relay backend error: {0}")]
    Backend(#[from] ServiceError),
}

impl RelayError {
    /// HTTP status recorded for a hop that failed with this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::FORBIDDEN,
        }
    }

    /// Label used for the `relay_hops_total` metric.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            RelayError::TokenExpired => "expired",
            RelayError::TokenInvalid => "invalid_token",
            RelayError::AccountUnavailable(_) => "account_unavailable",
            RelayError::DomainNotInRing(_) => "domain_not_in_ring",
            RelayError::EmptyRing => "empty_ring",
            RelayError::UnknownReferrer(_) => "unknown_referrer",
            RelayError::Backend(_) => "error",
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Session(e) => AppError::SessionError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
        }
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Backend(e) => e.into(),
            other => AppError::Forbidden(anyhow::anyhow!(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_failures_are_forbidden() {
        assert_eq!(RelayError::TokenExpired.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(RelayError::TokenInvalid.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            RelayError::AccountUnavailable(3).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            RelayError::UnknownReferrer(Fingerprint::from(7)).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_backend_failures_are_internal() {
        let err = RelayError::from(ServiceError::Internal(anyhow::anyhow!("boom")));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.outcome_label(), "error");
    }
}
