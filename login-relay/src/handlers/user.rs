use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use service_core::error::AppError;
use tower_sessions::Session;
use validator::Validate;

use crate::services::{
    events::{LoginEvent, ROUTE_USER_LOGIN},
    login::verify_credentials,
    SessionAccess, UrlBuilder,
};
use crate::utils::Password;
use crate::AppState;

#[derive(Deserialize, Validate)]
pub struct LoginForm {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 1024))]
    pub password: String,
    /// Where to go when no subscriber chooses a destination.
    pub destination: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub lang: Option<String>,
}

/// `POST /user/login`: local password login on this domain.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<LoginQuery>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    form.validate()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid login form: {}", e)))?;

    let langcode = UrlBuilder::new(&state.config.relay).negotiate_language(query.lang.as_deref());
    let password = Password::new(form.password);

    let account = verify_credentials(state.accounts.as_ref(), &form.email, &password).await?;
    session.establish(account.id).await?;
    tracing::info!(account_id = account.id, "Account logged in");

    let redirect = state
        .login_events
        .dispatch(&LoginEvent::new(account.id, ROUTE_USER_LOGIN, &langcode));

    let destination = redirect
        .destination()
        .map(str::to_string)
        .or_else(|| form.destination.filter(|d| is_local_path(d)))
        .unwrap_or_else(|| "/".to_string());

    let location = HeaderValue::from_str(&destination).map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Invalid post-login destination: {}", e))
    })?;
    Ok((StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response())
}

/// Only same-site paths are accepted as a submitted destination.
fn is_local_path(destination: &str) -> bool {
    destination.starts_with('/') && !destination.starts_with("//") && !destination.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_local_path() {
        assert!(is_local_path("/account"));
        assert!(!is_local_path("//evil.example"));
        assert!(!is_local_path("https://evil.example"));
        assert!(!is_local_path("/\\evil.example"));
    }
}
