//! Relay endpoints. Both answer with a 303 to the planned URL; the hop
//! outcome travels in `x-relay-status`.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use service_core::error::AppError;
use tower_sessions::Session;

use crate::models::{RelayParams, RequestUrl};
use crate::services::{
    events::{LoginEvent, ROUTE_RELAY_LOGIN},
    DomainRing, HopPlanner, LoginRelay, RelayError, UrlBuilder,
};
use crate::AppState;

pub const RELAY_STATUS_HEADER: &str = "x-relay-status";

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    pub lang: Option<String>,
}

/// `GET /relay/start`: first hop of a flow started on this domain.
pub async fn relay_start(
    State(state): State<AppState>,
    session: Session,
    request: RequestUrl,
    Query(query): Query<StartQuery>,
) -> Result<Response, AppError> {
    let settings = &state.config.relay;
    let langcode = UrlBuilder::new(settings).negotiate_language(query.lang.as_deref());

    let relay = LoginRelay::new(settings, state.accounts.as_ref(), &state.codec);
    let account = relay.session_account(&session).await?;
    if account.is_none() {
        tracing::warn!(origin = %request.origin, "Relay started without an authenticated session");
    }

    let planner = HopPlanner::new(settings, &state.codec, state.hooks.as_ref());
    match planner.plan_start(&request, account.as_ref(), &langcode, state.clock.now()) {
        Ok(hop) => {
            tracing::info!(origin = %request.origin, "Relay started");
            relay_redirect(StatusCode::OK, hop.url())
        }
        Err(err) => divert(&state, &request, &langcode, err),
    }
}

/// `GET /relay/{referrer}/{account_id}/{timestamp}/{token}/{langcode}`:
/// validate the hop, then send the browser on.
pub async fn relay_login(
    State(state): State<AppState>,
    session: Session,
    request: RequestUrl,
    Path(params): Path<RelayParams>,
) -> Result<Response, AppError> {
    let settings = &state.config.relay;
    let now = state.clock.now();
    let langcode = UrlBuilder::new(settings).negotiate_language(Some(&params.langcode));

    let relay = LoginRelay::new(settings, state.accounts.as_ref(), &state.codec);
    let hop_state = relay.authenticate(&params, &session, now).await;

    if hop_state.is_established() {
        state.login_events.dispatch(&LoginEvent::new(
            params.account_id,
            ROUTE_RELAY_LOGIN,
            &langcode,
        ));
    }

    let account = relay.session_account(&session).await?;
    let planner = HopPlanner::new(settings, &state.codec, state.hooks.as_ref());
    match planner.plan(&request, account.as_ref(), params.referrer, &langcode, false, now) {
        Ok(hop) => {
            tracing::info!(
                origin = %request.origin,
                outcome = hop_state.outcome_label(),
                terminal = hop.is_terminal(),
                "Relay hop handled"
            );
            relay_redirect(hop_state.status_code(), hop.url())
        }
        Err(err) => divert(&state, &request, &langcode, err),
    }
}

fn relay_redirect(status: StatusCode, location: &str) -> Result<Response, AppError> {
    let location = HeaderValue::from_str(location).map_err(|e| {
        AppError::InternalError(anyhow::anyhow!(
            "Planned relay URL is not a valid header value: {}",
            e
        ))
    })?;

    let mut response = StatusCode::SEE_OTHER.into_response();
    let headers = response.headers_mut();
    headers.insert(header::LOCATION, location);
    headers.insert(RELAY_STATUS_HEADER, HeaderValue::from(status.as_u16()));
    Ok(response)
}

/// The hop cannot be placed in the ring, or the ring cannot close: send it
/// to the error destination, or refuse it.
fn divert(
    state: &AppState,
    request: &RequestUrl,
    langcode: &str,
    err: RelayError,
) -> Result<Response, AppError> {
    if matches!(err, RelayError::Backend(_)) {
        return Err(err.into());
    }

    tracing::warn!(origin = %request.origin, error = %err, "Relay hop cannot continue");

    let settings = &state.config.relay;
    let domains = DomainRing::from_config(&settings.domains, state.hooks.as_ref())
        .map(|ring| ring.domains().to_vec())
        .unwrap_or_default();

    match UrlBuilder::new(settings).error_url(&request.origin, langcode, &domains) {
        Some(url) => relay_redirect(err.status_code(), &url),
        None => Err(err.into()),
    }
}
