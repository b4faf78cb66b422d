pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    request_id::request_id_middleware,
    security_headers::{security_headers_middleware, FramePolicy},
};
use std::sync::Arc;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

use crate::config::RelayConfig;
use crate::middleware::metrics_middleware;
use crate::services::{
    urls::{RELAY_LOGIN_PATH, RELAY_START_PATH},
    AccountStore, Clock, LoginEntrySubscriber, LoginEvents, RelayHooks, TokenCodec,
};

#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub accounts: Arc<dyn AccountStore>,
    pub codec: TokenCodec,
    pub hooks: Arc<dyn RelayHooks>,
    pub login_events: Arc<LoginEvents>,
    pub clock: Arc<dyn Clock>,
    pub relay_rate_limiter: IpRateLimiter,
    pub login_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire the service with the relay entry subscriber registered.
    /// Additional login subscribers can be registered on `login_events`
    /// before it is frozen here.
    pub fn new(
        config: RelayConfig,
        accounts: Arc<dyn AccountStore>,
        hooks: Arc<dyn RelayHooks>,
        clock: Arc<dyn Clock>,
        mut login_events: LoginEvents,
    ) -> Self {
        login_events.subscribe(
            LoginEntrySubscriber::PRIORITY,
            Arc::new(LoginEntrySubscriber::from_settings(&config.relay)),
        );

        let relay_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.relay_attempts,
            config.rate_limit.relay_window_seconds,
        );
        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );

        Self {
            codec: TokenCodec::new(config.relay.hash_salt.clone()),
            config,
            accounts,
            hooks,
            login_events: Arc::new(login_events),
            clock,
            relay_rate_limiter,
            login_rate_limiter,
        }
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Relay responses must never be replayed from a cache
    let relay_routes = Router::new()
        .route(RELAY_START_PATH, get(handlers::relay_start))
        .route(RELAY_LOGIN_PATH, get(handlers::relay_login))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .layer(from_fn_with_state(
            state.relay_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let login_route = Router::new()
        .route("/user/login", post(handlers::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    // Cross-site redirects must carry the cookie, so Strict is not an option
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(state.config.session.secure_cookie)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(
            state.config.session.inactivity_hours,
        )));

    // Relay pages may be framed by ring members only
    let frame_policy = Arc::new(FramePolicy::new(
        vec!["/relay/".to_string()],
        state.config.relay.domains.clone(),
    ));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .merge(relay_routes)
        .merge(login_route)
        .with_state(state)
        .layer(session_layer)
        // Add metrics middleware
        .layer(from_fn(metrics_middleware))
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                    version = ?request.version(),
                )
            }),
        )
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        .layer(from_fn_with_state(frame_policy, security_headers_middleware));

    Ok(app)
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.accounts.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Identity store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "identity_store": "up"
        }
    })))
}
