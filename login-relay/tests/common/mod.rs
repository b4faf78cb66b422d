//! Test helpers for login-relay integration tests.
//!
//! Every ring member gets its own router and session store, the way each
//! domain runs its own deployment. They share one account store and one
//! clock. Requests go through `tower::ServiceExt::oneshot` with a `Host`
//! header naming the domain, and a per-domain cookie jar stands in for the
//! browser.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use login_relay::{
    build_router,
    config::{
        DatabaseConfig, Environment, RateLimitConfig, RelayConfig, RelaySettings, SessionConfig,
    },
    models::{Account, AccountId, Fingerprint},
    services::{FixedClock, InMemoryAccountStore, LoginEvents, NoopHooks},
    utils::{hash_password, Password},
    AppState,
};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const NOW: i64 = 1_700_000_000;
pub const PASSWORD: &str = "correct horse battery staple";

pub fn test_config(domains: &[&str]) -> RelayConfig {
    RelayConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "login-relay-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
        },
        relay: RelaySettings {
            timeout_seconds: 60,
            domains: domains.iter().map(|d| d.to_string()).collect(),
            force_logout: false,
            enable_extra_logging: true,
            redirect_success: "/welcome".to_string(),
            redirect_error: "/user/login".to_string(),
            hash_salt: SecretString::new("test-hash-salt".to_string()),
            default_language: "en".to_string(),
            languages: vec!["en".to_string(), "nl".to_string()],
            excluded_login_routes: vec!["user.reset".to_string(), "relay.login".to_string()],
        },
        session: SessionConfig {
            secure_cookie: false,
            inactivity_hours: 24,
        },
        rate_limit: RateLimitConfig {
            relay_attempts: 1000,
            relay_window_seconds: 60,
            login_attempts: 1000,
            login_window_seconds: 60,
        },
    }
}

/// One relay response, as the browser saw it.
#[derive(Debug, Clone)]
pub struct Hop {
    pub url: String,
    pub status: u16,
    pub location: String,
    pub relay_status: Option<u16>,
}

pub struct TestApp {
    pub config: RelayConfig,
    pub accounts: Arc<InMemoryAccountStore>,
    pub clock: Arc<FixedClock>,
    routers: HashMap<String, Router>,
    cookies: Mutex<HashMap<String, String>>,
}

impl TestApp {
    pub async fn spawn(domains: &[&str]) -> Self {
        Self::spawn_with(test_config(domains), LoginEvents::new).await
    }

    /// Spawn with a custom configuration. `events` builds the extra login
    /// subscribers of each domain.
    pub async fn spawn_with<F>(config: RelayConfig, events: F) -> Self
    where
        F: Fn() -> LoginEvents,
    {
        login_relay::services::metrics::init_metrics().expect("Failed to init metrics");

        let accounts = Arc::new(InMemoryAccountStore::new());
        let clock = Arc::new(FixedClock::new(NOW));

        let mut routers = HashMap::new();
        for domain in &config.relay.domains {
            let state = AppState::new(
                config.clone(),
                accounts.clone(),
                Arc::new(NoopHooks),
                clock.clone(),
                events(),
            );
            let router = build_router(state).await.expect("Failed to build router");
            routers.insert(domain.clone(), router);
        }

        Self {
            config,
            accounts,
            clock,
            routers,
            cookies: Mutex::new(HashMap::new()),
        }
    }

    /// Serve another host with the same configuration, e.g. one outside
    /// the ring.
    pub async fn add_host(&mut self, origin: &str) {
        let state = AppState::new(
            self.config.clone(),
            self.accounts.clone(),
            Arc::new(NoopHooks),
            self.clock.clone(),
            LoginEvents::new(),
        );
        let router = build_router(state).await.expect("Failed to build router");
        self.routers.insert(origin.to_string(), router);
    }

    pub fn seed_account(&self, id: AccountId, email: &str) -> Account {
        let hash = hash_password(&Password::new(PASSWORD)).expect("Failed to hash password");
        let account = Account::new(id, email, hash);
        self.accounts
            .insert(account.clone())
            .expect("Failed to seed account");
        account
    }

    pub fn cookie(&self, origin: &str) -> Option<String> {
        self.cookies.lock().unwrap().get(origin).cloned()
    }

    pub async fn get(&self, url: &str) -> Response<Body> {
        let request = Request::builder().method("GET");
        self.send(url, request, Body::empty()).await
    }

    pub async fn post_form(&self, url: &str, form: &str) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(url, request, Body::from(form.to_string())).await
    }

    /// Log in on `origin` with the test password.
    pub async fn login(&self, origin: &str, email: &str) -> Response<Body> {
        let form = format!("email={}&password={}", email.replace('@', "%40"), PASSWORD.replace(' ', "+"));
        self.post_form(&format!("{}/user/login", origin), &form).await
    }

    async fn send(
        &self,
        url: &str,
        request: axum::http::request::Builder,
        body: Body,
    ) -> Response<Body> {
        let (origin, path) = split_url(url);
        let router = self
            .routers
            .get(&origin)
            .unwrap_or_else(|| panic!("No router serves {}", origin))
            .clone();

        let host = origin.split("://").nth(1).unwrap().to_string();
        let mut request = request.uri(path).header(header::HOST, host);
        if let Some(cookie) = self.cookie(&origin) {
            request = request.header(header::COOKIE, cookie);
        }

        let response = router.oneshot(request.body(body).unwrap()).await.unwrap();
        self.store_cookies(&origin, &response);
        response
    }

    fn store_cookies(&self, origin: &str, response: &Response<Body>) {
        let mut jar = self.cookies.lock().unwrap();
        for value in response.headers().get_all(header::SET_COOKIE) {
            let value = value.to_str().unwrap();
            let pair = value.split(';').next().unwrap().trim().to_string();
            if value.contains("Max-Age=0") || pair.ends_with('=') {
                jar.remove(origin);
            } else {
                jar.insert(origin.to_string(), pair);
            }
        }
    }

    /// Request `url` and keep following relay redirects until the browser
    /// lands somewhere that is not a relay URL.
    pub async fn follow(&self, url: &str) -> Vec<Hop> {
        let mut hops = Vec::new();
        let mut next = url.to_string();

        loop {
            assert!(hops.len() < 10, "relay did not terminate: {:#?}", hops);
            let response = self.get(&next).await;
            let hop = Hop {
                url: next.clone(),
                status: response.status().as_u16(),
                location: location(&response),
                relay_status: relay_status(&response),
            };
            let done = hop.status != 303 || !hop.location.contains("/relay/");
            next = hop.location.clone();
            hops.push(hop);
            if done {
                return hops;
            }
        }
    }
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default()
}

pub fn relay_status(response: &Response<Body>) -> Option<u16> {
    response
        .headers()
        .get("x-relay-status")
        .map(|v| v.to_str().unwrap().parse().unwrap())
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Split an absolute URL into origin and path-and-query.
pub fn split_url(url: &str) -> (String, String) {
    let scheme_end = url.find("://").expect("absolute url") + 3;
    match url[scheme_end..].find('/') {
        Some(i) => (url[..scheme_end + i].to_string(), url[scheme_end + i..].to_string()),
        None => (url.to_string(), "/".to_string()),
    }
}

/// Path segments of a relay URL: referrer, account id, timestamp, token,
/// language.
pub fn relay_segments(url: &str) -> (Fingerprint, AccountId, i64, String, String) {
    let (_, path) = split_url(url);
    let parts: Vec<&str> = path.trim_start_matches("/relay/").split('/').collect();
    assert_eq!(parts.len(), 5, "not a relay url: {}", url);
    (
        parts[0].parse().unwrap(),
        parts[1].parse().unwrap(),
        parts[2].parse().unwrap(),
        parts[3].to_string(),
        parts[4].to_string(),
    )
}
