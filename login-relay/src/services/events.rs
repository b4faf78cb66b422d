//! Local authentication events and the subscribers reacting to them.

use std::sync::Arc;

use super::urls::RELAY_START_PATH;
use crate::config::RelaySettings;
use crate::models::AccountId;

pub const ROUTE_USER_LOGIN: &str = "user.login";
pub const ROUTE_USER_RESET: &str = "user.reset";
pub const ROUTE_RELAY_LOGIN: &str = "relay.login";

/// A browser just became authenticated on this domain.
#[derive(Debug, Clone)]
pub struct LoginEvent {
    pub account_id: AccountId,
    /// Name of the route that performed the login.
    pub route: String,
    pub langcode: String,
}

impl LoginEvent {
    pub fn new(account_id: AccountId, route: &str, langcode: &str) -> Self {
        Self {
            account_id,
            route: route.to_string(),
            langcode: langcode.to_string(),
        }
    }
}

/// Where the login handler sends the browser once subscribers have run.
/// The last subscriber to set it wins.
#[derive(Debug, Default, Clone)]
pub struct PostLoginRedirect {
    destination: Option<String>,
}

impl PostLoginRedirect {
    pub fn set(&mut self, destination: impl Into<String>) {
        self.destination = Some(destination.into());
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }
}

pub trait LoginSubscriber: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_login(&self, event: &LoginEvent, redirect: &mut PostLoginRedirect);
}

/// Subscribers ordered by priority, highest first. Equal priorities run in
/// registration order.
#[derive(Default, Clone)]
pub struct LoginEvents {
    subscribers: Vec<(i32, Arc<dyn LoginSubscriber>)>,
}

impl LoginEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, priority: i32, subscriber: Arc<dyn LoginSubscriber>) {
        let at = self
            .subscribers
            .iter()
            .position(|(p, _)| *p < priority)
            .unwrap_or(self.subscribers.len());
        self.subscribers.insert(at, (priority, subscriber));
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn dispatch(&self, event: &LoginEvent) -> PostLoginRedirect {
        let mut redirect = PostLoginRedirect::default();
        for (priority, subscriber) in &self.subscribers {
            tracing::debug!(
                subscriber = subscriber.name(),
                priority = priority,
                route = %event.route,
                "Dispatching login event"
            );
            subscriber.on_login(event, &mut redirect);
        }
        redirect
    }
}

/// Sends freshly authenticated browsers into the relay instead of their
/// normal post-login destination.
pub struct LoginEntrySubscriber {
    excluded_routes: Vec<String>,
    default_language: String,
}

impl LoginEntrySubscriber {
    /// Runs after everything else so its destination is the one kept.
    pub const PRIORITY: i32 = -100;

    pub fn new(excluded_routes: Vec<String>, default_language: &str) -> Self {
        Self {
            excluded_routes,
            default_language: default_language.to_string(),
        }
    }

    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self::new(
            settings.excluded_login_routes.clone(),
            &settings.default_language,
        )
    }

    pub fn is_excluded(&self, route: &str) -> bool {
        self.excluded_routes.iter().any(|r| r == route)
    }

    fn entry_point(&self, langcode: &str) -> String {
        if langcode.is_empty() || langcode == self.default_language {
            RELAY_START_PATH.to_string()
        } else {
            format!("{}?lang={}", RELAY_START_PATH, langcode)
        }
    }
}

impl LoginSubscriber for LoginEntrySubscriber {
    fn name(&self) -> &'static str {
        "login_entry"
    }

    fn on_login(&self, event: &LoginEvent, redirect: &mut PostLoginRedirect) {
        if self.is_excluded(&event.route) {
            return;
        }
        redirect.set(self.entry_point(&event.langcode));
    }
}
