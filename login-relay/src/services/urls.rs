//! Absolute, language-qualified URL generation for relay hops and terminal
//! destinations.

use crate::config::RelaySettings;
use crate::models::{AccountId, Fingerprint};

use super::ring::{DomainRing, TrustedDomain};

pub const RELAY_START_PATH: &str = "/relay/start";
pub const RELAY_LOGIN_PATH: &str = "/relay/:referrer/:account_id/:timestamp/:token/:langcode";

pub struct UrlBuilder<'a> {
    settings: &'a RelaySettings,
}

impl<'a> UrlBuilder<'a> {
    pub fn new(settings: &'a RelaySettings) -> Self {
        Self { settings }
    }

    /// Pick a configured language, falling back to the default.
    pub fn negotiate_language(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|lang| self.settings.languages.iter().any(|l| l == lang))
            .unwrap_or(self.settings.default_language.as_str())
            .to_string()
    }

    pub fn relay_url(
        &self,
        target: &TrustedDomain,
        referrer: Fingerprint,
        account_id: AccountId,
        timestamp: i64,
        token: &str,
        langcode: &str,
    ) -> String {
        format!(
            "{}/relay/{}/{}/{}/{}/{}",
            target, referrer, account_id, timestamp, token, langcode
        )
    }

    /// The configured success destination, placed on `target`.
    pub fn success_url(&self, target: &TrustedDomain, langcode: &str, ring: &DomainRing) -> String {
        self.destination_url(
            &self.settings.redirect_success,
            target.as_str(),
            langcode,
            ring.domains(),
        )
    }

    /// The configured error destination, placed on `base`. `None` when no
    /// error destination is configured.
    pub fn error_url(
        &self,
        base: &str,
        langcode: &str,
        domains: &[TrustedDomain],
    ) -> Option<String> {
        if self.settings.redirect_error.trim().is_empty() {
            return None;
        }
        Some(self.destination_url(&self.settings.redirect_error, base, langcode, domains))
    }

    fn destination_url(
        &self,
        destination: &str,
        base: &str,
        langcode: &str,
        domains: &[TrustedDomain],
    ) -> String {
        let destination = destination.trim();
        let base = base.trim_end_matches('/');

        if destination.starts_with("https://") || destination.starts_with("http://") {
            // Absolute destinations on a ring domain move to the target domain;
            // anything else is left alone.
            return match domains.iter().find(|d| d.prefixes(destination)) {
                Some(domain) => format!("{}{}", base, &destination[domain.as_str().len()..]),
                None => destination.to_string(),
            };
        }

        let path = if destination.is_empty() {
            "/".to_string()
        } else if destination.starts_with('/') {
            destination.to_string()
        } else {
            format!("/{}", destination)
        };

        let prefix = self.language_prefix(langcode);
        if path == "/" && !prefix.is_empty() {
            format!("{}{}", base, prefix)
        } else {
            format!("{}{}{}", base, prefix, path)
        }
    }

    fn language_prefix(&self, langcode: &str) -> String {
        if langcode.is_empty() || langcode == self.settings.default_language {
            String::new()
        } else {
            format!("/{}", langcode)
        }
    }
}
