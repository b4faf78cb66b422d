//! Decides where the browser goes after a hop: the next ring member, or the
//! success destination once the ring has come back round to where the flow
//! started.

use super::{
    error::{RelayError, ServiceError},
    hooks::RelayHooks,
    ring::{CurrentDomain, DomainRing},
    token::TokenCodec,
    urls::UrlBuilder,
};
use crate::config::RelaySettings;
use crate::models::{Account, Fingerprint, RequestUrl, ANONYMOUS_ACCOUNT_ID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hop {
    /// Relay URL on the next ring member.
    Relay(String),
    /// The ring is closed; success destination on the originating domain.
    Terminal(String),
}

impl Hop {
    pub fn url(&self) -> &str {
        match self {
            Hop::Relay(url) | Hop::Terminal(url) => url,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Hop::Terminal(_))
    }

    fn url_mut(&mut self) -> &mut String {
        match self {
            Hop::Relay(url) | Hop::Terminal(url) => url,
        }
    }
}

pub struct HopPlanner<'a> {
    settings: &'a RelaySettings,
    codec: &'a TokenCodec,
    hooks: &'a dyn RelayHooks,
}

impl<'a> HopPlanner<'a> {
    pub fn new(settings: &'a RelaySettings, codec: &'a TokenCodec, hooks: &'a dyn RelayHooks) -> Self {
        Self {
            settings,
            codec,
            hooks,
        }
    }

    fn ring(&self) -> Result<DomainRing, RelayError> {
        DomainRing::from_config(&self.settings.domains, self.hooks)
    }

    /// Fingerprint of the domain serving `request`; the referrer of a flow
    /// started there.
    pub fn origin_fingerprint(&self, request: &RequestUrl) -> Result<Fingerprint, RelayError> {
        let ring = self.ring()?;
        let current = ring.resolve_current(&request.url, &request.origin, self.hooks);
        Ok(ring.fingerprint_of(&current))
    }

    /// Plan the first hop of a flow started on the domain serving `request`.
    pub fn plan_start(
        &self,
        request: &RequestUrl,
        account: Option<&Account>,
        langcode: &str,
        now: i64,
    ) -> Result<Hop, RelayError> {
        let referrer = self.origin_fingerprint(request)?;
        self.plan(request, account, referrer, langcode, true, now)
    }

    /// Plan the URL following the hop served by `request`.
    ///
    /// `account` is the account authenticated on this domain; relay tokens
    /// are issued for it. Without one the next hop receives the anonymous
    /// id and is rejected there, while the ring still advances.
    pub fn plan(
        &self,
        request: &RequestUrl,
        account: Option<&Account>,
        referrer: Fingerprint,
        langcode: &str,
        first_hop: bool,
        now: i64,
    ) -> Result<Hop, RelayError> {
        let ring = self.ring()?;
        // Without a member to return to the ring would never close
        if !first_hop && !ring.domains().iter().any(|d| d.fingerprint() == referrer) {
            return Err(RelayError::UnknownReferrer(referrer));
        }

        let current = ring.resolve_current(&request.url, &request.origin, self.hooks);
        let next = ring.next(&current)?;
        let urls = UrlBuilder::new(self.settings);

        let mut hop = if !first_hop && next.fingerprint() == referrer {
            Hop::Terminal(urls.success_url(next, langcode, &ring))
        } else {
            let anonymous;
            let account = match account {
                Some(account) => account,
                None => {
                    anonymous = Account::new(ANONYMOUS_ACCOUNT_ID, "", "");
                    &anonymous
                }
            };
            let token = self
                .codec
                .issue(account, now)
                .map_err(ServiceError::from)?;
            Hop::Relay(urls.relay_url(next, referrer, account.id, now, &token, langcode))
        };

        self.hooks.alter_url(hop.url_mut(), next);

        if self.settings.extra_logging() {
            tracing::debug!(
                current = %current_label(&ring, &current),
                next = %next,
                terminal = hop.is_terminal(),
                "Planned relay hop"
            );
        }

        Ok(hop)
    }
}

fn current_label<'r>(ring: &'r DomainRing, current: &'r CurrentDomain) -> &'r str {
    match current {
        CurrentDomain::Member(index) => ring.domains()[*index].as_str(),
        CurrentDomain::Foreign(domain) => domain.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::hooks::NoopHooks;
    use crate::services::ring::TrustedDomain;
    use secrecy::SecretString;

    const NOW: i64 = 1_700_000_000;

    fn settings(domains: &[&str]) -> RelaySettings {
        RelaySettings {
            timeout_seconds: 60,
            domains: domains.iter().map(|d| d.to_string()).collect(),
            force_logout: false,
            enable_extra_logging: true,
            redirect_success: "/welcome".to_string(),
            redirect_error: String::new(),
            hash_salt: SecretString::new("salt".to_string()),
            default_language: "en".to_string(),
            languages: vec!["en".to_string(), "nl".to_string()],
            excluded_login_routes: vec![],
        }
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(SecretString::new("salt".to_string()))
    }

    fn account() -> Account {
        Account::new(42, "alice@example.com", "hash")
    }

    fn request(url: &str) -> RequestUrl {
        let end = url
            .find("://")
            .and_then(|i| url[i + 3..].find('/').map(|j| i + 3 + j))
            .unwrap_or(url.len());
        RequestUrl::new(&url[..end], &url[end..])
    }

    /// Host part of a planned URL, as the browser would request it next.
    fn host_of(url: &str) -> String {
        request(url).origin
    }

    #[test]
    fn test_start_relays_to_next_domain() {
        let settings = settings(&["https://a.example", "https://b.example"]);
        let codec = codec();
        let planner = HopPlanner::new(&settings, &codec, &NoopHooks);

        let hop = planner
            .plan_start(&request("https://a.example/relay/start"), Some(&account()), "en", NOW)
            .unwrap();

        let token = codec.issue(&account(), NOW).unwrap();
        assert_eq!(
            hop,
            Hop::Relay(format!(
                "https://b.example/relay/{}/42/{}/{}/en",
                Fingerprint::of("https://a.example"),
                NOW,
                token
            ))
        );
    }

    #[test]
    fn test_ring_closes_after_every_other_member() {
        let settings = settings(&["https://a.example", "https://b.example", "https://c.example"]);
        let codec = codec();
        let planner = HopPlanner::new(&settings, &codec, &NoopHooks);
        let referrer = Fingerprint::of("https://a.example");

        let mut hop = planner
            .plan_start(&request("https://a.example/relay/start"), Some(&account()), "en", NOW)
            .unwrap();
        let mut visited = Vec::new();

        while let Hop::Relay(url) = &hop {
            assert!(visited.len() < 3, "ring never closed: {:?}", visited);
            visited.push(host_of(url));
            hop = planner
                .plan(&request(url), Some(&account()), referrer, "en", false, NOW)
                .unwrap();
        }

        assert_eq!(visited, vec!["https://b.example", "https://c.example"]);
        assert_eq!(hop, Hop::Terminal("https://a.example/welcome".to_string()));
    }

    #[test]
    fn test_single_domain_ring_relays_to_itself_once() {
        let settings = settings(&["https://a.example"]);
        let codec = codec();
        let planner = HopPlanner::new(&settings, &codec, &NoopHooks);
        let referrer = Fingerprint::of("https://a.example");

        let first = planner
            .plan_start(&request("https://a.example/relay/start"), Some(&account()), "en", NOW)
            .unwrap();
        assert!(first.url().starts_with("https://a.example/relay/"));

        let second = planner
            .plan(&request(first.url()), Some(&account()), referrer, "en", false, NOW)
            .unwrap();
        assert_eq!(second, Hop::Terminal("https://a.example/welcome".to_string()));
    }

    #[test]
    fn test_terminal_url_is_localized() {
        let settings = settings(&["https://a.example", "https://b.example"]);
        let codec = codec();
        let planner = HopPlanner::new(&settings, &codec, &NoopHooks);

        let hop = planner
            .plan(
                &request("https://b.example/relay/1/42/1/tok/nl"),
                Some(&account()),
                Fingerprint::of("https://a.example"),
                "nl",
                false,
                NOW,
            )
            .unwrap();
        assert_eq!(hop, Hop::Terminal("https://a.example/nl/welcome".to_string()));
    }

    #[test]
    fn test_without_session_the_anonymous_id_is_relayed() {
        let settings = settings(&["https://a.example", "https://b.example"]);
        let codec = codec();
        let planner = HopPlanner::new(&settings, &codec, &NoopHooks);

        let hop = planner
            .plan_start(&request("https://a.example/relay/start"), None, "en", NOW)
            .unwrap();
        let prefix = format!(
            "https://b.example/relay/{}/0/{}/",
            Fingerprint::of("https://a.example"),
            NOW
        );
        assert!(hop.url().starts_with(&prefix), "{}", hop.url());
    }

    #[test]
    fn test_foreign_host_is_rejected() {
        let settings = settings(&["https://a.example", "https://b.example"]);
        let codec = codec();
        let planner = HopPlanner::new(&settings, &codec, &NoopHooks);

        let err = planner
            .plan_start(&request("https://evil.example/relay/start"), Some(&account()), "en", NOW)
            .unwrap_err();
        assert!(matches!(err, RelayError::DomainNotInRing(d) if d == "https://evil.example"));
    }

    #[test]
    fn test_referrer_outside_the_ring_is_rejected() {
        let settings = settings(&["https://a.example", "https://b.example"]);
        let codec = codec();
        let planner = HopPlanner::new(&settings, &codec, &NoopHooks);
        let referrer = Fingerprint::from(12345);

        let err = planner
            .plan(
                &request("https://b.example/relay/12345/42/1/tok/en"),
                Some(&account()),
                referrer,
                "en",
                false,
                NOW,
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::UnknownReferrer(fp) if fp == referrer));
    }

    #[test]
    fn test_referrer_removed_from_the_ring_is_rejected() {
        let codec = codec();
        let before = settings(&["https://a.example", "https://b.example", "https://c.example"]);
        let hop = HopPlanner::new(&before, &codec, &NoopHooks)
            .plan_start(&request("https://a.example/relay/start"), Some(&account()), "en", NOW)
            .unwrap();

        let after = settings(&["https://b.example", "https://c.example"]);
        let err = HopPlanner::new(&after, &codec, &NoopHooks)
            .plan(
                &request(hop.url()),
                Some(&account()),
                Fingerprint::of("https://a.example"),
                "en",
                false,
                NOW,
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::UnknownReferrer(_)));
    }

    struct TrackingHooks;

    impl RelayHooks for TrackingHooks {
        fn alter_url(&self, url: &mut String, target: &TrustedDomain) {
            url.push_str(&format!("?via={}", target.fingerprint()));
        }
    }

    #[test]
    fn test_url_hook_sees_target_domain() {
        let settings = settings(&["https://a.example", "https://b.example"]);
        let codec = codec();
        let planner = HopPlanner::new(&settings, &codec, &TrackingHooks);

        let hop = planner
            .plan(
                &request("https://b.example/relay/1/42/1/tok/en"),
                Some(&account()),
                Fingerprint::of("https://a.example"),
                "en",
                false,
                NOW,
            )
            .unwrap();
        assert_eq!(
            hop.url(),
            format!(
                "https://a.example/welcome?via={}",
                Fingerprint::of("https://a.example")
            )
        );
    }
}
