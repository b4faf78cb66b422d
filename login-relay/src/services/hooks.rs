//! Extension points for deployments that need to rewrite domains or URLs,
//! e.g. to map host aliases onto ring members.

use super::ring::TrustedDomain;

/// Injected alteration hooks. Every method defaults to a no-op.
pub trait RelayHooks: Send + Sync {
    /// Rewrite the configured domain list before it becomes a ring.
    fn alter_domains(&self, _domains: &mut Vec<String>) {}

    /// Rewrite the domain resolved for the current request.
    fn alter_current_domain(&self, _domain: &mut String, _domains: &[String]) {}

    /// Rewrite a planned URL before it is sent to the browser.
    fn alter_url(&self, _url: &mut String, _target: &TrustedDomain) {}
}

/// Hooks that change nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl RelayHooks for NoopHooks {}
