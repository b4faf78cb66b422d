//! The ordered, circular set of trusted domains.
//!
//! Ring members are identified by their position in the configured list.
//! Fingerprints are only computed for the wire.

use std::fmt;

use super::{error::RelayError, hooks::RelayHooks};
use crate::models::Fingerprint;

/// A configured `scheme://host[:port]` entry, without trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrustedDomain(String);

impl TrustedDomain {
    /// Scheme and host are lowercased to match how request URLs are read.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }

        let authority_end = trimmed
            .find("://")
            .map(|i| i + 3)
            .and_then(|start| trimmed[start..].find('/').map(|j| start + j))
            .unwrap_or(trimmed.len());
        let (origin, path) = trimmed.split_at(authority_end);
        Some(Self(format!("{}{}", origin.to_ascii_lowercase(), path)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.0)
    }

    /// True when `url` starts with this domain and the match ends at an origin
    /// boundary, so `https://a.example` does not claim `https://a.example.org`.
    pub fn prefixes(&self, url: &str) -> bool {
        match url.strip_prefix(self.0.as_str()) {
            Some(rest) => {
                rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') || rest.starts_with('#')
            }
            None => false,
        }
    }
}

impl fmt::Display for TrustedDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the current request sits relative to the ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentDomain {
    /// Index into the ring.
    Member(usize),
    /// The request's own origin, which is not configured.
    Foreign(String),
}

#[derive(Debug, Clone)]
pub struct DomainRing {
    domains: Vec<TrustedDomain>,
}

impl DomainRing {
    /// Build a ring, dropping blank and repeated entries. Fails when nothing
    /// is left.
    pub fn new<I, S>(domains: I) -> Result<Self, RelayError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ring: Vec<TrustedDomain> = Vec::new();
        for domain in domains.into_iter().filter_map(|raw| TrustedDomain::parse(raw.as_ref())) {
            if !ring.contains(&domain) {
                ring.push(domain);
            }
        }

        if ring.is_empty() {
            return Err(RelayError::EmptyRing);
        }

        Ok(Self { domains: ring })
    }

    /// Build the ring for one request from configuration, letting hooks
    /// rewrite the list first.
    pub fn from_config(domains: &[String], hooks: &dyn RelayHooks) -> Result<Self, RelayError> {
        let mut domains = domains.to_vec();
        hooks.alter_domains(&mut domains);
        Self::new(domains)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn domains(&self) -> &[TrustedDomain] {
        &self.domains
    }

    pub fn position(&self, domain: &str) -> Option<usize> {
        let domain = TrustedDomain::parse(domain)?;
        self.domains.iter().position(|d| *d == domain)
    }

    /// Resolve the current domain of a request.
    ///
    /// The first configured domain prefixing `request_url` wins; otherwise the
    /// request's own origin is used. Hooks may then rewrite the result.
    pub fn resolve_current(
        &self,
        request_url: &str,
        request_origin: &str,
        hooks: &dyn RelayHooks,
    ) -> CurrentDomain {
        let mut domain = self
            .domains
            .iter()
            .find(|d| d.prefixes(request_url))
            .map(|d| d.as_str().to_string())
            .unwrap_or_else(|| request_origin.trim_end_matches('/').to_string());

        let list: Vec<String> = self.domains.iter().map(|d| d.as_str().to_string()).collect();
        hooks.alter_current_domain(&mut domain, &list);

        match self.position(&domain) {
            Some(index) => CurrentDomain::Member(index),
            None => CurrentDomain::Foreign(domain),
        }
    }

    /// The domain following `current`, wrapping from the last entry to the
    /// first. A foreign domain has no successor.
    pub fn next(&self, current: &CurrentDomain) -> Result<&TrustedDomain, RelayError> {
        match current {
            CurrentDomain::Member(index) => Ok(&self.domains[(index + 1) % self.domains.len()]),
            CurrentDomain::Foreign(domain) => Err(RelayError::DomainNotInRing(domain.clone())),
        }
    }

    pub fn fingerprint_of(&self, current: &CurrentDomain) -> Fingerprint {
        match current {
            CurrentDomain::Member(index) => self.domains[*index].fingerprint(),
            CurrentDomain::Foreign(domain) => Fingerprint::of(domain),
        }
    }
}
