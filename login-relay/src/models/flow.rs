//! Flow state of a relay. Everything here travels in URLs; nothing is stored.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::AccountId;

/// CRC32 of a domain string, used on the wire to name the domain a flow
/// started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(u32);

impl Fingerprint {
    pub fn of(domain: &str) -> Self {
        Self(crc32fast::hash(domain.as_bytes()))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Fingerprint {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Path parameters of a relay hop:
/// `/relay/{referrer}/{account_id}/{timestamp}/{token}/{langcode}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayParams {
    pub referrer: Fingerprint,
    pub account_id: AccountId,
    pub timestamp: i64,
    pub token: String,
    pub langcode: String,
}

/// The absolute location of the request being served, as the browser sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    /// `scheme://host[:port]`
    pub origin: String,
    /// Origin followed by path and query.
    pub url: String,
}

impl RequestUrl {
    pub fn new(origin: &str, path_and_query: &str) -> Self {
        let origin = origin.trim_end_matches('/').to_string();
        let url = format!("{}{}", origin, path_and_query);
        Self { origin, url }
    }
}
