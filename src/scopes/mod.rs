//! Scope aggregators: one strategy per dimension along which prior downloads
//! are grouped (host, domain, server, prefix, hash, URL, URL shape).
//! Each derives a [`ScopeKey`] from the target dump and aggregates the
//! history that matches it inside the window.

mod domain;
mod hash;
mod host;
mod prefix;
mod server;
mod shape;
mod url;

pub use domain::DomainAggregator;
pub use hash::ContentHashAggregator;
pub use host::HostAggregator;
pub use prefix::NetworkPrefixAggregator;
pub use server::ServerAddressAggregator;
pub use shape::UrlShapeAggregator;
pub use url::ExactUrlAggregator;

use crate::config::FeaturesConfig;
use crate::error::StoreResult;
use crate::features::domain::{host_address, normalize_host, reverse_labels};
use crate::features::{HashFeatures, StatBundle, UrlShape, UrlStats, WindowSpec};
use crate::records::DumpEvent;
use crate::storage::{Field, HistoryStore};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Host,
    SecondLevelDomain,
    ServerAddress,
    NetworkPrefix,
    ContentHash,
    ExactUrl,
    UrlShape,
}

impl Scope {
    pub fn name(&self) -> &'static str {
        match self {
            Scope::Host => "host",
            Scope::SecondLevelDomain => "second_level_domain",
            Scope::ServerAddress => "server_address",
            Scope::NetworkPrefix => "network_prefix",
            Scope::ContentHash => "content_hash",
            Scope::ExactUrl => "exact_url",
            Scope::UrlShape => "url_shape",
        }
    }

    /// Prefix of this scope's columns in the feature row.
    pub fn column_prefix(&self) -> &'static str {
        match self {
            Scope::Host => "host",
            Scope::SecondLevelDomain => "twold",
            Scope::ServerAddress => "server_ip",
            Scope::NetworkPrefix => "bgp",
            Scope::ContentHash => "hash",
            Scope::ExactUrl => "url",
            Scope::UrlShape => "url_struct",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Matching predicate for one scope, derived once per target dump.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeKey {
    /// Exact host string
    Host(String),
    /// Literal-address host, compared after any port is stripped
    Address(IpAddr),
    /// Registrable domain in reversed-label form (`com.example`); matches every
    /// host whose reversed labels start with it.
    Domain(String),
    Server(IpAddr),
    Prefix(IpNetwork),
    Hash(String),
    Url(String),
    Shape(UrlShape),
}

impl ScopeKey {
    pub fn matches(&self, event: &DumpEvent) -> bool {
        match self {
            ScopeKey::Host(h) => event.host == *h,
            ScopeKey::Address(addr) => host_address(&event.host) == Some(*addr),
            ScopeKey::Domain(reversed) => {
                let host = reverse_labels(&normalize_host(&event.host));
                host == *reversed
                    || host
                        .strip_prefix(reversed.as_str())
                        .map_or(false, |rest| rest.starts_with('.'))
            }
            ScopeKey::Server(addr) => event.server_address == *addr,
            ScopeKey::Prefix(network) => network.contains(event.server_address),
            ScopeKey::Hash(h) => event.content_hash.as_deref() == Some(h.as_str()),
            ScopeKey::Url(u) => event.url.as_deref() == Some(u.as_str()),
            ScopeKey::Shape(shape) => event.url.as_deref().map_or(false, |u| shape.matches(u)),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Host(h) => write!(f, "host={h}"),
            ScopeKey::Address(a) => write!(f, "address={a}"),
            ScopeKey::Domain(d) => write!(f, "domain={d}.*"),
            ScopeKey::Server(a) => write!(f, "server={a}"),
            ScopeKey::Prefix(p) => write!(f, "prefix={p}"),
            ScopeKey::Hash(h) => write!(f, "hash={h}"),
            ScopeKey::Url(u) => write!(f, "url={u}"),
            ScopeKey::Shape(s) => write!(f, "shape={s}"),
        }
    }
}

/// Result of deriving a key for one dump.
#[derive(Debug, Clone, PartialEq)]
pub enum Applicability {
    Applies(ScopeKey),
    NotApplicable(String),
}

/// What an aggregator contributes to the feature row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeFeatures {
    Stats(StatBundle),
    Hash(HashFeatures),
    Url(UrlStats),
}

impl ScopeFeatures {
    pub fn fields(&self, prefix: &str) -> Vec<Field> {
        match self {
            ScopeFeatures::Stats(s) => s.fields(prefix),
            ScopeFeatures::Hash(h) => h.fields(prefix),
            ScopeFeatures::Url(u) => u.fields(prefix),
        }
    }
}

/// Per-scope outcome of one extraction run.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeOutcome {
    Computed,
    Skipped(String),
    Failed(String),
}

impl ScopeOutcome {
    pub fn is_computed(&self) -> bool {
        matches!(self, ScopeOutcome::Computed)
    }
}

pub trait ScopeAggregator {
    fn scope(&self) -> Scope;

    /// Derive the matching predicate for `dump`, or say why the scope does not apply.
    fn key_for(&self, dump: &DumpEvent, store: &dyn HistoryStore) -> StoreResult<Applicability>;

    /// Which part of `window` this scope aggregates over. Defaults to all of it.
    fn window(&self, window: &WindowSpec) -> WindowSpec {
        *window
    }

    fn aggregate(
        &self,
        key: &ScopeKey,
        window: &WindowSpec,
        store: &dyn HistoryStore,
    ) -> StoreResult<ScopeFeatures>;
}

/// Every scope, in the order extraction runs them.
pub fn default_aggregators(config: &FeaturesConfig) -> Vec<Box<dyn ScopeAggregator>> {
    vec![
        Box::new(HostAggregator::new(config.host_suspicious_over_hashes)),
        Box::new(ServerAddressAggregator),
        Box::new(NetworkPrefixAggregator),
        Box::new(DomainAggregator),
        Box::new(ContentHashAggregator),
        Box::new(ExactUrlAggregator),
        Box::new(UrlShapeAggregator::new(config.min_shape_len)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ev(host: &str) -> DumpEvent {
        DumpEvent::new(1, host, "192.0.2.1".parse().unwrap(), Utc::now())
    }

    #[test]
    fn domain_key_matches_on_label_boundaries() {
        let key = ScopeKey::Domain("com.example".to_string());
        assert!(key.matches(&ev("example.com")));
        assert!(key.matches(&ev("dl.example.com")));
        assert!(key.matches(&ev("A.B.EXAMPLE.COM")));
        assert!(!key.matches(&ev("badexample.com")));
        assert!(!key.matches(&ev("example.com.evil.net")));
    }

    #[test]
    fn address_key_ignores_ports() {
        let key = ScopeKey::Address("198.51.100.4".parse().unwrap());
        assert!(key.matches(&ev("198.51.100.4")));
        assert!(key.matches(&ev("198.51.100.4:8080")));
        assert!(!key.matches(&ev("203.0.100.4")));
        assert!(!key.matches(&ev("198.51.100.40")));
    }

    #[test]
    fn prefix_key_uses_containment() {
        let key = ScopeKey::Prefix("192.0.2.0/24".parse().unwrap());
        assert!(key.matches(&ev("x")));
        let other = ScopeKey::Prefix("198.51.100.0/24".parse().unwrap());
        assert!(!other.matches(&ev("x")));
        let v6 = ScopeKey::Prefix("2001:db8::/32".parse().unwrap());
        assert!(!v6.matches(&ev("x")));
    }
}
