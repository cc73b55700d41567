//! Feature extraction: window policy, per-scope statistics, URL shapes,
//! request-derived fields and the row they all land in.

pub mod domain;
mod pipeline;
mod request;
mod shape;
mod stats;
mod urls;
mod window;

pub use pipeline::{ExtractionReport, FeatureExtractor};
pub use request::{ExtensionClass, RequestFeatures};
pub use shape::{ShapeRejection, ShapeSynthesizer, UrlShape};
pub use stats::{
    HashFeatures, StatBundle, SuspiciousDenominator, UrlStats, SUSPICIOUS_LABEL_THRESHOLD,
    TRUSTED_LABEL_THRESHOLD,
};
pub use window::{WindowPolicy, WindowSpec};

use crate::records::DumpEvent;
use crate::scopes::{Scope, ScopeFeatures};
use serde::{Deserialize, Serialize};

/// SQL storage class of a feature column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
}

impl ColumnKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }
}

/// Every derived column of the feature row, in table order. Identity columns
/// (`dump_id`, `corrupt`, `sha1`, `host`) are not included.
pub fn feature_columns() -> Vec<(String, ColumnKind)> {
    let mut cols = Vec::new();
    for scope in [
        Scope::Host,
        Scope::SecondLevelDomain,
        Scope::ServerAddress,
        Scope::NetworkPrefix,
        Scope::ContentHash,
    ] {
        for (name, kind) in StatBundle::COLUMNS {
            cols.push((format!("{}_{name}", scope.column_prefix()), *kind));
        }
    }
    for (name, kind) in HashFeatures::EXTRA_COLUMNS {
        cols.push((name.to_string(), *kind));
    }
    for (name, kind) in RequestFeatures::COLUMNS {
        cols.push((name.to_string(), *kind));
    }
    for scope in [Scope::ExactUrl, Scope::UrlShape] {
        for (name, kind) in UrlStats::COLUMNS {
            cols.push((format!("{}_{name}", scope.column_prefix()), *kind));
        }
    }
    cols
}

/// Identity fields copied verbatim from the dump when the row is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIdentity {
    pub dump_id: i64,
    pub corrupt: bool,
    pub content_hash: Option<String>,
    pub host: String,
}

impl From<&DumpEvent> for RowIdentity {
    fn from(d: &DumpEvent) -> Self {
        Self {
            dump_id: d.dump_id,
            corrupt: d.corrupt,
            content_hash: d.content_hash.clone(),
            host: d.host.clone(),
        }
    }
}

/// In-memory view of one dump's feature row. `None` groups were skipped,
/// failed, or not yet computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub identity: RowIdentity,
    pub request: Option<RequestFeatures>,
    pub host: Option<StatBundle>,
    pub twold: Option<StatBundle>,
    pub server_ip: Option<StatBundle>,
    pub bgp: Option<StatBundle>,
    pub hash: Option<HashFeatures>,
    pub url: Option<UrlStats>,
    pub url_struct: Option<UrlStats>,
}

impl FeatureRow {
    pub fn new(identity: RowIdentity) -> Self {
        Self {
            identity,
            request: None,
            host: None,
            twold: None,
            server_ip: None,
            bgp: None,
            hash: None,
            url: None,
            url_struct: None,
        }
    }

    pub fn dump_id(&self) -> i64 {
        self.identity.dump_id
    }

    /// Store a scope's contribution in its group.
    pub fn apply(&mut self, scope: Scope, features: ScopeFeatures) {
        match (scope, features) {
            (Scope::Host, ScopeFeatures::Stats(s)) => self.host = Some(s),
            (Scope::SecondLevelDomain, ScopeFeatures::Stats(s)) => self.twold = Some(s),
            (Scope::ServerAddress, ScopeFeatures::Stats(s)) => self.server_ip = Some(s),
            (Scope::NetworkPrefix, ScopeFeatures::Stats(s)) => self.bgp = Some(s),
            (Scope::ContentHash, ScopeFeatures::Hash(h)) => self.hash = Some(h),
            (Scope::ExactUrl, ScopeFeatures::Url(u)) => self.url = Some(u),
            (Scope::UrlShape, ScopeFeatures::Url(u)) => self.url_struct = Some(u),
            (scope, other) => {
                tracing::warn!(%scope, features = ?other, "scope produced an unexpected feature group");
            }
        }
    }
}
