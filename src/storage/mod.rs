//! History store contracts and the SQLite implementation.
//!
//! The extractor only reads dump history ([`HistoryStore`]) and writes one
//! feature row per dump ([`FeatureSink`]). Both are traits so the pipeline can
//! run against any backend that can answer windowed scans.

mod sqlite;

pub use sqlite::SqliteHistory;

use crate::error::StoreResult;
use crate::features::{RowIdentity, WindowSpec};
use crate::records::{DumpEvent, WindowRecord};
use crate::scopes::ScopeKey;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Read side of the dump history.
pub trait HistoryStore {
    /// Point lookup of a dump by id.
    fn dump(&self, dump_id: i64) -> StoreResult<Option<DumpEvent>>;

    /// Every non-corrupt dump matching `key` inside `window`, each joined with
    /// the most recent label summary mapped to it. Order is by `dump_id`.
    fn scan_window(&self, key: &ScopeKey, window: &WindowSpec) -> StoreResult<Vec<WindowRecord>>;

    /// Most specific routing prefix containing `addr`, if any.
    fn containing_prefix(&self, addr: IpAddr) -> StoreResult<Option<IpNetwork>>;
}

/// Write side: keyed upsert of feature rows.
pub trait FeatureSink {
    /// Discard any existing row for the dump and insert its identity fields.
    fn reset_row(&self, identity: &RowIdentity) -> StoreResult<()>;

    /// Overwrite the named columns of an existing row.
    fn update_group(&self, dump_id: i64, fields: &[Field]) -> StoreResult<()>;

    /// Read a persisted row back, column by column.
    fn feature_row(&self, dump_id: i64) -> StoreResult<Option<StoredRow>>;
}

/// A nullable column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<Option<i64>> for FieldValue {
    fn from(v: Option<i64>) -> Self {
        v.map_or(FieldValue::Null, FieldValue::Integer)
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(FieldValue::Null, FieldValue::Real)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Integer(i64::from(v))
    }
}

/// One column assignment within a field group.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub column: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// A persisted feature row keyed by column name.
pub type StoredRow = BTreeMap<String, FieldValue>;
