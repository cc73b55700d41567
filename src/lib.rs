//! Historical feature extraction for downloaded binaries ("dumps").
//!
//! Modular structure:
//! - [`storage`] — History store / feature sink contracts and SQLite backend
//! - [`records`] — Dump events and label summaries
//! - [`features`] — Window policy, statistics, URL shapes, extraction pipeline
//! - [`scopes`] — One aggregator per grouping dimension
//! - [`logging`] — Structured progress logging

pub mod config;
pub mod error;
pub mod features;
pub mod logging;
pub mod records;
pub mod scopes;
pub mod storage;

pub use config::AppConfig;
pub use error::{ExtractError, StoreError, StoreResult};
pub use features::{ExtractionReport, FeatureExtractor, FeatureRow};
pub use logging::StructuredLogger;
pub use records::{DumpEvent, LabelSummary};
pub use scopes::{Scope, ScopeOutcome};
pub use storage::{FeatureSink, HistoryStore, SqliteHistory};
