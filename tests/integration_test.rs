//! Integration tests: config load, full extraction runs against an in-memory
//! history, persistence and failure containment.

mod common;

use common::{at, dump, sha, History, HOST};
use dump_features::{
    config::{AppConfig, WindowConfig},
    error::{ConfigError, ExtractError, StoreError, StoreResult},
    features::{FeatureExtractor, RowIdentity, WindowPolicy, WindowSpec},
    records::{DumpEvent, WindowRecord},
    scopes::{
        default_aggregators, Applicability, Scope, ScopeAggregator, ScopeFeatures, ScopeKey,
        ScopeOutcome,
    },
    storage::{Field, FeatureSink, FieldValue, HistoryStore, SqliteHistory, StoredRow},
};
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::path::Path;

#[test]
fn config_load_default() {
    let c = AppConfig::load(Path::new("nonexistent.json"));
    assert_eq!(c.window.max_past_dumps, 500);
    assert_eq!(c.window.max_past_days, 60);
    assert_eq!(c.features.min_shape_len, 10);
    assert!(c.features.host_suspicious_over_hashes);
}

#[test]
fn config_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"window": {"max_past_dumps": 50}}"#).unwrap();
    let c = AppConfig::load(&path);
    assert_eq!(c.window.max_past_dumps, 50);
    assert_eq!(c.window.max_past_days, 60);
    assert_eq!(c.log.level, "info");
}

#[test]
fn config_malformed_file_is_reported_and_defaults_used() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"window": {"max_past_dumps": "fifty"}"#).unwrap();
    assert!(matches!(AppConfig::read(&path), Err(ConfigError::Parse(_))));
    let c = AppConfig::load(&path);
    assert_eq!(c.window.max_past_dumps, 500);
}

/// Ten prior downloads from the host: three clean, two flagged by trusted
/// scanners, five with a single label.
fn host_history() -> History {
    let h = History::new();
    for i in 0..10 {
        let id = 90 + i;
        let ev = dump(id, HOST, at(id)).with_hash(sha(&format!("h{i}")));
        let (trusted, total) = match i {
            0..=2 => (0, 0),
            3..=4 => (2, 5),
            _ => (0, 1),
        };
        h.add_scanned(ev, Some(trusted), Some(total));
    }
    h.add(
        dump(100, HOST, at(100))
            .with_hash(sha("target"))
            .with_url("http://dl.example.com/files/setup.exe?id=100&name=setup")
            .with_referer("http://example.com/"),
    );
    h
}

#[test]
fn host_scope_end_to_end() {
    let h = host_history();
    let config = AppConfig::default();
    let report = FeatureExtractor::new(&h.store, &config).extract(100).unwrap();

    let host = report.row.host.as_ref().unwrap();
    assert_eq!(host.total_downloads, 10);
    assert_eq!(host.benign_downloads, 3);
    assert_eq!(host.benign_ratio, Some(0.3));
    assert_eq!(host.malware_downloads, 2);
    assert_eq!(host.malware_ratio, Some(0.2));
    assert_eq!(host.suspicious_downloads, 2);
    assert_eq!(host.total_hashes, 10);
    assert_eq!(host.unknown_hashes, 0);

    let row = h.store.feature_row(100).unwrap().unwrap();
    assert_eq!(row["host_total_downloads"], FieldValue::Integer(10));
    assert_eq!(row["host_benign_downloads"], FieldValue::Integer(3));
    assert_eq!(row["host_benign_ratio"], FieldValue::Real(0.3));
    assert_eq!(row["host_malware_downloads"], FieldValue::Integer(2));
    assert_eq!(row["host_malware_ratio"], FieldValue::Real(0.2));
    assert_eq!(row["host"], FieldValue::Text(HOST.to_string()));
    assert_eq!(row["sha1"], FieldValue::Text(sha("target")));
    assert_eq!(row["corrupt"], FieldValue::Integer(0));
}

#[test]
fn request_fields_are_stored() {
    let h = host_history();
    FeatureExtractor::new(&h.store, &AppConfig::default())
        .extract(100)
        .unwrap();
    let row = h.store.feature_row(100).unwrap().unwrap();
    assert_eq!(row["referer_exists"], FieldValue::Integer(1));
    assert_eq!(row["host_name_exists"], FieldValue::Integer(1));
    assert_eq!(row["extension_class"], FieldValue::Text("common_ext".into()));
    assert_eq!(row["directory_depth"], FieldValue::Integer(4));
    let url = "http://dl.example.com/files/setup.exe?id=100&name=setup";
    assert_eq!(row["url_length"], FieldValue::Integer(url.len() as i64));
}

#[test]
fn rerun_yields_identical_row() {
    let h = host_history();
    let config = AppConfig::default();
    let extractor = FeatureExtractor::new(&h.store, &config);

    extractor.extract(100).unwrap();
    let first = h.store.feature_row(100).unwrap().unwrap();
    extractor.extract(100).unwrap();
    let second = h.store.feature_row(100).unwrap().unwrap();
    assert_eq!(first, second);
}

#[test]
fn stale_row_is_discarded() {
    let h = host_history();
    let config = AppConfig::default();
    let extractor = FeatureExtractor::new(&h.store, &config);
    extractor.extract(100).unwrap();

    // A value no scope of this dump produces must not survive a rerun.
    h.store
        .update_group(
            100,
            &[Field::new("bgp_total_downloads", 77i64)],
        )
        .unwrap();
    extractor.extract(100).unwrap();
    let row = h.store.feature_row(100).unwrap().unwrap();
    assert!(row["bgp_total_downloads"].is_null());
}

#[test]
fn unknown_dump_is_an_error() {
    let h = History::new();
    let err = FeatureExtractor::new(&h.store, &AppConfig::default())
        .extract(42)
        .unwrap_err();
    assert!(matches!(err, ExtractError::DumpNotFound(42)));
    assert!(h.store.feature_row(42).unwrap().is_none());
}

#[test]
fn window_bounds_by_dump_count() {
    let h = History::new();
    for id in [499, 500, 501, 999, 1001] {
        h.add(dump(id, HOST, at(0)));
    }
    h.add(dump(1000, HOST, at(1)));

    let config = AppConfig::default();
    let report = FeatureExtractor::new(&h.store, &config).extract(1000).unwrap();
    assert_eq!(report.row.host.unwrap().total_downloads, 2);

    let window = WindowSpec {
        dump_id: 1000,
        max_past_dumps: 500,
        not_before: None,
    };
    assert!(!window.contains(&dump(499, HOST, at(0))));
    assert!(!window.contains(&dump(500, HOST, at(0))));
    assert!(window.contains(&dump(999, HOST, at(0))));
    assert!(!window.contains(&dump(1000, HOST, at(0))));
}

#[test]
fn date_cutoff_applies_except_to_content_hash() {
    let h = History::new();
    let hash = sha("same");
    // 61 days before the target's day: outside the 60-day cutoff.
    h.add(dump(10, HOST, at(-61 * 24)).with_hash(&hash).with_client("10.0.0.1"));
    h.add(dump(11, HOST, at(-2)).with_hash(&hash).with_client("10.0.0.1"));
    h.add(dump(12, HOST, at(5)).with_hash(&hash));

    let report = FeatureExtractor::new(&h.store, &AppConfig::default())
        .extract(12)
        .unwrap();
    assert_eq!(report.row.host.as_ref().unwrap().total_downloads, 1);

    let hash_features = report.row.hash.as_ref().unwrap();
    assert_eq!(hash_features.num_dumps, 2);
    assert_eq!(hash_features.life_time, (61 * 24 - 2) * 3600);
    assert_eq!(hash_features.estimated_clients, 2);
    assert_eq!(hash_features.daily_dump_rate_per_client, Some(1.0));
}

#[test]
fn window_policy_counts_days_from_midnight() {
    let policy = WindowPolicy::new(WindowConfig {
        max_past_dumps: 10,
        max_past_days: 1,
    });
    let window = policy.window_for(&dump(50, HOST, at(15)));
    assert_eq!(window.not_before, Some(at(-24)));
    assert_eq!(window.lower_bound(), 40);
}

#[test]
fn corrupt_dumps_are_ignored() {
    let h = History::new();
    h.add(dump(1, HOST, at(0)).corrupted());
    h.add(dump(2, HOST, at(1)));
    h.add(dump(3, HOST, at(2)));
    let report = FeatureExtractor::new(&h.store, &AppConfig::default())
        .extract(3)
        .unwrap();
    assert_eq!(report.row.host.unwrap().total_downloads, 1);
}

#[test]
fn empty_history_leaves_ratios_null() {
    let h = History::new();
    h.add(dump(1, HOST, at(0)).with_hash(sha("x")));
    FeatureExtractor::new(&h.store, &AppConfig::default())
        .extract(1)
        .unwrap();
    let row = h.store.feature_row(1).unwrap().unwrap();
    assert_eq!(row["host_total_downloads"], FieldValue::Integer(0));
    for col in [
        "host_benign_ratio",
        "host_malware_ratio",
        "host_suspicious_ratio",
        "host_unknown_hash_ratio",
        "host_avg_av_labels",
        "server_ip_benign_ratio",
        "hash_malware_ratio",
    ] {
        assert!(row[col].is_null(), "{col} should be null");
    }
}

#[test]
fn inapplicable_scopes_are_skipped() {
    let h = History::new();
    h.add(dump(1, "localhost", at(0)));
    let report = FeatureExtractor::new(&h.store, &AppConfig::default())
        .extract(1)
        .unwrap();

    for scope in [
        Scope::SecondLevelDomain,
        Scope::NetworkPrefix,
        Scope::ContentHash,
        Scope::ExactUrl,
        Scope::UrlShape,
    ] {
        assert!(
            matches!(report.outcome(scope), Some(ScopeOutcome::Skipped(_))),
            "{scope} should be skipped"
        );
    }
    assert_eq!(report.outcome(Scope::Host), Some(&ScopeOutcome::Computed));
    assert_eq!(report.outcome(Scope::ServerAddress), Some(&ScopeOutcome::Computed));

    let row = h.store.feature_row(1).unwrap().unwrap();
    assert!(row["twold_total_downloads"].is_null());
    assert!(row["url_struct_total_downloads"].is_null());
    assert!(row["hash_life_time"].is_null());
    assert_eq!(row["extension_class"], FieldValue::Text("no_url".into()));
}

/// Aggregator that always fails with the given error.
struct Broken(fn() -> StoreError);

impl ScopeAggregator for Broken {
    fn scope(&self) -> Scope {
        Scope::ExactUrl
    }

    fn key_for(&self, dump: &DumpEvent, _store: &dyn HistoryStore) -> StoreResult<Applicability> {
        Ok(Applicability::Applies(ScopeKey::Host(dump.host.clone())))
    }

    fn aggregate(
        &self,
        _key: &ScopeKey,
        _window: &WindowSpec,
        _store: &dyn HistoryStore,
    ) -> StoreResult<ScopeFeatures> {
        Err((self.0)())
    }
}

fn extractor_with<'a>(
    store: &'a SqliteHistory,
    extra: Box<dyn ScopeAggregator>,
) -> FeatureExtractor<'a, SqliteHistory> {
    let config = AppConfig::default();
    let mut aggregators = vec![extra];
    aggregators.extend(default_aggregators(&config.features));
    FeatureExtractor::with_aggregators(store, WindowPolicy::new(config.window), aggregators)
}

#[test]
fn scope_failure_does_not_stop_the_run() {
    let h = host_history();
    let broken = Box::new(Broken(|| StoreError::Query("malformed value".into())));
    let report = extractor_with(&h.store, broken).extract(100).unwrap();

    assert!(matches!(report.outcomes[0].1, ScopeOutcome::Failed(_)));
    assert_eq!(report.outcome(Scope::Host), Some(&ScopeOutcome::Computed));
    assert!(report.row.host.is_some());
}

#[test]
fn unavailable_store_aborts_the_run() {
    let h = host_history();
    let broken = Box::new(Broken(|| StoreError::Unavailable("disk gone".into())));
    let err = extractor_with(&h.store, broken).extract(100).unwrap_err();
    assert!(matches!(err, ExtractError::Store(StoreError::Unavailable(_))));
}

/// Reads pass through; writes touching one column group fail.
struct RejectingWrites<'a> {
    inner: &'a SqliteHistory,
    prefix: &'static str,
}

impl HistoryStore for RejectingWrites<'_> {
    fn dump(&self, dump_id: i64) -> StoreResult<Option<DumpEvent>> {
        self.inner.dump(dump_id)
    }

    fn scan_window(&self, key: &ScopeKey, window: &WindowSpec) -> StoreResult<Vec<WindowRecord>> {
        self.inner.scan_window(key, window)
    }

    fn containing_prefix(&self, addr: IpAddr) -> StoreResult<Option<IpNetwork>> {
        self.inner.containing_prefix(addr)
    }
}

impl FeatureSink for RejectingWrites<'_> {
    fn reset_row(&self, identity: &RowIdentity) -> StoreResult<()> {
        self.inner.reset_row(identity)
    }

    fn update_group(&self, dump_id: i64, fields: &[Field]) -> StoreResult<()> {
        if fields.iter().any(|f| f.column.starts_with(self.prefix)) {
            return Err(StoreError::Query("datatype mismatch".into()));
        }
        self.inner.update_group(dump_id, fields)
    }

    fn feature_row(&self, dump_id: i64) -> StoreResult<Option<StoredRow>> {
        self.inner.feature_row(dump_id)
    }
}

#[test]
fn failed_write_leaves_scope_empty_and_run_continues() {
    let h = host_history();
    let store = RejectingWrites {
        inner: &h.store,
        prefix: "server_ip_",
    };
    let report = FeatureExtractor::new(&store, &AppConfig::default())
        .extract(100)
        .unwrap();

    assert!(matches!(
        report.outcome(Scope::ServerAddress),
        Some(ScopeOutcome::Failed(_))
    ));
    assert!(report.row.server_ip.is_none());
    assert_eq!(report.outcome(Scope::Host), Some(&ScopeOutcome::Computed));
    assert_eq!(
        report.outcome(Scope::SecondLevelDomain),
        Some(&ScopeOutcome::Computed)
    );
    assert_eq!(report.outcome(Scope::ExactUrl), Some(&ScopeOutcome::Computed));

    let row = h.store.feature_row(100).unwrap().unwrap();
    assert!(row["server_ip_total_downloads"].is_null());
    assert!(row["server_ip_malware_ratio"].is_null());
    assert_eq!(row["twold_total_downloads"], FieldValue::Integer(10));
    assert_eq!(row["url_total_downloads"], FieldValue::Integer(0));
}

#[test]
fn file_backed_store_persists_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.db");
    {
        let store = SqliteHistory::open(&path).unwrap();
        store.record_dump(&dump(1, HOST, at(0))).unwrap();
        store.record_dump(&dump(2, HOST, at(1))).unwrap();
        FeatureExtractor::new(&store, &AppConfig::default())
            .extract(2)
            .unwrap();
    }
    let reopened = SqliteHistory::open(&path).unwrap();
    let row = reopened.feature_row(2).unwrap().unwrap();
    assert_eq!(row["host_total_downloads"], FieldValue::Integer(1));
}

#[test]
fn unknown_columns_are_rejected() {
    let h = host_history();
    FeatureExtractor::new(&h.store, &AppConfig::default())
        .extract(100)
        .unwrap();
    let err = h
        .store
        .update_group(
            100,
            &[Field::new("host = 1; DROP TABLE dumps; --", 1i64)],
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Query(_)));
    assert!(h.store.dump(100).unwrap().is_some());
}
