//! Shared fixtures: an in-memory history with helpers to record dumps and scans.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use dump_features::{DumpEvent, LabelSummary, SqliteHistory};
use sha2::{Digest, Sha256};

pub const HOST: &str = "dl.example.com";
pub const SERVER: &str = "192.0.2.10";

/// Hex digest standing in for a content hash.
pub fn sha(seed: &str) -> String {
    let mut h = Sha256::new();
    h.update(seed.as_bytes());
    format!("{:x}", h.finalize())
}

/// 2024-05-20 00:00 UTC plus `hours`.
pub fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap() + Duration::hours(hours)
}

pub fn dump(id: i64, host: &str, ts: DateTime<Utc>) -> DumpEvent {
    DumpEvent::new(id, host, SERVER.parse().unwrap(), ts)
}

pub struct History {
    pub store: SqliteHistory,
}

impl History {
    pub fn new() -> Self {
        Self {
            store: SqliteHistory::open_in_memory().unwrap(),
        }
    }

    pub fn add(&self, ev: DumpEvent) -> &Self {
        self.store.record_dump(&ev).unwrap();
        self
    }

    /// Record a dump together with a scan report mapped to it.
    pub fn add_scanned(&self, ev: DumpEvent, trusted: Option<i64>, total: Option<i64>) -> &Self {
        let hash = ev.content_hash.clone().unwrap_or_else(|| sha(&ev.dump_id.to_string()));
        self.store.record_dump(&ev).unwrap();
        let scan = self
            .store
            .record_scan(&hash, LabelSummary::new(trusted, total), ev.timestamp)
            .unwrap();
        self.store.link_scan(ev.dump_id, scan).unwrap();
        self
    }

    pub fn add_prefix(&self, prefix: &str) -> &Self {
        self.store.add_prefix(&prefix.parse().unwrap()).unwrap();
        self
    }
}
