//! Statistics over a window of prior dumps: download counts, label ratios,
//! unknown-hash counts and average label counts.

use super::ColumnKind;
use crate::records::WindowRecord;
use crate::storage::Field;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A dump counts as malware when more than this many trusted scanners flag it.
pub const TRUSTED_LABEL_THRESHOLD: i64 = 1;
/// A dump counts as suspicious when more than this many scanners flag it.
pub const SUSPICIOUS_LABEL_THRESHOLD: i64 = 1;

/// What the suspicious count is divided by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspiciousDenominator {
    Downloads,
    Hashes,
}

/// Statistic bundle shared by the host, domain, server, prefix and hash scopes.
/// `None` means "not computable", never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatBundle {
    pub total_downloads: i64,
    pub benign_downloads: i64,
    pub malware_downloads: i64,
    pub suspicious_downloads: i64,
    pub benign_ratio: Option<f64>,
    pub malware_ratio: Option<f64>,
    pub suspicious_ratio: Option<f64>,
    pub total_hashes: i64,
    pub unknown_hashes: i64,
    pub unknown_hash_ratio: Option<f64>,
    pub avg_av_labels: Option<f64>,
    pub avg_trusted_labels: Option<f64>,
}

impl StatBundle {
    pub const COLUMNS: &'static [(&'static str, ColumnKind)] = &[
        ("benign_downloads", ColumnKind::Integer),
        ("malware_downloads", ColumnKind::Integer),
        ("suspicious_downloads", ColumnKind::Integer),
        ("total_downloads", ColumnKind::Integer),
        ("malware_ratio", ColumnKind::Real),
        ("suspicious_ratio", ColumnKind::Real),
        ("benign_ratio", ColumnKind::Real),
        ("avg_av_labels", ColumnKind::Real),
        ("avg_trusted_labels", ColumnKind::Real),
        ("unknown_hashes", ColumnKind::Integer),
        ("total_hashes", ColumnKind::Integer),
        ("unknown_hash_ratio", ColumnKind::Real),
    ];

    pub fn from_records(records: &[WindowRecord], denominator: SuspiciousDenominator) -> Self {
        let mut downloads = HashSet::new();
        let mut benign = HashSet::new();
        let mut malware = HashSet::new();
        let mut suspicious = HashSet::new();

        for r in records {
            let id = r.dump_id();
            downloads.insert(id);
            if r.total_labels() == Some(0) {
                benign.insert(id);
            }
            if r.trusted_labels().map_or(false, |t| t > TRUSTED_LABEL_THRESHOLD) {
                malware.insert(id);
            }
            if r.total_labels().map_or(false, |t| t > SUSPICIOUS_LABEL_THRESHOLD) {
                suspicious.insert(id);
            }
        }

        let by_hash = group_by_hash(records);

        // Earliest sighting decides whether a hash was unknown; later rescans
        // are often triggered by this very pipeline.
        let unknown_hashes = by_hash
            .values()
            .filter(|group| {
                group
                    .iter()
                    .min_by_key(|r| r.dump_id())
                    .map_or(false, |r| r.is_unknown())
            })
            .count() as i64;

        let mut av_labels = Vec::new();
        let mut trusted_labels = Vec::new();
        for group in by_hash.values() {
            let latest = group
                .iter()
                .filter(|r| r.total_labels().is_some())
                .max_by_key(|r| r.dump_id());
            if let Some(r) = latest {
                av_labels.extend(r.total_labels());
                trusted_labels.extend(r.trusted_labels());
            }
        }

        let total_downloads = downloads.len() as i64;
        let total_hashes = by_hash.len() as i64;
        let suspicious_downloads = suspicious.len() as i64;
        let suspicious_base = match denominator {
            SuspiciousDenominator::Downloads => total_downloads,
            SuspiciousDenominator::Hashes => total_hashes,
        };

        StatBundle {
            total_downloads,
            benign_downloads: benign.len() as i64,
            malware_downloads: malware.len() as i64,
            suspicious_downloads,
            benign_ratio: ratio(benign.len() as i64, total_downloads),
            malware_ratio: ratio(malware.len() as i64, total_downloads),
            suspicious_ratio: ratio(suspicious_downloads, suspicious_base),
            total_hashes,
            unknown_hashes,
            unknown_hash_ratio: ratio(unknown_hashes, total_hashes),
            avg_av_labels: mean(&av_labels),
            avg_trusted_labels: mean(&trusted_labels),
        }
    }

    pub fn fields(&self, prefix: &str) -> Vec<Field> {
        let col = |name: &str| format!("{prefix}_{name}");
        vec![
            Field::new(col("benign_downloads"), self.benign_downloads),
            Field::new(col("malware_downloads"), self.malware_downloads),
            Field::new(col("suspicious_downloads"), self.suspicious_downloads),
            Field::new(col("total_downloads"), self.total_downloads),
            Field::new(col("malware_ratio"), self.malware_ratio),
            Field::new(col("suspicious_ratio"), self.suspicious_ratio),
            Field::new(col("benign_ratio"), self.benign_ratio),
            Field::new(col("avg_av_labels"), self.avg_av_labels),
            Field::new(col("avg_trusted_labels"), self.avg_trusted_labels),
            Field::new(col("unknown_hashes"), self.unknown_hashes),
            Field::new(col("total_hashes"), self.total_hashes),
            Field::new(col("unknown_hash_ratio"), self.unknown_hash_ratio),
        ]
    }
}

/// Restricted field set of the exact-URL and URL-shape scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlStats {
    pub malware_downloads: i64,
    pub total_downloads: i64,
    pub distinct_sha1s: i64,
}

impl UrlStats {
    pub const COLUMNS: &'static [(&'static str, ColumnKind)] = &[
        ("malware_downloads", ColumnKind::Integer),
        ("total_downloads", ColumnKind::Integer),
        ("distinct_sha1s", ColumnKind::Integer),
    ];

    pub fn from_records(records: &[WindowRecord]) -> Self {
        let downloads: HashSet<i64> = records.iter().map(|r| r.dump_id()).collect();
        let malware: HashSet<i64> = records
            .iter()
            .filter(|r| r.trusted_labels().map_or(false, |t| t > TRUSTED_LABEL_THRESHOLD))
            .map(|r| r.dump_id())
            .collect();
        let hashes: HashSet<&str> = records.iter().filter_map(|r| r.content_hash()).collect();
        UrlStats {
            malware_downloads: malware.len() as i64,
            total_downloads: downloads.len() as i64,
            distinct_sha1s: hashes.len() as i64,
        }
    }

    pub fn fields(&self, prefix: &str) -> Vec<Field> {
        vec![
            Field::new(format!("{prefix}_malware_downloads"), self.malware_downloads),
            Field::new(format!("{prefix}_total_downloads"), self.total_downloads),
            Field::new(format!("{prefix}_distinct_sha1s"), self.distinct_sha1s),
        ]
    }
}

/// Content-hash scope: the usual bundle plus lifetime and per-client spread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HashFeatures {
    pub stats: StatBundle,
    /// Seconds between first and last in-window sighting
    pub life_time: i64,
    pub num_dumps: i64,
    /// Distinct (client, day) pairs
    pub estimated_clients: i64,
    /// Mean dumps per (client, day) pair
    pub daily_dump_rate_per_client: Option<f64>,
}

impl HashFeatures {
    pub const EXTRA_COLUMNS: &'static [(&'static str, ColumnKind)] = &[
        ("hash_life_time", ColumnKind::Integer),
        ("num_dumps_with_same_hash", ColumnKind::Integer),
        ("estimated_clients_with_same_hash", ColumnKind::Integer),
        ("hash_daily_dump_rate_per_client", ColumnKind::Real),
    ];

    pub fn from_records(records: &[WindowRecord], denominator: SuspiciousDenominator) -> Self {
        let stats = StatBundle::from_records(records, denominator);

        let first = records.iter().map(|r| r.event.timestamp).min();
        let last = records.iter().map(|r| r.event.timestamp).max();
        let life_time = match (first, last) {
            (Some(a), Some(b)) => (b - a).num_seconds(),
            _ => 0,
        };

        let num_dumps = records.iter().map(|r| r.dump_id()).collect::<HashSet<_>>().len() as i64;

        let mut per_client_day: HashMap<(Option<&str>, chrono::NaiveDate), i64> = HashMap::new();
        for r in records {
            *per_client_day
                .entry((r.event.client.as_deref(), r.event.date()))
                .or_insert(0) += 1;
        }
        let counts: Vec<i64> = per_client_day.values().copied().collect();

        HashFeatures {
            stats,
            life_time,
            num_dumps,
            estimated_clients: counts.len() as i64,
            daily_dump_rate_per_client: mean(&counts),
        }
    }

    pub fn fields(&self, prefix: &str) -> Vec<Field> {
        let mut out = self.stats.fields(prefix);
        out.push(Field::new("hash_life_time", self.life_time));
        out.push(Field::new("num_dumps_with_same_hash", self.num_dumps));
        out.push(Field::new(
            "estimated_clients_with_same_hash",
            self.estimated_clients,
        ));
        out.push(Field::new(
            "hash_daily_dump_rate_per_client",
            self.daily_dump_rate_per_client,
        ));
        out
    }
}

fn group_by_hash(records: &[WindowRecord]) -> BTreeMap<&str, Vec<&WindowRecord>> {
    let mut out: BTreeMap<&str, Vec<&WindowRecord>> = BTreeMap::new();
    for r in records {
        if let Some(h) = r.content_hash() {
            out.entry(h).or_default().push(r);
        }
    }
    out
}

fn ratio(num: i64, den: i64) -> Option<f64> {
    if den == 0 {
        None
    } else {
        Some(num as f64 / den as f64)
    }
}

fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<i64>() as f64 / values.len() as f64)
    }
}
