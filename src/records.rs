//! History records as read from the store: dumps, label summaries, and the
//! joined per-dump view used by the scope aggregators.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// One recorded download of a binary. Immutable once stored; `dump_id`
/// ordering approximates chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpEvent {
    pub dump_id: i64,
    pub host: String,
    pub server_address: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Address of the downloading client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub corrupt: bool,
}

impl DumpEvent {
    pub fn new(
        dump_id: i64,
        host: impl Into<String>,
        server_address: IpAddr,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            dump_id,
            host: host.into(),
            server_address,
            url: None,
            content_hash: None,
            client: None,
            referer: None,
            timestamp,
            corrupt: false,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn corrupted(mut self) -> Self {
        self.corrupt = true;
        self
    }

    /// Calendar day (UTC) of the download.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Reputation-scan result for a content hash. Either count may be null when
/// the scan has been requested but no report exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSummary {
    pub trusted_label_count: Option<i64>,
    pub total_label_count: Option<i64>,
}

impl LabelSummary {
    pub fn new(trusted: Option<i64>, total: Option<i64>) -> Self {
        Self {
            trusted_label_count: trusted,
            total_label_count: total,
        }
    }

    /// No scanner has reported on the hash yet.
    pub fn is_unknown(&self) -> bool {
        self.total_label_count.is_none()
    }
}

/// An in-window dump joined with the latest label summary mapped to it.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRecord {
    pub event: DumpEvent,
    pub labels: Option<LabelSummary>,
}

impl WindowRecord {
    pub fn dump_id(&self) -> i64 {
        self.event.dump_id
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.event.content_hash.as_deref()
    }

    pub fn total_labels(&self) -> Option<i64> {
        self.labels.and_then(|l| l.total_label_count)
    }

    pub fn trusted_labels(&self) -> Option<i64> {
        self.labels.and_then(|l| l.trusted_label_count)
    }

    /// Missing summary or a summary without a total count.
    pub fn is_unknown(&self) -> bool {
        self.labels.map_or(true, |l| l.is_unknown())
    }
}
