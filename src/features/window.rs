//! Sliding window over prior dumps.

use crate::config::WindowConfig;
use crate::records::DumpEvent;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Eligible history for one target dump:
/// `lower_bound < dump_id < target`, `timestamp > not_before` (when set),
/// and not corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub dump_id: i64,
    pub max_past_dumps: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
}

impl WindowSpec {
    /// Exclusive lower `dump_id` bound.
    pub fn lower_bound(&self) -> i64 {
        self.dump_id - self.max_past_dumps
    }

    /// Same dump bounds with the date cutoff dropped.
    pub fn count_only(&self) -> Self {
        Self {
            not_before: None,
            ..*self
        }
    }

    pub fn contains(&self, event: &DumpEvent) -> bool {
        !event.corrupt
            && event.dump_id < self.dump_id
            && event.dump_id > self.lower_bound()
            && self.not_before.map_or(true, |cutoff| event.timestamp > cutoff)
    }
}

pub struct WindowPolicy {
    config: WindowConfig,
}

impl WindowPolicy {
    pub fn new(config: WindowConfig) -> Self {
        Self { config }
    }

    /// Window for `target`. The date cutoff counts back from midnight of the
    /// target's download day.
    pub fn window_for(&self, target: &DumpEvent) -> WindowSpec {
        let midnight = Utc.from_utc_datetime(&target.date().and_time(NaiveTime::MIN));
        WindowSpec {
            dump_id: target.dump_id,
            max_past_dumps: self.config.max_past_dumps,
            not_before: Some(midnight - Duration::days(self.config.max_past_days)),
        }
    }
}
