//! Downloads served under the exact same host name.

use super::{Applicability, Scope, ScopeAggregator, ScopeFeatures, ScopeKey};
use crate::error::StoreResult;
use crate::features::{StatBundle, SuspiciousDenominator, WindowSpec};
use crate::records::DumpEvent;
use crate::storage::HistoryStore;

pub struct HostAggregator {
    suspicious: SuspiciousDenominator,
}

impl HostAggregator {
    /// `suspicious_over_hashes` keeps the host scope's historical behaviour of
    /// dividing suspicious downloads by distinct hashes.
    pub fn new(suspicious_over_hashes: bool) -> Self {
        let suspicious = if suspicious_over_hashes {
            SuspiciousDenominator::Hashes
        } else {
            SuspiciousDenominator::Downloads
        };
        Self { suspicious }
    }
}

impl ScopeAggregator for HostAggregator {
    fn scope(&self) -> Scope {
        Scope::Host
    }

    fn key_for(&self, dump: &DumpEvent, _store: &dyn HistoryStore) -> StoreResult<Applicability> {
        if dump.host.is_empty() {
            return Ok(Applicability::NotApplicable("dump has no host".into()));
        }
        Ok(Applicability::Applies(ScopeKey::Host(dump.host.clone())))
    }

    fn aggregate(
        &self,
        key: &ScopeKey,
        window: &WindowSpec,
        store: &dyn HistoryStore,
    ) -> StoreResult<ScopeFeatures> {
        let records = store.scan_window(key, window)?;
        Ok(ScopeFeatures::Stats(StatBundle::from_records(
            &records,
            self.suspicious,
        )))
    }
}
