//! Downloads served from the same server address.

use super::{Applicability, Scope, ScopeAggregator, ScopeFeatures, ScopeKey};
use crate::error::StoreResult;
use crate::features::{StatBundle, SuspiciousDenominator, WindowSpec};
use crate::records::DumpEvent;
use crate::storage::HistoryStore;

pub struct ServerAddressAggregator;

impl ScopeAggregator for ServerAddressAggregator {
    fn scope(&self) -> Scope {
        Scope::ServerAddress
    }

    fn key_for(&self, dump: &DumpEvent, _store: &dyn HistoryStore) -> StoreResult<Applicability> {
        Ok(Applicability::Applies(ScopeKey::Server(dump.server_address)))
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
            SuspiciousDenominator::Downloads,
        )))
    }
}
