//! Downloads served from anywhere inside the routing prefix that contains
//! the dump's server address.

use super::{Applicability, Scope, ScopeAggregator, ScopeFeatures, ScopeKey};
use crate::error::StoreResult;
use crate::features::{StatBundle, SuspiciousDenominator, WindowSpec};
use crate::records::DumpEvent;
use crate::storage::HistoryStore;

pub struct NetworkPrefixAggregator;

impl ScopeAggregator for NetworkPrefixAggregator {
    fn scope(&self) -> Scope {
        Scope::NetworkPrefix
    }

    fn key_for(&self, dump: &DumpEvent, store: &dyn HistoryStore) -> StoreResult<Applicability> {
        Ok(match store.containing_prefix(dump.server_address)? {
            Some(prefix) => Applicability::Applies(ScopeKey::Prefix(prefix)),
            None => Applicability::NotApplicable(format!(
                "no routing prefix contains {}",
                dump.server_address
            )),
        })
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
