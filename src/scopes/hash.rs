//! Prior downloads of the same content. The window is bounded by dump count
//! only; hash lifetime is meaningful across any number of days.

use super::{Applicability, Scope, ScopeAggregator, ScopeFeatures, ScopeKey};
use crate::error::StoreResult;
use crate::features::{HashFeatures, SuspiciousDenominator, WindowSpec};
use crate::records::DumpEvent;
use crate::storage::HistoryStore;

pub struct ContentHashAggregator;

impl ScopeAggregator for ContentHashAggregator {
    fn scope(&self) -> Scope {
        Scope::ContentHash
    }

    fn key_for(&self, dump: &DumpEvent, _store: &dyn HistoryStore) -> StoreResult<Applicability> {
        Ok(match &dump.content_hash {
            Some(h) if !h.is_empty() => Applicability::Applies(ScopeKey::Hash(h.clone())),
            _ => Applicability::NotApplicable("dump has no content hash".into()),
        })
    }

    fn window(&self, window: &WindowSpec) -> WindowSpec {
        window.count_only()
    }

    fn aggregate(
        &self,
        key: &ScopeKey,
        window: &WindowSpec,
        store: &dyn HistoryStore,
    ) -> StoreResult<ScopeFeatures> {
        let records = store.scan_window(key, window)?;
        Ok(ScopeFeatures::Hash(HashFeatures::from_records(
            &records,
            SuspiciousDenominator::Downloads,
        )))
    }
}
