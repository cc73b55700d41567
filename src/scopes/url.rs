//! Prior downloads from the exact same URL. Only counts are kept.

use super::{Applicability, Scope, ScopeAggregator, ScopeFeatures, ScopeKey};
use crate::error::StoreResult;
use crate::features::{UrlStats, WindowSpec};
use crate::records::DumpEvent;
use crate::storage::HistoryStore;

pub struct ExactUrlAggregator;

impl ScopeAggregator for ExactUrlAggregator {
    fn scope(&self) -> Scope {
        Scope::ExactUrl
    }

    fn key_for(&self, dump: &DumpEvent, _store: &dyn HistoryStore) -> StoreResult<Applicability> {
        Ok(match &dump.url {
            Some(u) => Applicability::Applies(ScopeKey::Url(u.clone())),
            None => Applicability::NotApplicable("dump has no url".into()),
        })
    }

    fn aggregate(
        &self,
        key: &ScopeKey,
        window: &WindowSpec,
        store: &dyn HistoryStore,
    ) -> StoreResult<ScopeFeatures> {
        let records = store.scan_window(key, window)?;
        Ok(ScopeFeatures::Url(UrlStats::from_records(&records)))
    }
}
