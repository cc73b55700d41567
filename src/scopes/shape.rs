//! Prior downloads whose URL has the same query layout as the dump's.

use super::{Applicability, Scope, ScopeAggregator, ScopeFeatures, ScopeKey};
use crate::error::StoreResult;
use crate::features::{ShapeSynthesizer, UrlStats, WindowSpec};
use crate::records::DumpEvent;
use crate::storage::HistoryStore;

pub struct UrlShapeAggregator {
    synthesizer: ShapeSynthesizer,
}

impl UrlShapeAggregator {
    pub fn new(min_shape_len: usize) -> Self {
        Self {
            synthesizer: ShapeSynthesizer::new(min_shape_len),
        }
    }
}

impl ScopeAggregator for UrlShapeAggregator {
    fn scope(&self) -> Scope {
        Scope::UrlShape
    }

    fn key_for(&self, dump: &DumpEvent, _store: &dyn HistoryStore) -> StoreResult<Applicability> {
        let Some(url) = dump.url.as_deref() else {
            return Ok(Applicability::NotApplicable("dump has no url".into()));
        };
        Ok(match self.synthesizer.for_url(url) {
            Ok(shape) => Applicability::Applies(ScopeKey::Shape(shape)),
            Err(rejection) => Applicability::NotApplicable(rejection.to_string()),
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
