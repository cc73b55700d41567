//! Extraction pipeline: dump → fresh row → request fields → every scope → persisted row.
//!
//! Scopes are independent and best-effort. A scope that does not apply is
//! skipped, a scope whose query or write fails is logged and left empty, and
//! only an unreachable store aborts the run.

use super::{FeatureRow, RequestFeatures, RowIdentity, WindowPolicy, WindowSpec};
use crate::config::AppConfig;
use crate::error::{ExtractError, StoreResult};
use crate::records::DumpEvent;
use crate::scopes::{
    default_aggregators, Applicability, Scope, ScopeAggregator, ScopeOutcome,
};
use crate::storage::{FeatureSink, HistoryStore};
use tracing::{error, info, warn};

/// Everything one extraction run produced.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub row: FeatureRow,
    pub outcomes: Vec<(Scope, ScopeOutcome)>,
}

impl ExtractionReport {
    pub fn outcome(&self, scope: Scope) -> Option<&ScopeOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == scope)
            .map(|(_, o)| o)
    }

    pub fn computed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_computed()).count()
    }
}

pub struct FeatureExtractor<'a, S> {
    store: &'a S,
    policy: WindowPolicy,
    aggregators: Vec<Box<dyn ScopeAggregator>>,
}

impl<'a, S: HistoryStore + FeatureSink> FeatureExtractor<'a, S> {
    pub fn new(store: &'a S, config: &AppConfig) -> Self {
        Self {
            store,
            policy: WindowPolicy::new(config.window),
            aggregators: default_aggregators(&config.features),
        }
    }

    pub fn with_aggregators(
        store: &'a S,
        policy: WindowPolicy,
        aggregators: Vec<Box<dyn ScopeAggregator>>,
    ) -> Self {
        Self {
            store,
            policy,
            aggregators,
        }
    }

    /// Recompute and persist the feature row of `dump_id`, replacing any
    /// previous row for it.
    pub fn extract(&self, dump_id: i64) -> Result<ExtractionReport, ExtractError> {
        info!(dump_id, "extracting features");
        let dump = self
            .store
            .dump(dump_id)?
            .ok_or(ExtractError::DumpNotFound(dump_id))?;

        let identity = RowIdentity::from(&dump);
        self.store.reset_row(&identity)?;
        let mut row = FeatureRow::new(identity);
        let window = self.policy.window_for(&dump);

        let request = RequestFeatures::from_dump(&dump);
        match self.store.update_group(dump_id, &request.fields()) {
            Ok(()) => row.request = Some(request),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!(dump_id, error = %e, "could not store request features"),
        }

        let mut outcomes = Vec::with_capacity(self.aggregators.len());
        for agg in &self.aggregators {
            let scope = agg.scope();
            let outcome = match self.run_scope(agg.as_ref(), &dump, &window, &mut row) {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => {
                    error!(dump_id, %scope, error = %e, "history store unavailable");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(dump_id, %scope, error = %e, "could not compute scope features");
                    ScopeOutcome::Failed(e.to_string())
                }
            };
            outcomes.push((scope, outcome));
        }

        let report = ExtractionReport { row, outcomes };
        info!(
            dump_id,
            computed = report.computed(),
            scopes = report.outcomes.len(),
            "done inserting features"
        );
        Ok(report)
    }

    fn run_scope(
        &self,
        agg: &dyn ScopeAggregator,
        dump: &DumpEvent,
        window: &WindowSpec,
        row: &mut FeatureRow,
    ) -> StoreResult<ScopeOutcome> {
        let scope = agg.scope();
        let store: &dyn HistoryStore = self.store;

        let key = match agg.key_for(dump, store)? {
            Applicability::Applies(key) => key,
            Applicability::NotApplicable(reason) => {
                info!(dump_id = dump.dump_id, %scope, %reason, "scope skipped");
                return Ok(ScopeOutcome::Skipped(reason));
            }
        };

        let features = agg.aggregate(&key, &agg.window(window), store)?;
        self.store
            .update_group(dump.dump_id, &features.fields(scope.column_prefix()))?;
        info!(dump_id = dump.dump_id, %scope, %key, "scope features stored");
        row.apply(scope, features);
        Ok(ScopeOutcome::Computed)
    }
}
