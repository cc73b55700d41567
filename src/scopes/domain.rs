//! Downloads from any host under the same registrable domain.

use super::{Applicability, Scope, ScopeAggregator, ScopeFeatures, ScopeKey};
use crate::error::StoreResult;
use crate::features::domain::{host_address, registrable_domain, reverse_labels};
use crate::features::{StatBundle, SuspiciousDenominator, WindowSpec};
use crate::records::DumpEvent;
use crate::storage::HistoryStore;

pub struct DomainAggregator;

impl ScopeAggregator for DomainAggregator {
    fn scope(&self) -> Scope {
        Scope::SecondLevelDomain
    }

    fn key_for(&self, dump: &DumpEvent, _store: &dyn HistoryStore) -> StoreResult<Applicability> {
        if dump.host.is_empty() {
            return Ok(Applicability::NotApplicable("dump has no host".into()));
        }
        // A literal address has no domain; group by the address itself.
        if let Some(addr) = host_address(&dump.host) {
            return Ok(Applicability::Applies(ScopeKey::Address(addr)));
        }
        Ok(match registrable_domain(&dump.host) {
            Ok(domain) => Applicability::Applies(ScopeKey::Domain(reverse_labels(&domain))),
            Err(e) => Applicability::NotApplicable(format!("cannot extract 2LD: {e}")),
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
