//! Runs the executor over several entity types in order
//!
//! Every type is independent: a failing type is reported and the run
//! moves on to the next one.

use crate::sync::logic::execution::ApplyExecutor;
use crate::sync::logic::report_builder::{EntityTypeSummary, ReportSink};
use crate::sync::store::EntityStore;
use crate::sync::types::{EntityCollection, EntityKind};

/// Desired state of one entity type
#[derive(Debug, Clone)]
pub struct DesiredType {
    pub kind: EntityKind,
    pub entities: EntityCollection,
}

impl DesiredType {
    pub fn new(kind: EntityKind, entities: EntityCollection) -> Self {
        Self { kind, entities }
    }

    /// Empty desired state (used by wipe)
    pub fn empty(kind: EntityKind) -> Self {
        Self::new(kind, EntityCollection::new())
    }
}

/// Apply each type in the given order. Returns the number of failed types.
pub async fn apply_types<S: EntityStore + ?Sized>(
    executor: &ApplyExecutor<'_, S>,
    types: &[DesiredType],
    sink: &mut dyn ReportSink,
) -> usize {
    let mut failed = 0;

    for desired in types {
        let spec = desired.kind.spec();
        let label = desired.kind.label();

        let summary = match executor.apply(&spec, &desired.entities).await {
            Ok(outcome) => EntityTypeSummary::from_outcome(label, &outcome),
            Err(e) => {
                log::error!("{}: {}", spec.name, e);
                EntityTypeSummary::failed(&spec.name, label, &e)
            }
        };

        if !summary.is_success() {
            failed += 1;
        }
        sink.record(&summary);
    }

    failed
}

/// Plan each type without mutating. Returns the number of types that could not be planned.
pub async fn plan_types<S: EntityStore + ?Sized>(
    executor: &ApplyExecutor<'_, S>,
    types: &[DesiredType],
    sink: &mut dyn ReportSink,
) -> usize {
    let mut failed = 0;

    for desired in types {
        let spec = desired.kind.spec();
        let label = desired.kind.label();

        let summary = match executor.plan(&spec, &desired.entities).await {
            Ok(plan) => {
                for (id, diff) in &plan.changes {
                    log::debug!("{} {}: {}", spec.name, id, diff.summary());
                }
                EntityTypeSummary::from_plan(label, &plan)
            }
            Err(e) => {
                log::error!("{}: {}", spec.name, e);
                failed += 1;
                EntityTypeSummary::failed(&spec.name, label, &e)
            }
        };

        sink.record(&summary);
    }

    failed
}
