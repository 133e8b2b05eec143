//! Subcommand handlers

pub mod apply;
pub mod data;
pub mod diff;
pub mod export;
pub mod seed;
pub mod wipe;

use std::collections::BTreeSet;

pub use apply::ApplyArgs;
pub use data::DataArgs;
pub use diff::DiffArgs;
pub use export::ExportArgs;
pub use seed::SeedArgs;
pub use wipe::WipeArgs;

use crate::sync::logic::report_builder::{ConsoleSink, Fanout, ReportSink, SyncReport};
use crate::sync::types::{EntityKind, SyncGroup};

/// Console and run report, fed together
fn sinks<'a>(console: &'a mut ConsoleSink, report: &'a mut SyncReport) -> Fanout<'a> {
    Fanout::new(vec![console as &mut dyn ReportSink, report])
}

/// Groups given with `--only`; empty means everything
fn selected_groups(only: &[SyncGroup]) -> BTreeSet<SyncGroup> {
    only.iter().copied().collect()
}

fn is_selected(groups: &BTreeSet<SyncGroup>, group: SyncGroup) -> bool {
    groups.is_empty() || groups.contains(&group)
}

fn selected_kinds(groups: &BTreeSet<SyncGroup>) -> Vec<EntityKind> {
    EntityKind::APPLY_ORDER
        .into_iter()
        .filter(|kind| is_selected(groups, kind.group()))
        .collect()
}
