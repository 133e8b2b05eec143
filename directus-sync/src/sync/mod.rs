//! Reconciliation of Directus configuration
//!
//! Local snapshots describe the desired state; the executors here compute
//! and apply the create/update/delete operations that bring a remote
//! instance in line with them.

pub mod confirm;
pub mod error;
pub mod logic;
pub mod runner;
pub mod schema_sync;
pub mod settings;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod memory;

pub use confirm::{Confirm, FixedAnswer, PromptConfirm};
pub use error::{ApplyError, OperationFailure, OperationKind};
pub use logic::{ApplyExecutor, ApplyOptions, ApplyOutcome, ApplyPlan};
pub use runner::{DesiredType, apply_types, plan_types};
pub use schema_sync::{SchemaOptions, SchemaOutcome, sync_schema};
pub use settings::{SettingsOutcome, apply_settings};
pub use store::{EntityStore, SchemaStore, SettingsStore};
pub use types::{
    Classification, ChangeStatus, Entity, EntityCollection, EntityKind, EntitySpec, SyncGroup,
};
