//! Business logic for reconciling Directus configuration
//!
//! This module contains:
//! - Dependency graph building and layered topological sorting
//! - Set reconciliation of desired against existing entities
//! - The apply executor and its plans/outcomes
//! - Schema diff interpretation and sanitizing
//! - Row ordering for data seeding
//! - Report generation

pub mod dependency_graph;
pub mod execution;
pub mod reconcile;
pub mod report_builder;
pub mod schema_diff;
pub mod seed_graph;

pub use dependency_graph::*;
pub use execution::*;
pub use reconcile::*;
pub use report_builder::*;
pub use schema_diff::*;
pub use seed_graph::*;
