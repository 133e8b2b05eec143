//! Keep a Directus instance's configuration in git
//!
//! Export settings, schema, flows, dashboards, webhooks, presets and roles
//! to a directory of YAML files, and apply such a directory back to an
//! instance with deterministic create, update and delete ordering.

pub mod api;
pub mod cli;
pub mod config;
pub mod snapshot;
pub mod sync;
