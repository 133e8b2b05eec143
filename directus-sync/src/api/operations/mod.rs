//! Directus mutation operations
//!
//! Every write the client performs is described by an `Operation` first,
//! which keeps method, path and payload in one place.

pub mod operation;

pub use operation::{Operation, SCHEMA_APPLY_ROUTE};
