//! Directus REST API Module
//!
//! This module provides:
//! - An authenticated HTTP client for a Directus instance
//! - Mutation operations (create, update, delete, singleton patch, schema apply)
//! - Client configuration and API errors

pub mod client;
pub mod config;
pub mod error;
pub mod operations;

pub use client::{DirectusClient, SETTINGS_ROUTE, items_route};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_PAGE_SIZE};
pub use error::ApiError;
pub use operations::Operation;
