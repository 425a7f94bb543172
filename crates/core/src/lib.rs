//! Core types and utilities for the token aggregator
//!
//! This crate provides shared types used across all components:
//! - Canonical asset records and the merged aggregate
//! - Query filters and pages
//! - Change events for the live feed
//! - Service configuration and error types

pub mod types;
pub mod aggregate;
pub mod filters;
pub mod events;
pub mod config;
pub mod errors;

pub use types::*;
pub use aggregate::*;
pub use filters::*;
pub use events::*;
pub use config::*;
pub use errors::*;
