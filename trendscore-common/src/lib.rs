//! # trendscore common library
//!
//! Shared code for the trendscore crates:
//! - Database schema, records and queries
//! - Configuration loading (TOML with graceful degradation)
//! - Logging initialisation
//! - Calendar-day helpers and the region table

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod regions;
pub mod time;

pub use error::{Error, Result};
