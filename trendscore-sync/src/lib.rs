//! trendscore-sync library interface
//!
//! The reconciliation core: gap detection, batching, rate-limited fetching,
//! moving averages, scoring and commit. The `trendscore-sync` binary is a
//! thin CLI over `ReconciliationEngine::run`.

pub mod aggregator;
pub mod batcher;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod gaps;
pub mod notifier;
pub mod scoring;
pub mod sources;
pub mod store;

pub use crate::engine::{ReconciliationEngine, RunPhase, RunReport};
pub use crate::error::{SyncError, SyncResult};
