//! Database schema, records and queries

pub mod init;
pub mod migrations;
pub mod models;

pub use init::{create_schema, init_database};
pub use models::{
    ComputedScore, FetchLogEntry, InputSeries, Model, ModelKind, ModelSettings, RawPoint,
};
