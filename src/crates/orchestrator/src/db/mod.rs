//! Database module
//!
//! Connection pooling, row models, and per-table repositories over SQLite.
//! These tables are the only durable state; resume derives everything from
//! `pipeline_runs` + `agent_executions`.

pub mod connection;
pub mod models;
pub mod repositories;

pub use connection::{Database, DatabasePool};
