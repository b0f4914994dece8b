//! HTTP and WebSocket API
//!
//! Thin axum edge over the engine, repositories, and artifact store.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod ws;

pub use routes::{create_router, AppState};
