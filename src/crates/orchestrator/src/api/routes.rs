//! API route definitions
//!
//! Defines all API routes and their associated handler functions.

use crate::api::{handlers, ws};
use crate::artifacts::ArtifactStore;
use crate::db::Database;
use crate::events::EventBus;
use crate::pipeline::PipelineEngine;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub store: ArtifactStore,
    pub bus: EventBus,
    pub engine: Arc<PipelineEngine>,
}

/// Build the complete API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Projects
        .route(
            "/api/projects",
            get(handlers::projects::list).post(handlers::projects::create),
        )
        .route(
            "/api/projects/:id",
            axum::routing::patch(handlers::projects::rename).delete(handlers::projects::delete),
        )
        // Chats
        .route(
            "/api/chats",
            get(handlers::chats::list).post(handlers::chats::create),
        )
        .route(
            "/api/chats/:id",
            axum::routing::patch(handlers::chats::rename).delete(handlers::chats::delete),
        )
        // Messages and agent control
        .route("/api/messages", get(handlers::messages::list))
        .route("/api/messages/send", post(handlers::messages::send))
        .route("/api/agents/run", post(handlers::messages::run))
        .route("/api/agents/stop", post(handlers::messages::stop))
        .route("/api/agents/status", get(handlers::messages::status))
        // Files
        .route("/api/files/tree/:project_id", get(handlers::files::tree))
        .route(
            "/api/files/read/:project_id/*path",
            get(handlers::files::read),
        )
        .route(
            "/api/files/write/:project_id",
            post(handlers::files::write),
        )
        .route("/api/files/zip/:project_id", get(handlers::files::zip))
        .route(
            "/api/files/preview/:project_id",
            post(handlers::files::preview),
        )
        // Flow settings
        .route(
            "/api/settings/flow/templates",
            get(handlers::flow_settings::list_templates)
                .post(handlers::flow_settings::create_template),
        )
        .route(
            "/api/settings/flow/templates/:id",
            get(handlers::flow_settings::get_template)
                .put(handlers::flow_settings::put_template)
                .delete(handlers::flow_settings::delete_template),
        )
        .route(
            "/api/settings/flow/templates/:id/reset",
            post(handlers::flow_settings::reset_template),
        )
        .route(
            "/api/settings/flow/active",
            get(handlers::flow_settings::get_active).put(handlers::flow_settings::put_active),
        )
        .route(
            "/api/settings/flow/validate",
            post(handlers::flow_settings::validate),
        )
        .route(
            "/api/settings/flow/defaults",
            post(handlers::flow_settings::seed_defaults),
        )
        .route(
            "/api/settings/checkpoints/resolve",
            post(handlers::flow_settings::resolve_checkpoint),
        )
        // Realtime
        .route("/ws", get(ws::ws_handler))
        // Health
        .route("/health", get(|| async { "ok" }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
