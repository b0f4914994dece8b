//! Pipeline server entry point
//!
//! Wires configuration, database, startup recovery, the engine, and the
//! HTTP/WebSocket edge together.

use orchestrator::api::{create_router, AppState};
use orchestrator::artifacts::ArtifactStore;
use orchestrator::config::ServerConfig;
use orchestrator::db::Database;
use orchestrator::events::EventBus;
use orchestrator::pipeline::PipelineEngine;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn provider_from_env() -> anyhow::Result<std::sync::Arc<dyn llm::ChatProvider>> {
    let provider_name =
        std::env::var("PIPELINE_PROVIDER").unwrap_or_else(|_| "anthropic".to_string());

    let (env_key, base_url, default_model) = match provider_name.as_str() {
        "anthropic" => (
            "ANTHROPIC_API_KEY",
            "https://api.anthropic.com",
            "claude-sonnet-4-5",
        ),
        "openai" => ("OPENAI_API_KEY", "https://api.openai.com/v1", "gpt-4o"),
        other => anyhow::bail!("unknown provider '{}'", other),
    };

    let model = std::env::var("PIPELINE_MODEL").unwrap_or_else(|_| default_model.to_string());
    let config = llm::ProviderConfig::from_env(env_key, base_url, model)?
        .with_timeout(Duration::from_secs(300));
    Ok(llm::provider_for(&provider_name, config)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,orchestrator=debug")),
        )
        .init();

    let config = ServerConfig::from_env();
    info!(port = config.port, db = %config.database_url, "starting pipeline server");

    let db = Database::connect(&config.database_url).await?;
    let bus = EventBus::default();
    let store = ArtifactStore::new(config.workspace_dir.clone());
    let provider = provider_from_env()?;

    let engine = PipelineEngine::new(
        db.clone(),
        bus.clone(),
        store.clone(),
        provider,
        config.clone(),
    );

    // Runs left behind by a previous process become resume-eligible
    let (runs, executions) = engine.recover_on_startup().await?;
    if runs > 0 {
        info!(runs, executions, "marked stale runs interrupted");
    }

    let state = AppState {
        db,
        store,
        bus,
        engine,
    };
    let router = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}
