//! Snapshot action for version marker nodes
//!
//! Captures the project tree as a labeled manifest row and notifies clients
//! with the `__snapshot__` path sentinel.

use crate::db::repositories::SnapshotRepository;
use crate::events::PipelineEvent;
use crate::pipeline::StepContext;
use crate::Result;
use flow_core::resolver::ActionStep;
use std::sync::Arc;
use tracing::info;

/// Capture a labeled snapshot of the project tree
pub async fn run(ctx: &Arc<StepContext>, step: &ActionStep) -> Result<String> {
    let label = step.label.as_deref().unwrap_or(&step.instance_id);
    let manifest = ctx.store.manifest(&ctx.project_id)?;
    let file_count = manifest.as_object().map(|m| m.len()).unwrap_or(0);

    SnapshotRepository::create(
        ctx.db.pool(),
        &ctx.project_id,
        &ctx.chat_id,
        label,
        &manifest.to_string(),
    )
    .await?;

    ctx.bus.emit(PipelineEvent::FilesChanged {
        chat_id: ctx.chat_id.clone(),
        project_id: ctx.project_id.clone(),
        paths: vec!["__snapshot__".to_string()],
    });

    info!(chat = %ctx.chat_id, label, files = file_count, "snapshot saved");
    Ok(format!("snapshot '{}' ({} files)", label, file_count))
}
