//! Project endpoints

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;
use crate::db::models::Project;
use crate::db::repositories::ProjectRepository;
use crate::OrchestratorError;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameProject {
    pub name: String,
}

/// GET /api/projects
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(ProjectRepository::list(state.db.pool()).await?))
}

/// POST /api/projects
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateProject>,
) -> ApiResult<Json<Project>> {
    let id = Uuid::new_v4().to_string();
    let dir = state.store.ensure_project(&id)?;
    let project = ProjectRepository::create(
        state.db.pool(),
        id,
        body.name,
        dir.to_string_lossy().to_string(),
    )
    .await?;
    Ok(Json(project))
}

/// PATCH /api/projects/:id
pub async fn rename(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameProject>,
) -> ApiResult<Json<Project>> {
    ProjectRepository::rename(state.db.pool(), &id, &body.name).await?;
    ProjectRepository::get_by_id(state.db.pool(), &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError(OrchestratorError::NotFound(format!("project {}", id))))
}

/// DELETE /api/projects/:id
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    ProjectRepository::delete_cascade(state.db.pool(), &id).await?;
    state.store.remove_project(&id)?;
    Ok(Json(json!({ "deleted": id })))
}
