//! Project file endpoints

use crate::api::error::ApiResult;
use crate::api::routes::AppState;
use crate::artifacts::FileEntry;
use crate::events::PipelineEvent;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct WriteFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewQuery {
    pub chat_id: String,
}

/// GET /api/files/tree/:projectId
pub async fn tree(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<FileEntry>>> {
    Ok(Json(state.store.list_tree(&project_id)))
}

/// GET /api/files/read/:projectId/*path
pub async fn read(
    State(state): State<AppState>,
    Path((project_id, path)): Path<(String, String)>,
) -> ApiResult<String> {
    Ok(state.store.read(&project_id, &path)?)
}

/// POST /api/files/write/:projectId
pub async fn write(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<WriteFile>,
) -> ApiResult<Json<Value>> {
    state.store.write(&project_id, &body.path, &body.content)?;
    Ok(Json(json!({ "written": body.path })))
}

/// GET /api/files/zip/:projectId
pub async fn zip(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.store.zip(&project_id)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.zip\"", project_id),
            ),
        ],
        bytes,
    ))
}

/// POST /api/files/preview/:projectId?chatId= — notify the chat's
/// subscribers a preview refresh is warranted
pub async fn preview(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult<Json<Value>> {
    state.bus.emit(PipelineEvent::PreviewReady {
        chat_id: query.chat_id,
        project_id: project_id.clone(),
    });
    Ok(Json(json!({ "previewRequested": project_id })))
}
