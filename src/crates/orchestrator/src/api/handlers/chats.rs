//! Chat endpoints

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;
use crate::db::models::Chat;
use crate::db::repositories::ChatRepository;
use crate::OrchestratorError;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatsQuery {
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChat {
    pub project_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameChat {
    pub title: String,
}

/// GET /api/chats?projectId=
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ChatsQuery>,
) -> ApiResult<Json<Vec<Chat>>> {
    Ok(Json(
        ChatRepository::list_by_project(state.db.pool(), &query.project_id).await?,
    ))
}

/// POST /api/chats
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateChat>,
) -> ApiResult<Json<Chat>> {
    let chat = ChatRepository::create(
        state.db.pool(),
        Uuid::new_v4().to_string(),
        body.project_id,
        body.title.unwrap_or_else(|| "New chat".to_string()),
    )
    .await?;
    Ok(Json(chat))
}

/// PATCH /api/chats/:id
pub async fn rename(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameChat>,
) -> ApiResult<Json<Chat>> {
    ChatRepository::rename(state.db.pool(), &id, &body.title).await?;
    ChatRepository::get_by_id(state.db.pool(), &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError(OrchestratorError::NotFound(format!("chat {}", id))))
}

/// DELETE /api/chats/:id
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    ChatRepository::delete_cascade(state.db.pool(), &id).await?;
    Ok(Json(json!({ "deleted": id })))
}
