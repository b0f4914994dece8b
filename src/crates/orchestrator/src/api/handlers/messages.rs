//! Message and agent-run endpoints

use crate::api::error::ApiResult;
use crate::api::routes::AppState;
use crate::db::models::Message;
use crate::db::repositories::MessageRepository;
use crate::pipeline::engine::StatusReport;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub chat_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAgents {
    pub chat_id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub resume: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopAgents {
    pub chat_id: String,
}

/// GET /api/messages?chatId=
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    Ok(Json(
        MessageRepository::list_by_chat(state.db.pool(), &query.chat_id).await?,
    ))
}

/// POST /api/messages/send — records the user message and kicks off
/// orchestration (the engine writes the message row)
pub async fn send(
    State(state): State<AppState>,
    Json(body): Json<SendMessage>,
) -> ApiResult<Json<Value>> {
    state.engine.start(&body.chat_id, &body.content).await?;
    Ok(Json(json!({ "started": true })))
}

/// POST /api/agents/run — primary pipeline entry; in resume mode the
/// message is ignored and the most recent interrupted run is continued
pub async fn run(
    State(state): State<AppState>,
    Json(body): Json<RunAgents>,
) -> ApiResult<Json<Value>> {
    if body.resume {
        state.engine.resume(&body.chat_id).await?;
    } else {
        let message = body.message.unwrap_or_default();
        state.engine.start(&body.chat_id, &message).await?;
    }
    Ok(Json(json!({ "started": true, "resume": body.resume })))
}

/// POST /api/agents/stop
pub async fn stop(
    State(state): State<AppState>,
    Json(body): Json<StopAgents>,
) -> ApiResult<Json<Value>> {
    let stopped = state.engine.stop(&body.chat_id).await?;
    Ok(Json(json!({ "stopped": stopped })))
}

/// GET /api/agents/status?chatId=
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<StatusReport>> {
    Ok(Json(state.engine.status(&query.chat_id).await?))
}
