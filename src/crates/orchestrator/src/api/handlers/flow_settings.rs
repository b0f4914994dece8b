//! Flow template settings and checkpoint resolution endpoints

use crate::agents::known_agent_names;
use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;
use crate::pipeline::template_store;
use crate::OrchestratorError;
use axum::extract::{Path, State};
use axum::Json;
use flow_core::{validate_template, FlowTemplate, Intent, ValidationIssue};
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActive {
    pub intent: String,
    pub template_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveCheckpoint {
    pub chat_id: String,
    pub checkpoint_id: String,
    pub choice: String,
}

fn validate_for_save(template: &FlowTemplate) -> Result<Vec<ValidationIssue>, ApiError> {
    let issues = validate_template(template, &known_agent_names());
    if issues.iter().any(|issue| issue.is_error()) {
        let summary = issues
            .iter()
            .filter(|issue| issue.is_error())
            .map(|issue| issue.message.clone())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ApiError(OrchestratorError::TemplateInvalid(summary)));
    }
    Ok(issues)
}

/// GET /api/settings/flow/templates
pub async fn list_templates(State(state): State<AppState>) -> ApiResult<Json<Vec<FlowTemplate>>> {
    Ok(Json(template_store::list_templates(state.db.pool()).await?))
}

/// GET /api/settings/flow/templates/:id
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<FlowTemplate>> {
    template_store::load_template(state.db.pool(), &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError(OrchestratorError::NotFound(format!("template {}", id))))
}

/// PUT /api/settings/flow/templates/:id — validation errors block saving
pub async fn put_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut template): Json<FlowTemplate>,
) -> ApiResult<Json<Value>> {
    template.id = id;
    let issues = validate_for_save(&template)?;
    template_store::save_template(state.db.pool(), &template).await?;
    Ok(Json(json!({ "saved": template.id, "warnings": issues })))
}

/// POST /api/settings/flow/templates — create with a fresh id
pub async fn create_template(
    State(state): State<AppState>,
    Json(mut template): Json<FlowTemplate>,
) -> ApiResult<Json<FlowTemplate>> {
    if template.id.is_empty() {
        template.id = uuid::Uuid::new_v4().to_string();
    }
    template.is_default = false;
    validate_for_save(&template)?;
    template_store::save_template(state.db.pool(), &template).await?;
    Ok(Json(template))
}

/// DELETE /api/settings/flow/templates/:id
pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    template_store::delete_template(state.db.pool(), &id).await?;
    Ok(Json(json!({ "deleted": id })))
}

/// POST /api/settings/flow/validate — dry-run validation
pub async fn validate(
    State(_state): State<AppState>,
    Json(template): Json<FlowTemplate>,
) -> ApiResult<Json<Vec<ValidationIssue>>> {
    Ok(Json(validate_template(&template, &known_agent_names())))
}

/// GET /api/settings/flow/active
pub async fn get_active(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let bindings = template_store::active_bindings(state.db.pool()).await?;
    let map: serde_json::Map<String, Value> = bindings
        .into_iter()
        .map(|(key, value)| {
            let intent = key.rsplit('.').next().unwrap_or(&key).to_string();
            (intent, Value::String(value))
        })
        .collect();
    Ok(Json(Value::Object(map)))
}

/// PUT /api/settings/flow/active
pub async fn put_active(
    State(state): State<AppState>,
    Json(body): Json<SetActive>,
) -> ApiResult<Json<Value>> {
    let intent = Intent::from_str(&body.intent).map_err(OrchestratorError::from)?;
    template_store::set_active(state.db.pool(), intent, &body.template_id).await?;
    Ok(Json(json!({ "intent": body.intent, "templateId": body.template_id })))
}

/// POST /api/settings/flow/templates/:id/reset
pub async fn reset_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<FlowTemplate>> {
    Ok(Json(template_store::reset_template(state.db.pool(), &id).await?))
}

/// POST /api/settings/flow/defaults — reseed the stock templates
pub async fn seed_defaults(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    template_store::seed_defaults(state.db.pool()).await?;
    Ok(Json(json!({ "seeded": true })))
}

/// POST /api/settings/checkpoints/resolve
pub async fn resolve_checkpoint(
    State(state): State<AppState>,
    Json(body): Json<ResolveCheckpoint>,
) -> ApiResult<Json<Value>> {
    let delivered = state
        .engine
        .checkpoints()
        .resolve(&body.chat_id, &body.checkpoint_id, &body.choice);
    Ok(Json(json!({ "resolved": delivered })))
}
