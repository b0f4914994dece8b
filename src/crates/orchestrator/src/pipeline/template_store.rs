//! Flow template persistence over `app_settings`
//!
//! Templates are stored as JSON under `flow.template.<id>` with the active
//! binding per intent under `flow.active.<intent>`. Reads apply the
//! defaults auto-upgrade: a stored default template older than the current
//! defaults version is regenerated in place, preserving id and name.

use crate::db::repositories::{SettingsRepository, FLOW_ACTIVE_PREFIX, FLOW_TEMPLATE_PREFIX};
use crate::db::DatabasePool;
use crate::{OrchestratorError, Result};
use flow_core::{templates, FlowTemplate, Intent};
use tracing::{debug, info};

fn template_key(id: &str) -> String {
    format!("{}{}", FLOW_TEMPLATE_PREFIX, id)
}

fn active_key(intent: Intent) -> String {
    format!("{}{}", FLOW_ACTIVE_PREFIX, intent)
}

/// Persist a template
pub async fn save_template(pool: &DatabasePool, template: &FlowTemplate) -> Result<()> {
    let value = serde_json::to_string(template)?;
    SettingsRepository::set(pool, &template_key(&template.id), &value).await?;
    Ok(())
}

/// Load a template by id, applying the defaults auto-upgrade
pub async fn load_template(pool: &DatabasePool, id: &str) -> Result<Option<FlowTemplate>> {
    let Some(raw) = SettingsRepository::get(pool, &template_key(id)).await? else {
        return Ok(None);
    };
    let stored: FlowTemplate = serde_json::from_str(&raw)?;

    if templates::needs_upgrade(&stored) {
        info!(template = id, version = stored.version, "upgrading outdated default template");
        let upgraded = templates::upgrade_if_outdated(stored);
        save_template(pool, &upgraded).await?;
        return Ok(Some(upgraded));
    }

    Ok(Some(stored))
}

/// List every stored template
pub async fn list_templates(pool: &DatabasePool) -> Result<Vec<FlowTemplate>> {
    let mut result = Vec::new();
    for (_key, value) in SettingsRepository::list_prefix(pool, FLOW_TEMPLATE_PREFIX).await? {
        let stored: FlowTemplate = serde_json::from_str(&value)?;
        result.push(if templates::needs_upgrade(&stored) {
            let upgraded = templates::upgrade_if_outdated(stored);
            save_template(pool, &upgraded).await?;
            upgraded
        } else {
            stored
        });
    }
    Ok(result)
}

/// Delete a template
pub async fn delete_template(pool: &DatabasePool, id: &str) -> Result<()> {
    SettingsRepository::delete(pool, &template_key(id)).await?;
    Ok(())
}

/// Bind a template as the active one for its intent
pub async fn set_active(pool: &DatabasePool, intent: Intent, template_id: &str) -> Result<()> {
    SettingsRepository::set(pool, &active_key(intent), template_id).await?;
    Ok(())
}

/// Current active bindings
pub async fn active_bindings(pool: &DatabasePool) -> Result<Vec<(String, String)>> {
    Ok(SettingsRepository::list_prefix(pool, FLOW_ACTIVE_PREFIX).await?)
}

/// Write the stock templates and bindings, replacing any existing defaults
pub async fn seed_defaults(pool: &DatabasePool) -> Result<()> {
    for template in templates::default_templates() {
        save_template(pool, &template).await?;
        set_active(pool, template.intent, &template.id).await?;
    }
    info!("seeded default flow templates");
    Ok(())
}

/// Reset a stored default template to the stock shape, preserving id/name
pub async fn reset_template(pool: &DatabasePool, id: &str) -> Result<FlowTemplate> {
    let Some(stored) = load_template(pool, id).await? else {
        return Err(OrchestratorError::NotFound(format!("template {}", id)));
    };
    let mut fresh = templates::default_template_for(stored.intent);
    fresh.id = stored.id;
    fresh.name = stored.name;
    save_template(pool, &fresh).await?;
    Ok(fresh)
}

/// The enabled template bound to an intent, seeding defaults when absent
pub async fn active_template_for(pool: &DatabasePool, intent: Intent) -> Result<FlowTemplate> {
    for attempt in 0..2 {
        if let Some(template_id) = SettingsRepository::get(pool, &active_key(intent)).await? {
            if let Some(template) = load_template(pool, &template_id).await? {
                if template.enabled {
                    return Ok(template);
                }
                debug!(template = %template_id, "active template disabled, reseeding");
            }
        }
        if attempt == 0 {
            seed_defaults(pool).await?;
        }
    }
    Err(OrchestratorError::NotFound(format!(
        "no enabled template for intent {}",
        intent
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use flow_core::FLOW_DEFAULTS_VERSION;

    #[tokio::test]
    async fn test_active_template_seeds_on_first_use() {
        let db = Database::in_memory().await.unwrap();
        let template = active_template_for(db.pool(), Intent::Build).await.unwrap();
        assert_eq!(template.intent, Intent::Build);
        assert!(template.is_default);

        let all = list_templates(db.pool()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_outdated_default_upgraded_on_read() {
        let db = Database::in_memory().await.unwrap();
        let mut stale = flow_core::templates::default_build_template();
        stale.version = FLOW_DEFAULTS_VERSION - 1;
        stale.name = "Renamed Build".to_string();
        stale.nodes.clear();
        stale.edges.clear();
        save_template(db.pool(), &stale).await.unwrap();

        let loaded = load_template(db.pool(), "default-build").await.unwrap().unwrap();
        assert_eq!(loaded.version, FLOW_DEFAULTS_VERSION);
        assert_eq!(loaded.name, "Renamed Build");
        assert!(!loaded.nodes.is_empty());

        // The upgrade persisted
        let reloaded = load_template(db.pool(), "default-build").await.unwrap().unwrap();
        assert_eq!(reloaded.version, FLOW_DEFAULTS_VERSION);
    }

    #[tokio::test]
    async fn test_reset_preserves_identity() {
        let db = Database::in_memory().await.unwrap();
        seed_defaults(db.pool()).await.unwrap();

        let mut custom = load_template(db.pool(), "default-fix").await.unwrap().unwrap();
        custom.nodes.clear();
        custom.edges.clear();
        custom.name = "My Fix".to_string();
        save_template(db.pool(), &custom).await.unwrap();

        let reset = reset_template(db.pool(), "default-fix").await.unwrap();
        assert_eq!(reset.name, "My Fix");
        assert!(!reset.nodes.is_empty());
    }

    #[tokio::test]
    async fn test_set_active_rebinding() {
        let db = Database::in_memory().await.unwrap();
        seed_defaults(db.pool()).await.unwrap();

        let mut custom = flow_core::templates::default_build_template();
        custom.id = "custom-build".to_string();
        custom.is_default = false;
        save_template(db.pool(), &custom).await.unwrap();
        set_active(db.pool(), Intent::Build, "custom-build").await.unwrap();

        let active = active_template_for(db.pool(), Intent::Build).await.unwrap();
        assert_eq!(active.id, "custom-build");
    }
}
