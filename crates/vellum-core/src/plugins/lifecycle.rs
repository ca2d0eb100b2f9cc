//! Plugin lifecycle state machine
//!
//! Transitions over `status`: `inactive ⇄ active`, `inactive|active ->
//! error` via [`LifecycleManager::set_error`], and `error -> active` via a
//! successful activate. Dependency checks are name-based and single-hop:
//! activation only inspects the current status of immediate dependencies,
//! since their own chains were enforced when they activated.
//!
//! Each mutation runs its row write together with its audit entry in one
//! transaction, so a status change and its activity record commit
//! atomically. The dependency and dependent checks read within that same
//! transaction.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::error::{Error, Result};

use super::activity::insert_entry;
use super::registry::PluginRow;
use super::types::{Plugin, PluginAction, PluginStatus};

/// Activation/deactivation state machine with dependency validation
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    pool: SqlitePool,
}

impl LifecycleManager {
    /// Create a new lifecycle manager with the given database pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Activate a plugin.
    ///
    /// Every name in the plugin's `dependencies` list must resolve to a
    /// currently active plugin; otherwise this fails with
    /// [`Error::DependencyUnmet`] naming the first offender and writes
    /// nothing. On success the status becomes `active`, `activated_at` is
    /// stamped, and any error message is cleared.
    pub async fn activate(&self, plugin_id: &str, actor: Option<&str>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let plugin = load_plugin(&mut tx, plugin_id).await?;

        for dependency in &plugin.dependencies {
            let status: Option<(String,)> =
                sqlx::query_as("SELECT status FROM plugins WHERE name = ?")
                    .bind(dependency)
                    .fetch_optional(&mut *tx)
                    .await?;
            let dependency_active = status
                .map(|(s,)| PluginStatus::parse(&s) == PluginStatus::Active)
                .unwrap_or(false);
            if !dependency_active {
                return Err(Error::DependencyUnmet {
                    plugin: plugin.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        sqlx::query(
            r#"
            UPDATE plugins
            SET status = 'active', activated_at = ?, error_message = NULL
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(plugin_id)
        .execute(&mut *tx)
        .await?;

        insert_entry(&mut tx, plugin_id, PluginAction::Activated, actor, None).await?;
        tx.commit().await?;

        info!(plugin_id = %plugin_id, plugin_name = %plugin.name, "Plugin activated");
        Ok(())
    }

    /// Deactivate a plugin.
    ///
    /// Fails with [`Error::DependentsActive`] naming the display names of
    /// every active plugin that lists this one as a dependency; nothing is
    /// written in that case. On success the status becomes `inactive` and
    /// `activated_at` is cleared.
    pub async fn deactivate(&self, plugin_id: &str, actor: Option<&str>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let plugin = load_plugin(&mut tx, plugin_id).await?;

        let dependents = active_dependents(&mut tx, &plugin).await?;
        if !dependents.is_empty() {
            return Err(Error::DependentsActive {
                plugin: plugin.name.clone(),
                dependents,
            });
        }

        deactivate_in_tx(&mut tx, plugin_id).await?;
        insert_entry(&mut tx, plugin_id, PluginAction::Deactivated, actor, None).await?;
        tx.commit().await?;

        info!(plugin_id = %plugin_id, plugin_name = %plugin.name, "Plugin deactivated");
        Ok(())
    }

    /// Uninstall a plugin.
    ///
    /// Core plugins are rejected with [`Error::CoreProtected`]. An active
    /// plugin is deactivated first, inheriting the dependent check failure
    /// mode. Hook and route rows registered by the plugin are left behind.
    pub async fn uninstall(&self, plugin_id: &str, actor: Option<&str>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let plugin = load_plugin(&mut tx, plugin_id).await?;

        if plugin.is_core {
            return Err(Error::CoreProtected(plugin.name));
        }

        if plugin.status == PluginStatus::Active {
            let dependents = active_dependents(&mut tx, &plugin).await?;
            if !dependents.is_empty() {
                return Err(Error::DependentsActive {
                    plugin: plugin.name.clone(),
                    dependents,
                });
            }
            deactivate_in_tx(&mut tx, plugin_id).await?;
            insert_entry(&mut tx, plugin_id, PluginAction::Deactivated, actor, None).await?;
        }

        sqlx::query("DELETE FROM plugins WHERE id = ?")
            .bind(plugin_id)
            .execute(&mut *tx)
            .await?;

        insert_entry(
            &mut tx,
            plugin_id,
            PluginAction::Uninstalled,
            actor,
            Some(&serde_json::json!({"name": plugin.name})),
        )
        .await?;
        tx.commit().await?;

        info!(plugin_id = %plugin_id, plugin_name = %plugin.name, "Plugin uninstalled");
        Ok(())
    }

    /// Mark a plugin as malfunctioning.
    ///
    /// Unconditional transition to the `error` status; callers use this
    /// when they detect a plugin misbehaving at runtime.
    pub async fn set_error(
        &self,
        plugin_id: &str,
        message: &str,
        actor: Option<&str>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let plugin = load_plugin(&mut tx, plugin_id).await?;

        sqlx::query("UPDATE plugins SET status = 'error', error_message = ? WHERE id = ?")
            .bind(message)
            .bind(plugin_id)
            .execute(&mut *tx)
            .await?;

        insert_entry(
            &mut tx,
            plugin_id,
            PluginAction::Error,
            actor,
            Some(&serde_json::json!({"message": message})),
        )
        .await?;
        tx.commit().await?;

        info!(plugin_id = %plugin_id, plugin_name = %plugin.name, error_message = %message, "Plugin marked as errored");
        Ok(())
    }

    /// Overwrite a plugin's settings blob.
    ///
    /// The shape of `settings` is plugin-defined and not validated here.
    pub async fn update_settings(
        &self,
        plugin_id: &str,
        settings: serde_json::Value,
        actor: Option<&str>,
    ) -> Result<()> {
        let settings_json = serde_json::to_string(&settings)?;

        let mut tx = self.pool.begin().await?;
        let plugin = load_plugin(&mut tx, plugin_id).await?;

        sqlx::query("UPDATE plugins SET settings = ?, last_updated = ? WHERE id = ?")
            .bind(&settings_json)
            .bind(Utc::now().to_rfc3339())
            .bind(plugin_id)
            .execute(&mut *tx)
            .await?;

        insert_entry(&mut tx, plugin_id, PluginAction::SettingsUpdated, actor, None).await?;
        tx.commit().await?;

        info!(plugin_id = %plugin_id, plugin_name = %plugin.name, "Plugin settings updated");
        Ok(())
    }
}

/// Load a plugin inside a transaction, failing with `PluginNotFound`
async fn load_plugin(conn: &mut SqliteConnection, plugin_id: &str) -> Result<Plugin> {
    let row: Option<PluginRow> = sqlx::query_as("SELECT * FROM plugins WHERE id = ?")
        .bind(plugin_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(|r| r.into_plugin())
        .transpose()?
        .ok_or_else(|| Error::PluginNotFound(plugin_id.to_string()))
}

/// Display names of active plugins that depend on `plugin` by name.
///
/// Dependencies are stored as JSON name lists, so candidates are decoded
/// and filtered here rather than matched with SQL string patterns.
async fn active_dependents(conn: &mut SqliteConnection, plugin: &Plugin) -> Result<Vec<String>> {
    let rows: Vec<PluginRow> =
        sqlx::query_as("SELECT * FROM plugins WHERE status = 'active' AND id != ?")
            .bind(&plugin.id)
            .fetch_all(&mut *conn)
            .await?;

    let mut dependents = Vec::new();
    for row in rows {
        let other = row.into_plugin()?;
        if other.dependencies.iter().any(|d| d == &plugin.name) {
            dependents.push(other.display_name);
        }
    }
    Ok(dependents)
}

async fn deactivate_in_tx(conn: &mut SqliteConnection, plugin_id: &str) -> Result<()> {
    sqlx::query("UPDATE plugins SET status = 'inactive', activated_at = NULL WHERE id = ?")
        .bind(plugin_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
