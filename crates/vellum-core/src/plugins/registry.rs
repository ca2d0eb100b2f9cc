//! Plugin registry - CRUD and query operations over plugin records
//!
//! All reads decode JSON columns and timestamps at this boundary; the rest
//! of the crate only sees typed `Plugin` values.

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::activity::{parse_timestamp, ActivityLog};
use super::types::{NewPlugin, Plugin, PluginAction, PluginStats, PluginStatus};

/// Store for installed plugin records
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    pool: SqlitePool,
    activity: ActivityLog,
}

impl PluginRegistry {
    /// Create a new registry with the given database pool
    pub fn new(pool: SqlitePool) -> Self {
        let activity = ActivityLog::new(pool.clone());
        Self { pool, activity }
    }

    /// Install a plugin record.
    ///
    /// Assigns an id when the request carries none, defaults the status to
    /// `inactive`, appends an `installed` audit entry, and returns the
    /// freshly read-back record.
    pub async fn install(&self, new_plugin: NewPlugin) -> Result<Plugin> {
        let id = new_plugin
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let is_core = new_plugin.is_core();
        let now = Utc::now().to_rfc3339();

        let settings_json = serde_json::to_string(&new_plugin.settings)?;
        let permissions_json = serde_json::to_string(&new_plugin.permissions)?;
        let dependencies_json = serde_json::to_string(&new_plugin.dependencies)?;

        sqlx::query(
            r#"
            INSERT INTO plugins (
                id, name, display_name, description, version, author, category, icon,
                status, is_core, settings, permissions, dependencies,
                installed_at, last_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'inactive', ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new_plugin.name)
        .bind(&new_plugin.display_name)
        .bind(&new_plugin.description)
        .bind(&new_plugin.version)
        .bind(&new_plugin.author)
        .bind(&new_plugin.category)
        .bind(&new_plugin.icon)
        .bind(is_core)
        .bind(&settings_json)
        .bind(&permissions_json)
        .bind(&dependencies_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.activity
            .record_best_effort(
                &id,
                PluginAction::Installed,
                None,
                Some(serde_json::json!({
                    "name": new_plugin.name,
                    "version": new_plugin.version,
                })),
            )
            .await;

        info!(plugin_id = %id, plugin_name = %new_plugin.name, "Plugin installed");

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| Error::Other(format!("plugin '{}' missing after install", id)))
    }

    /// Get a plugin by id
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Plugin>> {
        let row: Option<PluginRow> = sqlx::query_as(
            r#"
            SELECT * FROM plugins WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_plugin()).transpose()
    }

    /// Get a plugin by its unique name
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Plugin>> {
        let row: Option<PluginRow> = sqlx::query_as(
            r#"
            SELECT * FROM plugins WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_plugin()).transpose()
    }

    /// List all plugins, core plugins first, then alphabetically by
    /// display name
    pub async fn list_all(&self) -> Result<Vec<Plugin>> {
        let rows: Vec<PluginRow> = sqlx::query_as(
            r#"
            SELECT * FROM plugins
            ORDER BY is_core DESC, display_name COLLATE NOCASE ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Listed plugins");
        rows.into_iter().map(|r| r.into_plugin()).collect()
    }

    /// Aggregate counts of total / active / inactive / error plugins
    pub async fn stats(&self) -> Result<PluginStats> {
        let (total, active, inactive, error): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN status = 'inactive' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0)
            FROM plugins
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PluginStats {
            total: total as u64,
            active: active as u64,
            inactive: inactive as u64,
            error: error as u64,
        })
    }

    /// Refresh manifest-owned fields after a version bump.
    ///
    /// Touches version, description, permissions, settings, and the
    /// last-updated stamp; the lifecycle status is left as it was.
    pub(crate) async fn refresh_metadata(
        &self,
        id: &str,
        version: &str,
        description: &str,
        permissions: &[String],
        settings: &serde_json::Value,
    ) -> Result<()> {
        let permissions_json = serde_json::to_string(permissions)?;
        let settings_json = serde_json::to_string(settings)?;

        sqlx::query(
            r#"
            UPDATE plugins
            SET version = ?, description = ?, permissions = ?, settings = ?, last_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(version)
        .bind(description)
        .bind(&permissions_json)
        .bind(&settings_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        debug!(plugin_id = %id, version = %version, "Plugin metadata refreshed");
        Ok(())
    }
}

/// Raw plugin row as stored in SQLite
#[derive(Debug, FromRow)]
pub(crate) struct PluginRow {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub category: String,
    pub icon: String,
    pub status: String,
    pub is_core: bool,
    pub error_message: Option<String>,
    pub settings: String,
    pub permissions: String,
    pub dependencies: String,
    pub download_count: i64,
    pub rating: f64,
    pub installed_at: String,
    pub activated_at: Option<String>,
    pub last_updated: String,
}

impl PluginRow {
    pub(crate) fn into_plugin(self) -> Result<Plugin> {
        Ok(Plugin {
            status: PluginStatus::parse(&self.status),
            settings: serde_json::from_str(&self.settings)?,
            permissions: serde_json::from_str(&self.permissions)?,
            dependencies: serde_json::from_str(&self.dependencies)?,
            installed_at: parse_timestamp(&self.installed_at)?,
            activated_at: self
                .activated_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            last_updated: parse_timestamp(&self.last_updated)?,
            id: self.id,
            name: self.name,
            display_name: self.display_name,
            description: self.description,
            version: self.version,
            author: self.author,
            category: self.category,
            icon: self.icon,
            is_core: self.is_core,
            error_message: self.error_message,
            download_count: self.download_count,
            rating: self.rating,
        })
    }
}
