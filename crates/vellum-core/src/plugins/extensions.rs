//! Extension registries - hooks and routes
//!
//! Registrations are unconditional inserts: registering the same hook or
//! route twice creates two rows, and uninstalling a plugin does not remove
//! its rows. Readers filter to active rows; hooks are returned in ascending
//! priority order (lower priority value runs earlier).

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::Result;

use super::activity::parse_timestamp;
use super::types::{PluginHook, PluginRoute, DEFAULT_HOOK_PRIORITY};

/// Store for plugin hook and route registrations
#[derive(Debug, Clone)]
pub struct ExtensionRegistry {
    pool: SqlitePool,
}

impl ExtensionRegistry {
    /// Create a new extension registry with the given database pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a handler against a named extension point.
    ///
    /// `priority` defaults to 10 when not given.
    pub async fn register_hook(
        &self,
        plugin_id: &str,
        hook_name: &str,
        handler_name: &str,
        priority: Option<i64>,
    ) -> Result<PluginHook> {
        let hook = PluginHook {
            id: uuid::Uuid::new_v4().to_string(),
            plugin_id: plugin_id.to_string(),
            hook_name: hook_name.to_string(),
            handler_name: handler_name.to_string(),
            priority: priority.unwrap_or(DEFAULT_HOOK_PRIORITY),
            is_active: true,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO plugin_hooks (id, plugin_id, hook_name, handler_name, priority, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&hook.id)
        .bind(&hook.plugin_id)
        .bind(&hook.hook_name)
        .bind(&hook.handler_name)
        .bind(hook.priority)
        .bind(hook.is_active)
        .bind(hook.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(plugin_id = %plugin_id, hook_name = %hook_name, priority = hook.priority, "Hook registered");
        Ok(hook)
    }

    /// Register an HTTP route binding for a plugin handler
    pub async fn register_route(
        &self,
        plugin_id: &str,
        path: &str,
        method: &str,
        handler_name: &str,
        middleware: Vec<String>,
    ) -> Result<PluginRoute> {
        let route = PluginRoute {
            id: uuid::Uuid::new_v4().to_string(),
            plugin_id: plugin_id.to_string(),
            path: path.to_string(),
            method: method.to_string(),
            handler_name: handler_name.to_string(),
            middleware,
            is_active: true,
            created_at: Utc::now(),
        };
        let middleware_json = serde_json::to_string(&route.middleware)?;

        sqlx::query(
            r#"
            INSERT INTO plugin_routes (id, plugin_id, path, method, handler_name, middleware, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&route.id)
        .bind(&route.plugin_id)
        .bind(&route.path)
        .bind(&route.method)
        .bind(&route.handler_name)
        .bind(&middleware_json)
        .bind(route.is_active)
        .bind(route.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(plugin_id = %plugin_id, path = %path, method = %method, "Route registered");
        Ok(route)
    }

    /// Active hooks registered by a plugin, in ascending priority order
    pub async fn plugin_hooks(&self, plugin_id: &str) -> Result<Vec<PluginHook>> {
        let rows: Vec<HookRow> = sqlx::query_as(
            r#"
            SELECT * FROM plugin_hooks
            WHERE plugin_id = ? AND is_active = 1
            ORDER BY priority ASC, created_at ASC
            "#,
        )
        .bind(plugin_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_hook()).collect()
    }

    /// Active hooks for a named extension point across all plugins,
    /// in ascending priority order
    pub async fn hooks_by_name(&self, hook_name: &str) -> Result<Vec<PluginHook>> {
        let rows: Vec<HookRow> = sqlx::query_as(
            r#"
            SELECT * FROM plugin_hooks
            WHERE hook_name = ? AND is_active = 1
            ORDER BY priority ASC, created_at ASC
            "#,
        )
        .bind(hook_name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_hook()).collect()
    }

    /// Active routes registered by a plugin
    pub async fn plugin_routes(&self, plugin_id: &str) -> Result<Vec<PluginRoute>> {
        let rows: Vec<RouteRow> = sqlx::query_as(
            r#"
            SELECT * FROM plugin_routes
            WHERE plugin_id = ? AND is_active = 1
            "#,
        )
        .bind(plugin_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_route()).collect()
    }
}

/// Raw hook row as stored in SQLite
#[derive(Debug, FromRow)]
struct HookRow {
    id: String,
    plugin_id: String,
    hook_name: String,
    handler_name: String,
    priority: i64,
    is_active: bool,
    created_at: String,
}

impl HookRow {
    fn into_hook(self) -> Result<PluginHook> {
        Ok(PluginHook {
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            plugin_id: self.plugin_id,
            hook_name: self.hook_name,
            handler_name: self.handler_name,
            priority: self.priority,
            is_active: self.is_active,
        })
    }
}

/// Raw route row as stored in SQLite
#[derive(Debug, FromRow)]
struct RouteRow {
    id: String,
    plugin_id: String,
    path: String,
    method: String,
    handler_name: String,
    middleware: String,
    is_active: bool,
    created_at: String,
}

impl RouteRow {
    fn into_route(self) -> Result<PluginRoute> {
        Ok(PluginRoute {
            middleware: serde_json::from_str(&self.middleware)?,
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            plugin_id: self.plugin_id,
            path: self.path,
            method: self.method,
            handler_name: self.handler_name,
            is_active: self.is_active,
        })
    }
}
