//! Plugin service facade
//!
//! Composes the registry, lifecycle manager, extension registries,
//! activity log, and bootstrap reconciler behind the operation set the rest
//! of the application calls. Request handlers receive a `PluginService` by
//! reference; there is no process-wide singleton.
//!
//! The service is a stateless wrapper over the connection pool (the
//! manifest is read-only configuration), so constructing one per request is
//! also fine.

use sqlx::SqlitePool;

use crate::error::Result;

use super::activity::ActivityLog;
use super::bootstrap::{BootstrapReconciler, BootstrapReport, Manifest};
use super::extensions::ExtensionRegistry;
use super::lifecycle::LifecycleManager;
use super::registry::PluginRegistry;
use super::types::{
    ActivityEntry, NewPlugin, Plugin, PluginAction, PluginHook, PluginRoute, PluginStats,
};

/// The public face of the plugin subsystem
#[derive(Debug, Clone)]
pub struct PluginService {
    registry: PluginRegistry,
    lifecycle: LifecycleManager,
    extensions: ExtensionRegistry,
    activity: ActivityLog,
    reconciler: BootstrapReconciler,
}

impl PluginService {
    /// Create a service over the given pool and manifest
    pub fn new(pool: SqlitePool, manifest: Manifest) -> Self {
        Self {
            registry: PluginRegistry::new(pool.clone()),
            lifecycle: LifecycleManager::new(pool.clone()),
            extensions: ExtensionRegistry::new(pool.clone()),
            activity: ActivityLog::new(pool.clone()),
            reconciler: BootstrapReconciler::new(pool, manifest),
        }
    }

    /// Create a service over the built-in manifest
    pub fn with_builtin_manifest(pool: SqlitePool) -> Self {
        Self::new(pool, Manifest::builtin())
    }

    // ---- Registry ----

    /// Install a plugin record
    pub async fn install(&self, new_plugin: NewPlugin) -> Result<Plugin> {
        self.registry.install(new_plugin).await
    }

    /// Get a plugin by id
    pub async fn get_plugin(&self, id: &str) -> Result<Option<Plugin>> {
        self.registry.get_by_id(id).await
    }

    /// Get a plugin by its unique name
    pub async fn get_plugin_by_name(&self, name: &str) -> Result<Option<Plugin>> {
        self.registry.get_by_name(name).await
    }

    /// List all plugins, core first, then alphabetically by display name.
    ///
    /// Reconciles the manifest first so newly shipped entries appear
    /// without a separate startup step; reconciliation failures are logged
    /// inside the reconciler and do not block the listing.
    pub async fn list_plugins(&self) -> Result<Vec<Plugin>> {
        self.reconciler.bootstrap_core_plugins().await;
        self.registry.list_all().await
    }

    /// Aggregate plugin counts by status
    pub async fn stats(&self) -> Result<PluginStats> {
        self.registry.stats().await
    }

    // ---- Lifecycle ----

    /// Activate a plugin after validating its dependencies
    pub async fn activate(&self, plugin_id: &str, actor: Option<&str>) -> Result<()> {
        self.lifecycle.activate(plugin_id, actor).await
    }

    /// Deactivate a plugin unless active plugins still depend on it
    pub async fn deactivate(&self, plugin_id: &str, actor: Option<&str>) -> Result<()> {
        self.lifecycle.deactivate(plugin_id, actor).await
    }

    /// Uninstall a non-core plugin, deactivating it first if needed
    pub async fn uninstall(&self, plugin_id: &str, actor: Option<&str>) -> Result<()> {
        self.lifecycle.uninstall(plugin_id, actor).await
    }

    /// Mark a plugin as malfunctioning
    pub async fn set_error(&self, plugin_id: &str, message: &str, actor: Option<&str>) -> Result<()> {
        self.lifecycle.set_error(plugin_id, message, actor).await
    }

    /// Overwrite a plugin's settings blob
    pub async fn update_settings(
        &self,
        plugin_id: &str,
        settings: serde_json::Value,
        actor: Option<&str>,
    ) -> Result<()> {
        self.lifecycle.update_settings(plugin_id, settings, actor).await
    }

    // ---- Extensions ----

    /// Register a handler against a named extension point
    pub async fn register_hook(
        &self,
        plugin_id: &str,
        hook_name: &str,
        handler_name: &str,
        priority: Option<i64>,
    ) -> Result<PluginHook> {
        self.extensions
            .register_hook(plugin_id, hook_name, handler_name, priority)
            .await
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
        self.extensions
            .register_route(plugin_id, path, method, handler_name, middleware)
            .await
    }

    /// Active hooks registered by a plugin, ascending priority
    pub async fn plugin_hooks(&self, plugin_id: &str) -> Result<Vec<PluginHook>> {
        self.extensions.plugin_hooks(plugin_id).await
    }

    /// Active hooks for a named extension point across all plugins
    pub async fn hooks_by_name(&self, hook_name: &str) -> Result<Vec<PluginHook>> {
        self.extensions.hooks_by_name(hook_name).await
    }

    /// Active routes registered by a plugin
    pub async fn plugin_routes(&self, plugin_id: &str) -> Result<Vec<PluginRoute>> {
        self.extensions.plugin_routes(plugin_id).await
    }

    // ---- Activity ----

    /// Append an audit entry on behalf of a caller
    pub async fn record_activity(
        &self,
        plugin_id: &str,
        action: PluginAction,
        user_id: Option<&str>,
        details: Option<serde_json::Value>,
    ) -> Result<()> {
        self.activity.record(plugin_id, action, user_id, details).await
    }

    /// Most recent audit entries for a plugin, newest first
    pub async fn recent_activity(&self, plugin_id: &str, limit: u32) -> Result<Vec<ActivityEntry>> {
        self.activity.recent(plugin_id, limit).await
    }

    // ---- Bootstrap ----

    /// Reconcile the manifest: install missing entries, refresh stale
    /// metadata, activate core plugins
    pub async fn bootstrap_core_plugins(&self) -> BootstrapReport {
        self.reconciler.bootstrap_core_plugins().await
    }

    /// True if any core manifest entry is missing from the store
    pub async fn is_bootstrap_needed(&self) -> Result<bool> {
        self.reconciler.is_bootstrap_needed().await
    }
}
