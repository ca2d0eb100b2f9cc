//! Bootstrap reconciler for built-in plugins
//!
//! At startup the reconciler walks a static, ordered manifest of built-in
//! plugins and ensures each exists, is current, and (for core plugins) is
//! active. The walk is idempotent and partial-failure tolerant: one broken
//! manifest entry must not prevent the application from serving requests.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::lifecycle::LifecycleManager;
use super::registry::PluginRegistry;
use super::types::{NewPlugin, PluginStatus, CORE_AUTH_PLUGIN, CORE_PLUGIN_PREFIX};

/// One built-in plugin descriptor in the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Stable id; defaults to `name` when omitted in a manifest file
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Default plugin settings, plugin-defined shape
    #[serde(default = "default_settings")]
    pub settings: serde_json::Value,
}

fn default_settings() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Ordered list of built-in plugin descriptors
///
/// Loaded once at process start; read-only afterwards. Order matters:
/// entries are reconciled first to last, so a core plugin must precede any
/// entry that depends on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// The built-in plugin set shipped with vellum
    pub fn builtin() -> Self {
        let entries = vec![
            ManifestEntry {
                id: "core-auth".to_string(),
                name: "core-auth".to_string(),
                display_name: "Authentication".to_string(),
                description: "User accounts, sessions, and access control".to_string(),
                version: "1.2.0".to_string(),
                author: "Vellum".to_string(),
                category: "security".to_string(),
                icon: "shield".to_string(),
                permissions: vec!["users:read".to_string(), "users:write".to_string()],
                dependencies: vec![],
                settings: serde_json::json!({
                    "sessionTimeoutSecs": 3600,
                    "allowRegistration": false,
                }),
            },
            ManifestEntry {
                id: "core-media".to_string(),
                name: "core-media".to_string(),
                display_name: "Media Library".to_string(),
                description: "Upload, organize, and serve media assets".to_string(),
                version: "1.1.0".to_string(),
                author: "Vellum".to_string(),
                category: "content".to_string(),
                icon: "image".to_string(),
                permissions: vec!["media:read".to_string(), "media:write".to_string()],
                dependencies: vec!["core-auth".to_string()],
                settings: serde_json::json!({
                    "maxUploadMb": 25,
                    "allowedTypes": ["image/png", "image/jpeg", "image/webp"],
                }),
            },
            ManifestEntry {
                id: "core-cache".to_string(),
                name: "core-cache".to_string(),
                display_name: "Cache".to_string(),
                description: "Response and query caching".to_string(),
                version: "1.0.3".to_string(),
                author: "Vellum".to_string(),
                category: "performance".to_string(),
                icon: "zap".to_string(),
                permissions: vec!["cache:flush".to_string()],
                dependencies: vec![],
                settings: serde_json::json!({"ttlSecs": 300}),
            },
            ManifestEntry {
                id: "core-workflow".to_string(),
                name: "core-workflow".to_string(),
                display_name: "Workflow".to_string(),
                description: "Draft, review, and publish states for content".to_string(),
                version: "1.0.0".to_string(),
                author: "Vellum".to_string(),
                category: "content".to_string(),
                icon: "git-branch".to_string(),
                permissions: vec!["content:publish".to_string()],
                dependencies: vec!["core-auth".to_string()],
                settings: default_settings(),
            },
            ManifestEntry {
                id: "starter-faq".to_string(),
                name: "starter-faq".to_string(),
                display_name: "FAQ".to_string(),
                description: "A frequently-asked-questions content type".to_string(),
                version: "0.9.0".to_string(),
                author: "Vellum".to_string(),
                category: "content".to_string(),
                icon: "help-circle".to_string(),
                permissions: vec![],
                dependencies: vec!["core-auth".to_string()],
                settings: serde_json::json!({"perPage": 10}),
            },
        ];
        Self { entries }
    }

    /// Load a manifest from a TOML file.
    ///
    /// Entries without an explicit id get their name as id.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut manifest: Manifest = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid manifest {}: {}", path.display(), e)))?;
        for entry in &mut manifest.entries {
            if entry.id.is_empty() {
                entry.id = entry.name.clone();
            }
        }
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    /// Manifest entries newly installed
    pub installed: u32,
    /// Entries whose metadata was refreshed after a version bump
    pub updated: u32,
    /// Entries activated during this pass
    pub activated: u32,
    /// Entries that failed, with the error message (name, error)
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct EnsureOutcome {
    installed: bool,
    refreshed: bool,
    activated: bool,
}

/// Idempotent startup reconciler over the built-in plugin manifest
#[derive(Debug, Clone)]
pub struct BootstrapReconciler {
    registry: PluginRegistry,
    lifecycle: LifecycleManager,
    manifest: Manifest,
}

impl BootstrapReconciler {
    /// Create a reconciler over the given manifest
    pub fn new(pool: SqlitePool, manifest: Manifest) -> Self {
        Self {
            registry: PluginRegistry::new(pool.clone()),
            lifecycle: LifecycleManager::new(pool),
            manifest,
        }
    }

    /// The manifest this reconciler walks
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Cheap first-run detector: true if any core-prefixed manifest entry
    /// is absent from the store. The reconciler itself is safe to call
    /// unconditionally.
    pub async fn is_bootstrap_needed(&self) -> Result<bool> {
        for entry in self
            .manifest
            .entries
            .iter()
            .filter(|e| e.name.starts_with(CORE_PLUGIN_PREFIX))
        {
            if self.registry.get_by_id(&entry.id).await?.is_none() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Walk the manifest in order and ensure every entry exists, is
    /// current, and (for core plugins) is active.
    ///
    /// Per-entry failures are recorded and skipped; one malformed entry
    /// does not abort reconciliation of the rest.
    pub async fn bootstrap_core_plugins(&self) -> BootstrapReport {
        let mut report = BootstrapReport::default();

        for entry in &self.manifest.entries {
            match self.ensure_plugin_installed(entry).await {
                Ok(outcome) => {
                    if outcome.installed {
                        report.installed += 1;
                    }
                    if outcome.refreshed {
                        report.updated += 1;
                    }
                    if outcome.activated {
                        report.activated += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        plugin_name = %entry.name,
                        error = %e,
                        "Manifest entry reconciliation failed"
                    );
                    report.failed.push((entry.name.clone(), e.to_string()));
                }
            }
        }

        if report.installed + report.updated + report.activated > 0 || !report.failed.is_empty() {
            info!(
                installed = report.installed,
                updated = report.updated,
                activated = report.activated,
                failed = report.failed.len(),
                "Core plugin reconciliation completed"
            );
        } else {
            debug!("Core plugins already current");
        }

        report
    }

    async fn ensure_plugin_installed(&self, entry: &ManifestEntry) -> Result<EnsureOutcome> {
        let mut outcome = EnsureOutcome::default();

        match self.registry.get_by_id(&entry.id).await? {
            None => {
                let new_plugin = NewPlugin::new(&entry.name, &entry.display_name)
                    .with_id(&entry.id)
                    .with_description(&entry.description)
                    .with_version(&entry.version)
                    .with_author(&entry.author)
                    .with_category(&entry.category)
                    .with_icon(&entry.icon)
                    .with_permissions(entry.permissions.clone())
                    .with_dependencies(entry.dependencies.clone())
                    .with_settings(entry.settings.clone());

                let plugin = self.registry.install(new_plugin).await?;
                outcome.installed = true;

                if plugin.is_core {
                    self.lifecycle.activate(&plugin.id, None).await?;
                    outcome.activated = true;
                }
            }
            Some(existing) => {
                // Version compared only for inequality: any mismatch means
                // the shipped metadata is newer than the stored row.
                if existing.version != entry.version {
                    self.registry
                        .refresh_metadata(
                            &existing.id,
                            &entry.version,
                            &entry.description,
                            &entry.permissions,
                            &entry.settings,
                        )
                        .await?;
                    outcome.refreshed = true;
                }

                // The authentication plugin can never remain disabled.
                if entry.name == CORE_AUTH_PLUGIN && existing.status != PluginStatus::Active {
                    self.lifecycle.activate(&existing.id, None).await?;
                    outcome.activated = true;
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::activity::ActivityLog;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        crate::storage::migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    fn entry(name: &str, version: &str, dependencies: &[&str]) -> ManifestEntry {
        ManifestEntry {
            id: name.to_string(),
            name: name.to_string(),
            display_name: name.to_string(),
            description: String::new(),
            version: version.to_string(),
            author: String::new(),
            category: String::new(),
            icon: String::new(),
            permissions: vec![],
            dependencies: dependencies.iter().map(|s| s.to_string()).collect(),
            settings: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn bootstrap_on_empty_store_activates_core_only() {
        let pool = test_pool().await;
        let reconciler = BootstrapReconciler::new(pool.clone(), Manifest::builtin());

        let report = reconciler.bootstrap_core_plugins().await;
        assert_eq!(report.installed as usize, Manifest::builtin().len());
        assert!(report.failed.is_empty());

        let registry = PluginRegistry::new(pool);
        for plugin in registry.list_all().await.unwrap() {
            if plugin.name.starts_with(CORE_PLUGIN_PREFIX) {
                assert_eq!(plugin.status, PluginStatus::Active, "{} should be active", plugin.name);
            } else {
                assert_eq!(plugin.status, PluginStatus::Inactive, "{} should be inactive", plugin.name);
            }
        }
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let pool = test_pool().await;
        let reconciler = BootstrapReconciler::new(pool.clone(), Manifest::builtin());

        reconciler.bootstrap_core_plugins().await;

        let count_rows = || async {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM plugins")
                .fetch_one(&pool)
                .await
                .unwrap();
            n
        };
        let count_installed_entries = || async {
            let (n,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM plugin_activity_log WHERE action = 'installed'",
            )
            .fetch_one(&pool)
            .await
            .unwrap();
            n
        };

        let rows_before = count_rows().await;
        let installs_before = count_installed_entries().await;

        let report = reconciler.bootstrap_core_plugins().await;
        assert_eq!(report.installed, 0);
        assert_eq!(report.updated, 0);
        assert_eq!(report.activated, 0);

        assert_eq!(count_rows().await, rows_before);
        assert_eq!(count_installed_entries().await, installs_before);
    }

    #[tokio::test]
    async fn is_bootstrap_needed_detects_first_run() {
        let pool = test_pool().await;
        let reconciler = BootstrapReconciler::new(pool.clone(), Manifest::builtin());

        assert!(reconciler.is_bootstrap_needed().await.unwrap());
        reconciler.bootstrap_core_plugins().await;
        assert!(!reconciler.is_bootstrap_needed().await.unwrap());
    }

    #[tokio::test]
    async fn is_bootstrap_needed_ignores_non_core_entries() {
        let pool = test_pool().await;
        let manifest = Manifest {
            entries: vec![entry("core-auth", "1.0.0", &[]), entry("starter-faq", "1.0.0", &[])],
        };
        let reconciler = BootstrapReconciler::new(pool.clone(), manifest);

        reconciler.bootstrap_core_plugins().await;

        // Remove the non-core plugin; bootstrap is still satisfied
        sqlx::query("DELETE FROM plugins WHERE name = 'starter-faq'")
            .execute(&pool)
            .await
            .unwrap();
        assert!(!reconciler.is_bootstrap_needed().await.unwrap());

        // Remove a core plugin; bootstrap is needed again
        sqlx::query("DELETE FROM plugins WHERE name = 'core-auth'")
            .execute(&pool)
            .await
            .unwrap();
        assert!(reconciler.is_bootstrap_needed().await.unwrap());
    }

    #[tokio::test]
    async fn version_bump_refreshes_metadata_but_not_status() {
        let pool = test_pool().await;
        let v1 = Manifest {
            entries: vec![entry("starter-faq", "1.0.0", &[])],
        };
        BootstrapReconciler::new(pool.clone(), v1)
            .bootstrap_core_plugins()
            .await;

        let mut bumped = entry("starter-faq", "1.1.0", &[]);
        bumped.description = "Now with search".to_string();
        let v2 = Manifest { entries: vec![bumped] };
        let report = BootstrapReconciler::new(pool.clone(), v2)
            .bootstrap_core_plugins()
            .await;

        assert_eq!(report.installed, 0);
        assert_eq!(report.updated, 1);

        let registry = PluginRegistry::new(pool);
        let plugin = registry.get_by_name("starter-faq").await.unwrap().unwrap();
        assert_eq!(plugin.version, "1.1.0");
        assert_eq!(plugin.description, "Now with search");
        assert_eq!(plugin.status, PluginStatus::Inactive);
    }

    #[tokio::test]
    async fn core_auth_is_force_activated_when_disabled() {
        let pool = test_pool().await;
        let reconciler = BootstrapReconciler::new(pool.clone(), Manifest::builtin());
        reconciler.bootstrap_core_plugins().await;

        // Disable core-auth behind the lifecycle manager's back
        sqlx::query("UPDATE plugins SET status = 'inactive', activated_at = NULL WHERE name = 'core-auth'")
            .execute(&pool)
            .await
            .unwrap();

        let report = reconciler.bootstrap_core_plugins().await;
        assert_eq!(report.activated, 1);

        let registry = PluginRegistry::new(pool);
        let auth = registry.get_by_name("core-auth").await.unwrap().unwrap();
        assert_eq!(auth.status, PluginStatus::Active);
    }

    #[tokio::test]
    async fn other_core_plugins_are_not_force_activated() {
        let pool = test_pool().await;
        let reconciler = BootstrapReconciler::new(pool.clone(), Manifest::builtin());
        reconciler.bootstrap_core_plugins().await;

        sqlx::query("UPDATE plugins SET status = 'inactive', activated_at = NULL WHERE name = 'core-cache'")
            .execute(&pool)
            .await
            .unwrap();

        let report = reconciler.bootstrap_core_plugins().await;
        assert_eq!(report.activated, 0);

        let registry = PluginRegistry::new(pool);
        let cache = registry.get_by_name("core-cache").await.unwrap().unwrap();
        assert_eq!(cache.status, PluginStatus::Inactive);
    }

    #[tokio::test]
    async fn one_broken_entry_does_not_abort_the_rest() {
        let pool = test_pool().await;
        // core-broken depends on a plugin that is never installed, so its
        // post-install activation fails; core-ok comes after it.
        let manifest = Manifest {
            entries: vec![
                entry("core-broken", "1.0.0", &["nonexistent"]),
                entry("core-ok", "1.0.0", &[]),
            ],
        };
        let reconciler = BootstrapReconciler::new(pool.clone(), manifest);

        let report = reconciler.bootstrap_core_plugins().await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "core-broken");

        let registry = PluginRegistry::new(pool);
        let ok = registry.get_by_name("core-ok").await.unwrap().unwrap();
        assert_eq!(ok.status, PluginStatus::Active);
    }

    #[tokio::test]
    async fn bootstrap_writes_activation_audit_entries() {
        let pool = test_pool().await;
        let manifest = Manifest {
            entries: vec![entry("core-auth", "1.0.0", &[])],
        };
        BootstrapReconciler::new(pool.clone(), manifest)
            .bootstrap_core_plugins()
            .await;

        let log = ActivityLog::new(pool);
        let actions: Vec<String> = log
            .recent("core-auth", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["activated", "installed"]);
    }

    #[test]
    fn manifest_parses_from_toml() {
        let toml_src = r#"
            [[entries]]
            name = "core-auth"
            display_name = "Authentication"
            version = "1.0.0"
            permissions = ["users:read"]
            settings = { sessionTimeoutSecs = 3600 }

            [[entries]]
            id = "starter-blog"
            name = "starter-blog"
            display_name = "Blog"
            version = "0.2.0"
            dependencies = ["core-auth"]
        "#;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.toml");
        std::fs::write(&path, toml_src).unwrap();

        let manifest = Manifest::from_path(&path).unwrap();
        assert_eq!(manifest.len(), 2);
        // Missing id falls back to name
        assert_eq!(manifest.entries[0].id, "core-auth");
        assert_eq!(manifest.entries[0].settings["sessionTimeoutSecs"], 3600);
        assert_eq!(manifest.entries[1].dependencies, vec!["core-auth"]);
    }

    #[test]
    fn manifest_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.toml");
        std::fs::write(&path, "entries = 12").unwrap();

        assert!(matches!(Manifest::from_path(&path), Err(Error::Config(_))));
    }
}
