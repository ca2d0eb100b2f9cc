//! Plugin data types and models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved name prefix for core plugins
pub const CORE_PLUGIN_PREFIX: &str = "core-";

/// The authentication plugin, which bootstrap never leaves disabled
pub const CORE_AUTH_PLUGIN: &str = "core-auth";

/// Hook priority used when a registration does not specify one
pub const DEFAULT_HOOK_PRIORITY: i64 = 10;

/// Lifecycle status of an installed plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Inactive,
    Active,
    Error,
}

impl PluginStatus {
    /// String form as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Error => "error",
        }
    }

    /// Parse a stored status value.
    ///
    /// The schema constrains stored values, so an unknown string means the
    /// row was edited outside vellum; it degrades to `Error` rather than
    /// silently reading as activatable.
    pub fn parse(s: &str) -> Self {
        match s {
            "inactive" => Self::Inactive,
            "active" => Self::Active,
            _ => Self::Error,
        }
    }
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An installed plugin record
///
/// Plugins are metadata records describing installed capabilities; vellum
/// does not load executable plugin code. `dependencies` references other
/// plugins by `name`, which allows a dependency declaration to be authored
/// before the referenced plugin is installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plugin {
    pub id: String,
    /// Unique name, used for dependency references
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Free-form version string, compared only for inequality
    pub version: String,
    pub author: String,
    pub category: String,
    pub icon: String,
    pub status: PluginStatus,
    /// True iff `name` carries the reserved `core-` prefix
    pub is_core: bool,
    /// Set only while `status` is `Error`
    pub error_message: Option<String>,
    /// Opaque plugin-defined settings blob
    pub settings: serde_json::Value,
    pub permissions: Vec<String>,
    /// Names of plugins that must be active before this one activates
    pub dependencies: Vec<String>,
    pub download_count: i64,
    pub rating: f64,
    pub installed_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

/// An install request for a new plugin
///
/// `is_core` is never caller-supplied; it is derived from the name prefix.
#[derive(Debug, Clone, Default)]
pub struct NewPlugin {
    /// Explicit id; a UUID is assigned when absent
    pub id: Option<String>,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub category: String,
    pub icon: String,
    pub permissions: Vec<String>,
    pub dependencies: Vec<String>,
    pub settings: serde_json::Value,
}

impl NewPlugin {
    /// Create an install request with the given name and display name
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            version: "0.1.0".to_string(),
            settings: serde_json::Value::Object(serde_json::Map::new()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    /// Whether this plugin's name carries the reserved core prefix
    pub fn is_core(&self) -> bool {
        self.name.starts_with(CORE_PLUGIN_PREFIX)
    }
}

/// Aggregate plugin counts by status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PluginStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub error: u64,
}

/// A named extension point registered by a plugin
///
/// Multiple hooks may share a `hook_name`; dispatch order is ascending
/// `priority` (lower runs earlier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginHook {
    pub id: String,
    pub plugin_id: String,
    pub hook_name: String,
    pub handler_name: String,
    pub priority: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// An HTTP route binding registered by a plugin
///
/// No uniqueness is enforced here; route collisions are the consuming
/// router's problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRoute {
    pub id: String,
    pub plugin_id: String,
    pub path: String,
    pub method: String,
    pub handler_name: String,
    pub middleware: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A single audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub plugin_id: String,
    pub action: String,
    pub user_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Audit action vocabulary written by the lifecycle manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginAction {
    Installed,
    Activated,
    Deactivated,
    Uninstalled,
    Error,
    SettingsUpdated,
}

impl PluginAction {
    /// String form as stored in the activity log
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
            Self::Uninstalled => "uninstalled",
            Self::Error => "error",
            Self::SettingsUpdated => "settings_updated",
        }
    }
}

impl std::fmt::Display for PluginAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [PluginStatus::Inactive, PluginStatus::Active, PluginStatus::Error] {
            assert_eq!(PluginStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn unknown_status_degrades_to_error() {
        assert_eq!(PluginStatus::parse("half-active"), PluginStatus::Error);
    }

    #[test]
    fn is_core_follows_name_prefix() {
        assert!(NewPlugin::new("core-auth", "Authentication").is_core());
        assert!(!NewPlugin::new("starter-faq", "FAQ").is_core());
        // The prefix must be exact; "corelike" is not core
        assert!(!NewPlugin::new("corelike", "Corelike").is_core());
    }

    #[test]
    fn new_plugin_builder() {
        let plugin = NewPlugin::new("starter-faq", "FAQ")
            .with_version("1.2.0")
            .with_dependencies(vec!["core-auth".to_string()])
            .with_settings(serde_json::json!({"perPage": 20}));

        assert_eq!(plugin.version, "1.2.0");
        assert_eq!(plugin.dependencies, vec!["core-auth"]);
        assert_eq!(plugin.settings["perPage"], 20);
        assert!(plugin.id.is_none());
    }

    #[test]
    fn action_strings() {
        assert_eq!(PluginAction::Installed.as_str(), "installed");
        assert_eq!(PluginAction::SettingsUpdated.as_str(), "settings_updated");
    }
}
