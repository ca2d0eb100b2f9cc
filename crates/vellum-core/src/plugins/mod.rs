//! Plugin registry and lifecycle management
//!
//! Plugins in vellum are metadata records describing installed
//! capabilities; no executable plugin code is loaded. The subsystem splits
//! into:
//!
//! - `registry`: CRUD and query operations over plugin records
//! - `lifecycle`: the activation state machine with dependency validation
//! - `extensions`: per-plugin hook and route registrations
//! - `activity`: the append-only audit trail
//! - `bootstrap`: idempotent reconciliation of the built-in manifest
//! - `service`: the facade the rest of the application talks to

pub mod activity;
pub mod bootstrap;
pub mod extensions;
pub mod lifecycle;
pub mod registry;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use activity::ActivityLog;
pub use bootstrap::{BootstrapReconciler, BootstrapReport, Manifest, ManifestEntry};
pub use extensions::ExtensionRegistry;
pub use lifecycle::LifecycleManager;
pub use registry::PluginRegistry;
pub use service::PluginService;
pub use types::{
    ActivityEntry, NewPlugin, Plugin, PluginAction, PluginHook, PluginRoute, PluginStats,
    PluginStatus, CORE_AUTH_PLUGIN, CORE_PLUGIN_PREFIX, DEFAULT_HOOK_PRIORITY,
};
