//! Error types for Vellum

use thiserror::Error;

/// Result type alias using Vellum's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Vellum error types with helpful messages
#[derive(Error, Debug)]
pub enum Error {
    // Plugin errors (E100-E199)
    #[error("Plugin '{0}' not found. Run `vellum plugins list` to see installed plugins.")]
    PluginNotFound(String),

    #[error("Cannot activate '{plugin}': dependency '{dependency}' is not active")]
    DependencyUnmet { plugin: String, dependency: String },

    #[error("Cannot deactivate '{plugin}': required by active plugins: {}", .dependents.join(", "))]
    DependentsActive {
        plugin: String,
        dependents: Vec<String>,
    },

    #[error("Plugin '{0}' is a core plugin and cannot be uninstalled")]
    CoreProtected(String),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp in stored row: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::PluginNotFound(_) => "E100",
            Self::DependencyUnmet { .. } => "E110",
            Self::DependentsActive { .. } => "E111",
            Self::CoreProtected(_) => "E112",
            Self::Database(_) => "E400",
            Self::Serialization(_) => "E401",
            Self::InvalidTimestamp(_) => "E402",
            Self::Config(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to resolve this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::PluginNotFound(_) => Some("vellum plugins list".to_string()),
            Self::DependencyUnmet { dependency, .. } => {
                Some(format!("vellum plugins activate {}", dependency))
            }
            Self::DependentsActive { dependents, .. } => dependents
                .first()
                .map(|d| format!("vellum plugins deactivate {}", d)),
            _ => None,
        }
    }
}
