//! Database migrations
//!
//! This module manages SQLite schema migrations for vellum.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Plugin registry schema
///
/// The hook, route, and activity tables deliberately carry no foreign key to
/// plugins: activity entries outlive the plugin they describe, and hook/route
/// rows are not cascaded on uninstall.
const MIGRATION_V1: &str = r#"
    -- Installed plugins
    CREATE TABLE IF NOT EXISTS plugins (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        version TEXT NOT NULL DEFAULT '0.1.0',
        author TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL DEFAULT '',
        icon TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'inactive' CHECK (status IN ('inactive', 'active', 'error')),
        is_core INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        settings TEXT NOT NULL DEFAULT '{}',
        permissions TEXT NOT NULL DEFAULT '[]',
        dependencies TEXT NOT NULL DEFAULT '[]',
        download_count INTEGER NOT NULL DEFAULT 0,
        rating REAL NOT NULL DEFAULT 0.0,
        installed_at TIMESTAMP NOT NULL,
        activated_at TIMESTAMP,
        last_updated TIMESTAMP NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_plugins_name ON plugins(name);
    CREATE INDEX IF NOT EXISTS idx_plugins_status ON plugins(status);

    -- Named extension points registered by plugins
    CREATE TABLE IF NOT EXISTS plugin_hooks (
        id TEXT PRIMARY KEY NOT NULL,
        plugin_id TEXT NOT NULL,
        hook_name TEXT NOT NULL,
        handler_name TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 10,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_plugin_hooks_plugin_id ON plugin_hooks(plugin_id);
    CREATE INDEX IF NOT EXISTS idx_plugin_hooks_hook_name ON plugin_hooks(hook_name);

    -- HTTP route bindings registered by plugins
    CREATE TABLE IF NOT EXISTS plugin_routes (
        id TEXT PRIMARY KEY NOT NULL,
        plugin_id TEXT NOT NULL,
        path TEXT NOT NULL,
        method TEXT NOT NULL,
        handler_name TEXT NOT NULL,
        middleware TEXT NOT NULL DEFAULT '[]',
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_plugin_routes_plugin_id ON plugin_routes(plugin_id);

    -- Append-only audit trail of lifecycle actions
    CREATE TABLE IF NOT EXISTS plugin_activity_log (
        id TEXT PRIMARY KEY NOT NULL,
        plugin_id TEXT NOT NULL,
        action TEXT NOT NULL,
        user_id TEXT,
        details TEXT,
        created_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_plugin_activity_log_plugin_id ON plugin_activity_log(plugin_id);
    CREATE INDEX IF NOT EXISTS idx_plugin_activity_log_created_at ON plugin_activity_log(created_at);
"#;

/// Migration 2: Activity log action index
///
/// The admin activity pane filters by action; the bootstrap idempotence
/// check counts `installed` entries.
const MIGRATION_V2: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_plugin_activity_log_action ON plugin_activity_log(action);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    // Ensure migrations table exists
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    // Get the latest version
    let row: Option<(i32,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    // Apply migrations in order
    if current_version < 1 {
        tracing::info!("Applying migration v1: Plugin registry schema");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Activity log action index");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check if the database needs migrations
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    let current_version = get_current_version(pool).await?;
    Ok(current_version < CURRENT_VERSION)
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        // Should start with no migrations
        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);

        // Run migrations
        run_migrations(&pool).await.unwrap();

        // Should be at current version
        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
        assert!(!status.needs_migration);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        // Run migrations twice
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        // Should still be at current version
        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        let tables = vec![
            "plugins",
            "plugin_hooks",
            "plugin_routes",
            "plugin_activity_log",
        ];

        for table in tables {
            let result: (i32,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|_| panic!("Table {} should exist", table));
            assert_eq!(result.0, 0, "Table {} should be empty", table);
        }
    }

    #[tokio::test]
    async fn test_status_check_constraint() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO plugins (id, name, display_name, installed_at, last_updated, status)
             VALUES ('x', 'x', 'X', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z', 'bogus')",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err(), "CHECK constraint should reject unknown status");
    }

    #[tokio::test]
    async fn test_plugin_name_unique() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO plugins (id, name, display_name, installed_at, last_updated)
             VALUES ('a', 'dup', 'A', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = sqlx::query(
            "INSERT INTO plugins (id, name, display_name, installed_at, last_updated)
             VALUES ('b', 'dup', 'B', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err(), "Duplicate plugin names should be rejected");
    }
}
