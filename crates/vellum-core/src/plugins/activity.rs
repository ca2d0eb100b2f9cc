//! Append-only audit trail for plugin lifecycle actions
//!
//! Entries are never updated or deleted; they outlive the plugin they
//! describe, which is why `plugin_activity_log` carries no foreign key.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::warn;

use crate::error::Result;

use super::types::{ActivityEntry, PluginAction};

/// Writer and reader for the plugin activity log
#[derive(Debug, Clone)]
pub struct ActivityLog {
    pool: SqlitePool,
}

impl ActivityLog {
    /// Create a new activity log handle with the given database pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a single audit entry
    pub async fn record(
        &self,
        plugin_id: &str,
        action: PluginAction,
        user_id: Option<&str>,
        details: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_entry(&mut conn, plugin_id, action, user_id, details.as_ref()).await
    }

    /// Append an audit entry without failing the calling operation.
    ///
    /// A lost audit entry must not roll back the lifecycle change that
    /// triggered it; storage failures are logged and swallowed here.
    pub async fn record_best_effort(
        &self,
        plugin_id: &str,
        action: PluginAction,
        user_id: Option<&str>,
        details: Option<serde_json::Value>,
    ) {
        if let Err(e) = self.record(plugin_id, action, user_id, details).await {
            warn!(
                plugin_id = %plugin_id,
                action = %action,
                error = %e,
                "Failed to write activity log entry"
            );
        }
    }

    /// Most recent entries for a plugin, newest first
    pub async fn recent(&self, plugin_id: &str, limit: u32) -> Result<Vec<ActivityEntry>> {
        let rows: Vec<ActivityRow> = sqlx::query_as(
            r#"
            SELECT * FROM plugin_activity_log
            WHERE plugin_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(plugin_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_entry()).collect()
    }
}

/// Append an audit entry on an open connection.
///
/// Used by the lifecycle manager inside its transactions so a status change
/// and its audit entry commit atomically.
pub(crate) async fn insert_entry(
    conn: &mut SqliteConnection,
    plugin_id: &str,
    action: PluginAction,
    user_id: Option<&str>,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let details_json = details.map(serde_json::to_string).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO plugin_activity_log (id, plugin_id, action, user_id, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(plugin_id)
    .bind(action.as_str())
    .bind(user_id)
    .bind(details_json)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Raw activity log row as stored in SQLite
#[derive(Debug, FromRow)]
struct ActivityRow {
    id: String,
    plugin_id: String,
    action: String,
    user_id: Option<String>,
    details: Option<String>,
    created_at: String,
}

impl ActivityRow {
    fn into_entry(self) -> Result<ActivityEntry> {
        let details = self
            .details
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(ActivityEntry {
            id: self.id,
            plugin_id: self.plugin_id,
            action: self.action,
            user_id: self.user_id,
            details,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Parse an RFC 3339 timestamp stored as text
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
