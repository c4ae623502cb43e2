//! Per-plugin schema migration tracker.
//!
//! Plugins evolve their own tables by handing the runtime an ordered
//! list of schema steps at `init` time. Each step runs in the same
//! transaction as its tracking-record insert, so a crash can never
//! leave a step applied but unrecorded (or vice versa). Steps whose
//! version is already recorded are skipped, which makes a
//! prefix-stable list idempotent across restarts.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use atrium_db::entities::plugin_migration;

use crate::error::RuntimeError;

/// One ordered schema-evolution step for a plugin.
#[derive(Debug, Clone)]
pub struct SchemaStep {
    /// Strictly ascending, starting at 1.
    pub version: i64,
    pub sql: String,
}

impl SchemaStep {
    pub fn new(version: i64, sql: impl Into<String>) -> Self {
        Self {
            version,
            sql: sql.into(),
        }
    }
}

/// Versions already recorded as applied for a plugin, ascending.
pub async fn applied_versions(
    db: &DatabaseConnection,
    plugin_id: &str,
) -> Result<Vec<i64>, RuntimeError> {
    let rows = plugin_migration::Entity::find()
        .filter(plugin_migration::Column::PluginId.eq(plugin_id))
        .order_by_asc(plugin_migration::Column::VersionNumber)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|r| r.version_number).collect())
}

async fn latest_version(db: &DatabaseConnection, plugin_id: &str) -> Result<i64, RuntimeError> {
    let row = plugin_migration::Entity::find()
        .filter(plugin_migration::Column::PluginId.eq(plugin_id))
        .order_by_desc(plugin_migration::Column::VersionNumber)
        .one(db)
        .await?;
    Ok(row.map(|r| r.version_number).unwrap_or(0))
}

/// Apply a plugin's pending schema steps.
///
/// Steps at or below the highest recorded version are skipped; each
/// remaining step and its tracking record commit together. Returns the
/// number of steps applied.
pub async fn apply(
    db: &DatabaseConnection,
    plugin_id: &str,
    steps: &[SchemaStep],
) -> Result<u32, RuntimeError> {
    if let Some(first) = steps.first() {
        if first.version < 1 {
            return Err(RuntimeError::Migration(format!(
                "plugin '{plugin_id}': versions start at 1, got {}",
                first.version
            )));
        }
    }
    for pair in steps.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(RuntimeError::Migration(format!(
                "plugin '{plugin_id}': versions must be strictly ascending ({} then {})",
                pair[0].version, pair[1].version
            )));
        }
    }

    let current = latest_version(db, plugin_id).await?;
    let mut applied = 0u32;

    for step in steps.iter().filter(|s| s.version > current) {
        let txn = db.begin().await?;
        txn.execute_unprepared(&step.sql).await.map_err(|e| {
            RuntimeError::Migration(format!(
                "plugin '{plugin_id}' version {}: {e}",
                step.version
            ))
        })?;

        let record = plugin_migration::ActiveModel {
            id: Set(Uuid::new_v4()),
            plugin_id: Set(plugin_id.to_string()),
            version_number: Set(step.version),
            applied_at: Set(Utc::now().fixed_offset()),
        };
        record.insert(&txn).await?;
        txn.commit().await?;

        applied += 1;
        tracing::info!(plugin = %plugin_id, version = step.version, "schema migration applied");
    }

    Ok(applied)
}

// ─── Tests ──────────────────────────────────────────────────────────
