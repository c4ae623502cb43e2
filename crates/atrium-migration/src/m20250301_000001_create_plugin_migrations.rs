use sea_orm_migration::prelude::*;

/// Migration 1: Create the per-plugin migration tracking table.
///
/// Plugin-owned tables are NOT created here — each plugin applies its
/// own schema steps through the runtime's migration tracker, which
/// records every applied step in this table.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS plugin_migrations (
                id TEXT PRIMARY KEY,
                plugin_id TEXT NOT NULL,
                version_number INTEGER NOT NULL,
                applied_at TEXT NOT NULL,
                UNIQUE(plugin_id, version_number)
            )",
        )
        .await?;

        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_plugin_migrations_plugin_id
             ON plugin_migrations(plugin_id)",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS plugin_migrations")
            .await?;
        Ok(())
    }
}
