pub mod plugin_migration;
