use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::env;
use std::time::Duration;

pub mod entities;

/// Re-export for convenience
pub use sea_orm;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://atrium.db?mode=rwc".to_string());

        Self {
            url,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16),
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            connect_timeout_secs: env::var("DB_CONNECT_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            idle_timeout_secs: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }
}

/// Connect to the embedded database and return a connection pool.
///
/// SQLite serializes writers internally; the pool mostly serves
/// concurrent readers and keeps a warm connection for the runtime.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(&config.url);
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    Database::connect(opt).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        // from_env falls back to defaults when vars are unset
        let config = DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 16,
            min_connections: 1,
            connect_timeout_secs: 8,
            idle_timeout_secs: 300,
        };
        assert_eq!(config.max_connections, 16);
        assert!(config.url.starts_with("sqlite:"));
    }

    #[tokio::test]
    async fn test_connect_in_memory() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 4,
            min_connections: 1,
            connect_timeout_secs: 8,
            idle_timeout_secs: 300,
        };
        let db = connect(&config).await.unwrap();
        assert!(db.ping().await.is_ok());
    }
}
