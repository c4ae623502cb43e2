//! Runtime error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    #[error("service not found: {plugin}.{method}")]
    ServiceNotFound { plugin: String, method: String },

    #[error("service error: {0}")]
    Service(String),

    #[error("route not found: {0}")]
    RouteNotFound(String),

    #[error("invalid route pattern: {0}")]
    InvalidRoute(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("plugin already registered: {0}")]
    AlreadyRegistered(String),

    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("semver error: {0}")]
    Semver(#[from] semver::Error),
}

impl RuntimeError {
    /// True for errors a caller should treat as "the target does not
    /// exist" rather than "the operation failed".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RuntimeError::ServiceNotFound { .. }
                | RuntimeError::RouteNotFound(_)
                | RuntimeError::PluginNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Display messages ──────────────────────────────────────────────

    #[test]
    fn test_display_lifecycle() {
        let err = RuntimeError::Lifecycle("init failed".into());
        assert_eq!(err.to_string(), "lifecycle error: init failed");
    }

    #[test]
    fn test_display_service_not_found() {
        let err = RuntimeError::ServiceNotFound {
            plugin: "notes".into(),
            method: "search".into(),
        };
        assert_eq!(err.to_string(), "service not found: notes.search");
    }

    #[test]
    fn test_display_service() {
        let err = RuntimeError::Service("handler panicked".into());
        assert_eq!(err.to_string(), "service error: handler panicked");
    }

    #[test]
    fn test_display_route_not_found() {
        let err = RuntimeError::RouteNotFound("GET /counter/current".into());
        assert_eq!(err.to_string(), "route not found: GET /counter/current");
    }

    #[test]
    fn test_display_migration() {
        let err = RuntimeError::Migration("version 2 failed".into());
        assert_eq!(err.to_string(), "migration error: version 2 failed");
    }

    #[test]
    fn test_display_already_registered() {
        let err = RuntimeError::AlreadyRegistered("counter".into());
        assert_eq!(err.to_string(), "plugin already registered: counter");
    }

    #[test]
    fn test_display_plugin_not_found() {
        let err = RuntimeError::PluginNotFound("counter".into());
        assert_eq!(err.to_string(), "plugin not found: counter");
    }

    // ── From conversions ──────────────────────────────────────────────

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("bad json{{{").unwrap_err();
        let err: RuntimeError = json_err.into();
        assert!(matches!(err, RuntimeError::Serialization(_)));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= bad").unwrap_err();
        let err: RuntimeError = toml_err.into();
        assert!(matches!(err, RuntimeError::TomlParse(_)));
    }

    #[test]
    fn test_from_db_error() {
        let db_err = sea_orm::DbErr::Custom("test db error".into());
        let err: RuntimeError = db_err.into();
        assert!(matches!(err, RuntimeError::Database(_)));
    }

    #[test]
    fn test_from_semver_error() {
        let sv_err = "not.a.version".parse::<semver::Version>().unwrap_err();
        let err: RuntimeError = sv_err.into();
        assert!(matches!(err, RuntimeError::Semver(_)));
    }

    // ── Classification ────────────────────────────────────────────────

    #[test]
    fn test_is_not_found() {
        assert!(RuntimeError::PluginNotFound("x".into()).is_not_found());
        assert!(RuntimeError::RouteNotFound("x".into()).is_not_found());
        assert!(RuntimeError::ServiceNotFound {
            plugin: "a".into(),
            method: "b".into()
        }
        .is_not_found());
        assert!(!RuntimeError::Service("x".into()).is_not_found());
        assert!(!RuntimeError::Lifecycle("x".into()).is_not_found());
    }
}
