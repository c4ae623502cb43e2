//! The shared runtime — one owned object holding every registry.
//!
//! Passed by `Arc` into each plugin context. There is no module-level
//! global state; anything a plugin can reach goes through here.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::bus::EventBus;
use crate::config::HostConfig;
use crate::routes::RouteRegistry;
use crate::services::ServiceRegistry;

pub struct Runtime {
    bus: EventBus,
    services: ServiceRegistry,
    routes: RouteRegistry,
    db: DatabaseConnection,
    config: HostConfig,
}

impl Runtime {
    pub fn new(db: DatabaseConnection, config: HostConfig) -> Arc<Self> {
        Arc::new(Self {
            bus: EventBus::new(config.event_capacity),
            services: ServiceRegistry::new(),
            routes: RouteRegistry::new(),
            db,
            config,
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Remove every registration owned by one plugin from every
    /// registry. The cleanup path behind `disable` and `reload`: after
    /// this returns, no dangling service, route, or subscription entry
    /// for the plugin remains.
    pub async fn remove_plugin(&self, plugin_id: &str) {
        let services = self.services.remove_plugin(plugin_id).await;
        let routes = self.routes.remove_namespace(plugin_id).await;
        let subscriptions = self.bus.remove_plugin(plugin_id);
        tracing::debug!(
            plugin = %plugin_id,
            services,
            routes,
            subscriptions,
            "plugin registrations removed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{route_fn, HttpMethod, PluginRouter};
    use crate::services::service_fn;
    use atrium_migration::{Migrator, MigratorTrait};
    use sea_orm::{ConnectOptions, Database};
    use serde_json::json;

    async fn test_runtime() -> Arc<Runtime> {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1);
        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        Runtime::new(db, HostConfig::default())
    }

    #[tokio::test]
    async fn test_remove_plugin_clears_every_registry() {
        let runtime = test_runtime().await;

        runtime
            .services()
            .provide("doomed", "ping", service_fn(|_| async { Ok(json!("pong")) }))
            .await;
        runtime
            .routes()
            .register(
                "doomed",
                PluginRouter::new().route(
                    HttpMethod::Get,
                    "/x",
                    route_fn(|_| async { Ok(json!(null)) }),
                ),
            )
            .await
            .unwrap();
        let _stream = runtime.bus().subscribe("doomed", "tick");

        runtime.remove_plugin("doomed").await;

        assert!(runtime.services().list().await.is_empty());
        assert!(runtime.routes().routes_for("doomed").await.is_empty());
        assert!(runtime.bus().subscriptions_for("doomed").is_empty());
    }
}
