//! Plugin context — the capability bundle handed to lifecycle methods.
//!
//! A context is constructed fresh for each plugin for each manager
//! operation. It closes over the plugin's identity, so every
//! registration and event it performs is automatically scoped to the
//! owning plugin.

use std::future::Future;
use std::sync::{Arc, Mutex};

use sea_orm::DatabaseConnection;
use serde_json::Value;
use tokio::task::AbortHandle;

use crate::bus::EventStream;
use crate::error::RuntimeError;
use crate::migrate::{self, SchemaStep};
use crate::routes::PluginRouter;
use crate::runtime::Runtime;
use crate::services::ServiceHandler;

/// Abort handles for a plugin's background tasks, shared between the
/// manager entry and every context built for the plugin.
pub(crate) type TaskSet = Arc<Mutex<Vec<AbortHandle>>>;

pub(crate) fn lock_tasks(tasks: &TaskSet) -> std::sync::MutexGuard<'_, Vec<AbortHandle>> {
    tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct PluginContext {
    plugin_id: String,
    runtime: Arc<Runtime>,
    config: Value,
    tasks: TaskSet,
}

impl PluginContext {
    pub(crate) fn new(
        plugin_id: String,
        runtime: Arc<Runtime>,
        config: Value,
        tasks: TaskSet,
    ) -> Self {
        Self {
            plugin_id,
            runtime,
            config,
            tasks,
        }
    }

    /// The id of the plugin this context belongs to.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    // ── Event bus ────────────────────────────────────────────────────

    /// Publish an event with this plugin stamped as source.
    pub fn emit(&self, event_type: &str, payload: Value) -> usize {
        self.runtime.bus().publish(&self.plugin_id, event_type, payload)
    }

    /// Subscribe to one event type.
    pub fn subscribe(&self, event_type: &str) -> EventStream {
        self.runtime.bus().subscribe(&self.plugin_id, event_type)
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self) -> EventStream {
        self.runtime.bus().subscribe_all(&self.plugin_id)
    }

    // ── Service registry ─────────────────────────────────────────────

    /// Register a service under this plugin's id.
    pub async fn provide_service(&self, method: &str, handler: ServiceHandler) {
        self.runtime
            .services()
            .provide(&self.plugin_id, method, handler)
            .await;
    }

    /// Call another plugin's service.
    pub async fn call_service(
        &self,
        target_plugin: &str,
        method: &str,
        payload: Value,
    ) -> Result<Value, RuntimeError> {
        self.runtime
            .services()
            .call(target_plugin, method, payload)
            .await
    }

    /// Existence check, for optional integrations.
    pub async fn has_service(&self, target_plugin: &str, method: &str) -> bool {
        self.runtime.services().has(target_plugin, method).await
    }

    /// All registered `(plugin, method)` pairs.
    pub async fn list_services(&self) -> Vec<(String, String)> {
        self.runtime.services().list().await
    }

    // ── Route registry ───────────────────────────────────────────────

    /// Register this plugin's routes under its namespace.
    pub async fn register_router(&self, router: PluginRouter) -> Result<usize, RuntimeError> {
        self.runtime.routes().register(&self.plugin_id, router).await
    }

    // ── Store ────────────────────────────────────────────────────────

    /// Apply this plugin's pending schema steps.
    pub async fn migrate(&self, steps: &[SchemaStep]) -> Result<u32, RuntimeError> {
        migrate::apply(self.runtime.db(), &self.plugin_id, steps).await
    }

    /// The shared store handle.
    pub fn db(&self) -> &DatabaseConnection {
        self.runtime.db()
    }

    // ── Config ───────────────────────────────────────────────────────

    /// This plugin's configuration table from the host config file.
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Look up one configuration key.
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// A detached handle scoped to this plugin, for use inside route
    /// handlers and background tasks that outlive the context itself.
    pub fn handle(&self) -> PluginHandle {
        PluginHandle {
            plugin_id: self.plugin_id.clone(),
            runtime: self.runtime.clone(),
        }
    }

    // ── Background tasks ─────────────────────────────────────────────

    /// Spawn background work owned by this plugin.
    ///
    /// The task's abort handle is retained; `stop`, `disable`, and
    /// `reload` abort every retained task, so work started here never
    /// outlives its plugin. This is the only sanctioned way for a
    /// plugin to start background work.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        lock_tasks(&self.tasks).push(handle.abort_handle());
    }
}

// ─── Detached handle ────────────────────────────────────────────────

/// Cloneable, plugin-scoped handle to the shared runtime.
///
/// Contexts are constructed per lifecycle call; closures that live
/// longer (route handlers, spawned tasks) capture one of these
/// instead.
#[derive(Clone)]
pub struct PluginHandle {
    plugin_id: String,
    runtime: Arc<Runtime>,
}

impl PluginHandle {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Publish an event with this plugin stamped as source.
    pub fn emit(&self, event_type: &str, payload: Value) -> usize {
        self.runtime.bus().publish(&self.plugin_id, event_type, payload)
    }

    /// Call another plugin's service.
    pub async fn call_service(
        &self,
        target_plugin: &str,
        method: &str,
        payload: Value,
    ) -> Result<Value, RuntimeError> {
        self.runtime
            .services()
            .call(target_plugin, method, payload)
            .await
    }

    /// Existence check, for optional integrations.
    pub async fn has_service(&self, target_plugin: &str, method: &str) -> bool {
        self.runtime.services().has(target_plugin, method).await
    }

    /// The shared store handle.
    pub fn db(&self) -> &DatabaseConnection {
        self.runtime.db()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
