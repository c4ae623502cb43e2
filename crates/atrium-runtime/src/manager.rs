//! Plugin manager — lifecycle orchestration.
//!
//! The manager owns every plugin's state and drives the lifecycle
//! batches. One plugin's failure is recorded against that plugin and
//! never aborts the batch; teardown paths always remove the plugin's
//! registrations from every registry before marking it disabled, so
//! nothing dangles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::context::{lock_tasks, PluginContext, TaskSet};
use crate::descriptor::PluginDescriptor;
use crate::error::RuntimeError;
use crate::runtime::Runtime;

// ─── Lifecycle state ────────────────────────────────────────────────

/// Lifecycle state of one plugin. Owned exclusively by the manager;
/// transitions are one-directional except for `reload`, which resets a
/// plugin back to `Discovered`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginState {
    Discovered,
    Loading,
    Loaded,
    Initializing,
    Initialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    Disabled,
    Error(String),
}

impl PluginState {
    pub fn name(&self) -> &'static str {
        match self {
            PluginState::Discovered => "discovered",
            PluginState::Loading => "loading",
            PluginState::Loaded => "loaded",
            PluginState::Initializing => "initializing",
            PluginState::Initialized => "initialized",
            PluginState::Starting => "starting",
            PluginState::Running => "running",
            PluginState::Stopping => "stopping",
            PluginState::Stopped => "stopped",
            PluginState::Disabled => "disabled",
            PluginState::Error(_) => "error",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            PluginState::Error(message) => Some(message),
            _ => None,
        }
    }
}

// ─── Plugin trait ───────────────────────────────────────────────────

/// The lifecycle contract every plugin implements.
///
/// Implementations arrive as `Arc<dyn Plugin>` at registration time;
/// how they were compiled and resolved is the embedder's concern.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Register migrations, services, and routes. Called once per
    /// lifecycle; a failure marks the plugin `Error` and removes any
    /// registrations it made before failing.
    async fn init(&self, ctx: &PluginContext) -> Result<(), RuntimeError>;

    /// Open resources and spawn background work (through
    /// [`PluginContext::spawn`]). Only ever called from `Initialized`.
    async fn start(&self, _ctx: &PluginContext) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Release resources. Retained background tasks are aborted by the
    /// manager after this returns.
    async fn stop(&self, _ctx: &PluginContext) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Final teardown after `stop`, for resources that outlive the
    /// running phase (file handles, caches). Called once, at host
    /// shutdown.
    async fn dispose(&self, _ctx: &PluginContext) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// Introspection snapshot of one plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginStatus {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: Option<String>,
    pub dependencies: Vec<String>,
    pub priority: i32,
    pub state: String,
    pub error: Option<String>,
}

// ─── Manager ────────────────────────────────────────────────────────

struct PluginEntry {
    descriptor: PluginDescriptor,
    implementation: Arc<dyn Plugin>,
    state: PluginState,
    tasks: TaskSet,
}

impl PluginEntry {
    fn status(&self) -> PluginStatus {
        PluginStatus {
            id: self.descriptor.id.clone(),
            name: self.descriptor.name.clone(),
            version: self.descriptor.version.clone(),
            description: self.descriptor.description.clone(),
            author: self.descriptor.author.clone(),
            dependencies: self.descriptor.dependencies.clone(),
            priority: self.descriptor.priority,
            state: self.state.name().to_string(),
            error: self.state.error_message().map(|m| m.to_string()),
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, PluginEntry>,
    /// Registration order; batch order is derived from priorities.
    order: Vec<String>,
}

pub struct PluginManager {
    runtime: Arc<Runtime>,
    inner: RwLock<Inner>,
}

impl PluginManager {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Add a plugin to the known set in state `Discovered`.
    pub async fn register(
        &self,
        descriptor: PluginDescriptor,
        implementation: Arc<dyn Plugin>,
    ) -> Result<(), RuntimeError> {
        descriptor.validate()?;

        let mut inner = self.inner.write().await;
        if inner.entries.contains_key(&descriptor.id) {
            return Err(RuntimeError::AlreadyRegistered(descriptor.id.clone()));
        }

        let id = descriptor.id.clone();
        tracing::info!(plugin = %id, version = %descriptor.version, "plugin registered");
        inner.entries.insert(
            id.clone(),
            PluginEntry {
                descriptor,
                implementation,
                state: PluginState::Discovered,
                tasks: Arc::new(Mutex::new(Vec::new())),
            },
        );
        inner.order.push(id);
        Ok(())
    }

    /// Registered ids in batch order: descending priority, registration
    /// order within a priority.
    fn priority_order(inner: &Inner) -> Vec<String> {
        let mut ids = inner.order.clone();
        ids.sort_by_key(|id| {
            let priority = inner
                .entries
                .get(id)
                .map(|e| e.descriptor.priority)
                .unwrap_or(0);
            std::cmp::Reverse(priority)
        });
        ids
    }

    fn context_for(&self, entry: &PluginEntry) -> PluginContext {
        PluginContext::new(
            entry.descriptor.id.clone(),
            self.runtime.clone(),
            self.runtime.config().plugin_config(&entry.descriptor.id),
            entry.tasks.clone(),
        )
    }

    // ── Batch operations ─────────────────────────────────────────────

    /// Initialize every `Discovered` plugin in priority order.
    /// Failures are recorded per plugin; the batch always continues.
    pub async fn init_all(&self) {
        let ids = {
            let inner = self.inner.read().await;
            Self::priority_order(&inner)
        };
        for id in ids {
            if self.state_of(&id).await == Some(PluginState::Discovered) {
                let _ = self.init_one(&id).await;
            }
        }
    }

    /// Start every `Initialized` plugin in priority order.
    pub async fn start_all(&self) {
        let ids = {
            let inner = self.inner.read().await;
            Self::priority_order(&inner)
        };
        for id in ids {
            if self.state_of(&id).await == Some(PluginState::Initialized) {
                let _ = self.start_one(&id).await;
            }
        }
    }

    /// Stop every `Running` plugin in reverse priority order.
    /// Best-effort: every plugin is attempted regardless of earlier
    /// failures.
    pub async fn stop_all(&self) {
        let mut ids = {
            let inner = self.inner.read().await;
            Self::priority_order(&inner)
        };
        ids.reverse();
        for id in ids {
            self.stop_one(&id).await;
        }
    }

    /// Stop everything still running, then invoke `dispose` on every
    /// plugin in reverse priority order. Best-effort: failures are
    /// logged and the remaining plugins are still attempted.
    pub async fn dispose_all(&self) {
        self.stop_all().await;

        let mut ids = {
            let inner = self.inner.read().await;
            Self::priority_order(&inner)
        };
        ids.reverse();
        for id in ids {
            let work = {
                let inner = self.inner.read().await;
                inner
                    .entries
                    .get(&id)
                    .map(|entry| (entry.implementation.clone(), self.context_for(entry)))
            };
            if let Some((implementation, ctx)) = work {
                if let Err(e) = implementation.dispose(&ctx).await {
                    tracing::error!(plugin = %id, "dispose failed: {e}");
                }
            }
        }
    }

    // ── Single-plugin transitions ────────────────────────────────────

    async fn init_one(&self, id: &str) -> Result<(), RuntimeError> {
        let (implementation, ctx) = {
            let mut inner = self.inner.write().await;
            let entry = inner
                .entries
                .get_mut(id)
                .ok_or_else(|| RuntimeError::PluginNotFound(id.to_string()))?;
            if entry.state != PluginState::Discovered {
                return Err(RuntimeError::Lifecycle(format!(
                    "plugin '{id}' cannot init from state '{}'",
                    entry.state.name()
                )));
            }
            // Module resolution is external and already done by
            // registration time, so Loading and Loaded pass through.
            entry.state = PluginState::Loading;
            entry.state = PluginState::Loaded;
            entry.state = PluginState::Initializing;
            (entry.implementation.clone(), self.context_for(entry))
        };

        match implementation.init(&ctx).await {
            Ok(()) => {
                self.set_state(id, PluginState::Initialized).await;
                tracing::info!(plugin = %id, "plugin initialized");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(plugin = %id, "init failed: {message}");
                // Remove whatever the failed init managed to register.
                self.abort_tasks(id).await;
                self.runtime.remove_plugin(id).await;
                self.set_state(id, PluginState::Error(message.clone())).await;
                Err(RuntimeError::Lifecycle(message))
            }
        }
    }

    async fn start_one(&self, id: &str) -> Result<(), RuntimeError> {
        let (implementation, ctx) = {
            let mut inner = self.inner.write().await;
            let entry = inner
                .entries
                .get_mut(id)
                .ok_or_else(|| RuntimeError::PluginNotFound(id.to_string()))?;
            // start() is never invoked unless the plugin is Initialized
            if entry.state != PluginState::Initialized {
                return Err(RuntimeError::Lifecycle(format!(
                    "plugin '{id}' cannot start from state '{}'",
                    entry.state.name()
                )));
            }
            entry.state = PluginState::Starting;
            (entry.implementation.clone(), self.context_for(entry))
        };

        match implementation.start(&ctx).await {
            Ok(()) => {
                self.set_state(id, PluginState::Running).await;
                tracing::info!(plugin = %id, "plugin running");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(plugin = %id, "start failed: {message}");
                self.abort_tasks(id).await;
                self.runtime.remove_plugin(id).await;
                self.set_state(id, PluginState::Error(message.clone())).await;
                Err(RuntimeError::Lifecycle(message))
            }
        }
    }

    async fn stop_one(&self, id: &str) {
        let work = {
            let mut inner = self.inner.write().await;
            match inner.entries.get_mut(id) {
                Some(entry) if entry.state == PluginState::Running => {
                    entry.state = PluginState::Stopping;
                    Some((entry.implementation.clone(), self.context_for(entry)))
                }
                _ => None,
            }
        };
        let Some((implementation, ctx)) = work else {
            return;
        };

        let result = implementation.stop(&ctx).await;
        self.abort_tasks(id).await;

        match result {
            Ok(()) => {
                self.set_state(id, PluginState::Stopped).await;
                tracing::info!(plugin = %id, "plugin stopped");
            }
            Err(e) => {
                tracing::error!(plugin = %id, "stop failed: {e}");
                self.set_state(id, PluginState::Error(format!("stop failed: {e}")))
                    .await;
            }
        }
    }

    // ── Disable / reload / remove ────────────────────────────────────

    /// Disable a plugin: stop it if running, abort its background
    /// tasks, and remove every registration it owns from every
    /// registry. After this returns, no service, route, or subscription
    /// entry for the plugin remains.
    pub async fn disable(&self, id: &str) -> Result<(), RuntimeError> {
        self.teardown(id).await?;
        self.set_state(id, PluginState::Disabled).await;
        tracing::info!(plugin = %id, "plugin disabled");
        Ok(())
    }

    /// Reload a plugin: tear down, reset to `Discovered`, then init and
    /// start again. Old registrations are removed before the new ones
    /// are installed, so a failed reload leaves the plugin absent from
    /// the registries rather than duplicated.
    pub async fn reload(&self, id: &str) -> Result<(), RuntimeError> {
        self.teardown(id).await?;
        self.set_state(id, PluginState::Discovered).await;
        tracing::info!(plugin = %id, "plugin reloading");
        self.init_one(id).await?;
        self.start_one(id).await?;
        Ok(())
    }

    /// Remove a plugin from the known set entirely (teardown included).
    pub async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        self.teardown(id).await?;
        let mut inner = self.inner.write().await;
        inner.entries.remove(id);
        inner.order.retain(|existing| existing != id);
        tracing::info!(plugin = %id, "plugin removed");
        Ok(())
    }

    /// Stop (best-effort), abort tasks, and clear registrations.
    async fn teardown(&self, id: &str) -> Result<(), RuntimeError> {
        let work = {
            let mut inner = self.inner.write().await;
            let entry = inner
                .entries
                .get_mut(id)
                .ok_or_else(|| RuntimeError::PluginNotFound(id.to_string()))?;
            if entry.state == PluginState::Running {
                entry.state = PluginState::Stopping;
                Some((entry.implementation.clone(), self.context_for(entry)))
            } else {
                None
            }
        };

        if let Some((implementation, ctx)) = work {
            if let Err(e) = implementation.stop(&ctx).await {
                tracing::warn!(plugin = %id, "stop during teardown failed: {e}");
            }
        }

        self.abort_tasks(id).await;
        self.runtime.remove_plugin(id).await;
        Ok(())
    }

    async fn abort_tasks(&self, id: &str) {
        let tasks = {
            let inner = self.inner.read().await;
            inner.entries.get(id).map(|e| e.tasks.clone())
        };
        if let Some(tasks) = tasks {
            let mut handles = lock_tasks(&tasks);
            let count = handles.len();
            for handle in handles.drain(..) {
                handle.abort();
            }
            if count > 0 {
                tracing::debug!(plugin = %id, tasks = count, "background tasks aborted");
            }
        }
    }

    async fn set_state(&self, id: &str, state: PluginState) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get_mut(id) {
            entry.state = state;
        }
    }

    // ── Introspection ────────────────────────────────────────────────

    /// Snapshot of every known plugin, in registration order. Errored
    /// plugins stay listed with their recorded message.
    pub async fn list(&self) -> Vec<PluginStatus> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .map(PluginEntry::status)
            .collect()
    }

    pub async fn state_of(&self, id: &str) -> Option<PluginState> {
        let inner = self.inner.read().await;
        inner.entries.get(id).map(|e| e.state.clone())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
