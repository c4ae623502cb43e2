//! Service registry — cross-plugin request/response calls.
//!
//! Handlers are type-erased async closures keyed by
//! `(owner plugin, method)`. Registration is rare and dispatch is
//! frequent; handlers are cloned out of the read lock and invoked
//! outside it, so calls never serialize on each other through the
//! registry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::RuntimeError;

/// Type-erased async service handler.
pub type ServiceHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RuntimeError>> + Send + Sync>;

/// Build a [`ServiceHandler`] from an async closure.
pub fn service_fn<F, Fut>(f: F) -> ServiceHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RuntimeError>> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)))
}

#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<(String, String), ServiceHandler>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the handler for `(plugin, method)`.
    pub async fn provide(&self, plugin: &str, method: &str, handler: ServiceHandler) {
        let key = (plugin.to_string(), method.to_string());
        let replaced = self.services.write().await.insert(key, handler).is_some();
        tracing::debug!(plugin = %plugin, method = %method, replaced, "service registered");
    }

    /// Invoke a service and await its result.
    ///
    /// Missing services fail with `ServiceNotFound`; handler failures
    /// surface as `Service(message)` to the caller. No retries.
    pub async fn call(
        &self,
        target_plugin: &str,
        method: &str,
        payload: Value,
    ) -> Result<Value, RuntimeError> {
        let handler = {
            let services = self.services.read().await;
            services
                .get(&(target_plugin.to_string(), method.to_string()))
                .cloned()
        }
        .ok_or_else(|| RuntimeError::ServiceNotFound {
            plugin: target_plugin.to_string(),
            method: method.to_string(),
        })?;

        handler(payload).await.map_err(|e| match e {
            err @ RuntimeError::Service(_) => err,
            other => RuntimeError::Service(other.to_string()),
        })
    }

    /// Existence check without invocation.
    pub async fn has(&self, target_plugin: &str, method: &str) -> bool {
        self.services
            .read()
            .await
            .contains_key(&(target_plugin.to_string(), method.to_string()))
    }

    /// All registered `(plugin, method)` pairs, sorted.
    pub async fn list(&self) -> Vec<(String, String)> {
        let mut entries: Vec<_> = self.services.read().await.keys().cloned().collect();
        entries.sort();
        entries
    }

    /// Remove every service owned by one plugin. Returns the number of
    /// entries removed.
    pub async fn remove_plugin(&self, plugin: &str) -> usize {
        let mut services = self.services.write().await;
        let before = services.len();
        services.retain(|(owner, _), _| owner != plugin);
        before - services.len()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
