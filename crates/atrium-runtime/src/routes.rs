//! Route registry — the aggregated HTTP routing table.
//!
//! Each plugin contributes routes through a [`PluginRouter`]; the
//! registry stores them under the plugin's namespace so `counter`'s
//! `/current` is reachable at `/counter/current` and two plugins can
//! both register `/data` without colliding. A plugin's route set is
//! replaced and removed atomically — a concurrent dispatch sees either
//! the old set or the new one, never a mix.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            other => Err(RuntimeError::RouteNotFound(format!(
                "unsupported HTTP method: {other}"
            ))),
        }
    }
}

/// Request data handed to a route handler by the bridge.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    /// Values captured by `:name` pattern segments.
    pub params: HashMap<String, String>,
    /// Decoded query string pairs.
    pub query: HashMap<String, String>,
    /// Parsed JSON request body; `Null` when the body was empty.
    pub body: Value,
}

/// Type-erased async route handler.
pub type RouteHandler =
    Arc<dyn Fn(RouteRequest) -> BoxFuture<'static, Result<Value, RuntimeError>> + Send + Sync>;

/// Build a [`RouteHandler`] from an async closure.
pub fn route_fn<F, Fut>(f: F) -> RouteHandler
where
    F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RuntimeError>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

// ─── Plugin-side route collection ───────────────────────────────────

/// Routes one plugin contributes, collected before registration.
#[derive(Default)]
pub struct PluginRouter {
    routes: Vec<(HttpMethod, String, RouteHandler)>,
}

impl PluginRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. `pattern` starts with `/` and may contain `:name`
    /// parameter segments.
    pub fn route(mut self, method: HttpMethod, pattern: &str, handler: RouteHandler) -> Self {
        self.routes.push((method, pattern.to_string(), handler));
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

// ─── Pattern compilation and matching ───────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

fn compile(pattern: &str) -> Result<Vec<Segment>, RuntimeError> {
    if !pattern.starts_with('/') {
        return Err(RuntimeError::InvalidRoute(format!(
            "pattern must start with '/': '{pattern}'"
        )));
    }
    if pattern == "/" {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    for raw in pattern[1..].split('/') {
        if raw.is_empty() {
            return Err(RuntimeError::InvalidRoute(format!(
                "pattern contains an empty segment: '{pattern}'"
            )));
        }
        if let Some(name) = raw.strip_prefix(':') {
            if name.is_empty() {
                return Err(RuntimeError::InvalidRoute(format!(
                    "parameter segment has no name: '{pattern}'"
                )));
            }
            segments.push(Segment::Param(name.to_string()));
        } else {
            segments.push(Segment::Static(raw.to_string()));
        }
    }
    Ok(segments)
}

/// Match path segments left-to-right: static segments must match
/// exactly, a param segment matches any single segment and captures it.
fn match_segments(segments: &[Segment], path: &[&str]) -> Option<HashMap<String, String>> {
    if segments.len() != path.len() {
        return None;
    }
    let mut params = HashMap::new();
    for (segment, actual) in segments.iter().zip(path) {
        match segment {
            Segment::Static(expected) => {
                if expected != actual {
                    return None;
                }
            }
            Segment::Param(name) => {
                params.insert(name.clone(), (*actual).to_string());
            }
        }
    }
    Some(params)
}

struct CompiledRoute {
    method: HttpMethod,
    pattern: String,
    segments: Vec<Segment>,
    handler: RouteHandler,
}

/// A successful dispatch: the handler plus its captured parameters.
pub struct RouteMatch {
    pub handler: RouteHandler,
    pub params: HashMap<String, String>,
    pub namespace: String,
    pub pattern: String,
}

impl std::fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatch")
            .field("handler", &"<handler>")
            .field("params", &self.params)
            .field("namespace", &self.namespace)
            .field("pattern", &self.pattern)
            .finish()
    }
}

// ─── Registry ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct RouteRegistry {
    namespaces: RwLock<HashMap<String, Vec<CompiledRoute>>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin's routes under its namespace, replacing any
    /// prior set for that namespace in one step. Returns the number of
    /// routes registered.
    pub async fn register(
        &self,
        namespace: &str,
        router: PluginRouter,
    ) -> Result<usize, RuntimeError> {
        let mut compiled = Vec::with_capacity(router.routes.len());
        for (method, pattern, handler) in router.routes {
            let segments = compile(&pattern)?;
            if compiled
                .iter()
                .any(|r: &CompiledRoute| r.method == method && r.pattern == pattern)
            {
                return Err(RuntimeError::InvalidRoute(format!(
                    "duplicate route {method} {pattern} in namespace '{namespace}'"
                )));
            }
            compiled.push(CompiledRoute {
                method,
                pattern,
                segments,
                handler,
            });
        }

        let count = compiled.len();
        self.namespaces
            .write()
            .await
            .insert(namespace.to_string(), compiled);
        tracing::debug!(namespace = %namespace, routes = count, "routes registered");
        Ok(count)
    }

    /// Remove every route under a namespace in one atomic step.
    /// Returns the number of routes removed.
    pub async fn remove_namespace(&self, namespace: &str) -> usize {
        self.namespaces
            .write()
            .await
            .remove(namespace)
            .map(|routes| routes.len())
            .unwrap_or(0)
    }

    /// Resolve a request path. The first path segment selects the
    /// namespace; the remainder is matched against that plugin's
    /// patterns.
    pub async fn dispatch(&self, method: HttpMethod, path: &str) -> Result<RouteMatch, RuntimeError> {
        let not_found = || RuntimeError::RouteNotFound(format!("{method} {path}"));

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (namespace, rest) = segments.split_first().ok_or_else(|| not_found())?;

        let namespaces = self.namespaces.read().await;
        let routes = namespaces.get(*namespace).ok_or_else(|| not_found())?;

        for route in routes {
            if route.method != method {
                continue;
            }
            if let Some(params) = match_segments(&route.segments, rest) {
                return Ok(RouteMatch {
                    handler: route.handler.clone(),
                    params,
                    namespace: (*namespace).to_string(),
                    pattern: route.pattern.clone(),
                });
            }
        }
        Err(not_found())
    }

    /// All registered routes as `(namespace, method, pattern)`, sorted.
    pub async fn list(&self) -> Vec<(String, HttpMethod, String)> {
        let namespaces = self.namespaces.read().await;
        let mut entries: Vec<_> = namespaces
            .iter()
            .flat_map(|(ns, routes)| {
                routes
                    .iter()
                    .map(|r| (ns.clone(), r.method, r.pattern.clone()))
            })
            .collect();
        entries.sort_by(|a, b| (&a.0, a.1.as_str(), &a.2).cmp(&(&b.0, b.1.as_str(), &b.2)));
        entries
    }

    /// Routes registered under one namespace.
    pub async fn routes_for(&self, namespace: &str) -> Vec<(HttpMethod, String)> {
        self.namespaces
            .read()
            .await
            .get(namespace)
            .map(|routes| {
                routes
                    .iter()
                    .map(|r| (r.method, r.pattern.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
