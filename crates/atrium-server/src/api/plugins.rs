//! Plugin introspection and lifecycle endpoints.
//!
//! Used by developer tooling and the shell's settings UI: the plugin
//! listing carries each plugin's state and recorded error, and the
//! lifecycle endpoints expose disable/reload for iterative plugin
//! development.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use atrium_runtime::{PluginStatus, RuntimeError, SubscriptionInfo};

use crate::state::AppState;

// ─── Response types ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PluginListResponse {
    pub plugins: Vec<PluginStatus>,
}

#[derive(Debug, Serialize)]
pub struct ServiceEntry {
    pub plugin: String,
    pub method: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceListResponse {
    pub services: Vec<ServiceEntry>,
}

#[derive(Debug, Serialize)]
pub struct RouteEntry {
    pub namespace: String,
    pub method: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct RouteListResponse {
    pub routes: Vec<RouteEntry>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionListResponse {
    pub subscriptions: Vec<SubscriptionInfo>,
}

// ─── Helpers ────────────────────────────────────────────────────────

fn error_response(err: &RuntimeError) -> (StatusCode, Json<serde_json::Value>) {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
}

// ─── Handlers ───────────────────────────────────────────────────────

/// GET /api/plugins — Every known plugin with its state and error.
pub async fn list_plugins(State(state): State<AppState>) -> Json<PluginListResponse> {
    Json(PluginListResponse {
        plugins: state.manager.list().await,
    })
}

/// GET /api/services — All registered `(plugin, method)` pairs.
pub async fn list_services(State(state): State<AppState>) -> Json<ServiceListResponse> {
    let services = state
        .runtime
        .services()
        .list()
        .await
        .into_iter()
        .map(|(plugin, method)| ServiceEntry { plugin, method })
        .collect();
    Json(ServiceListResponse { services })
}

/// GET /api/routes — The aggregated routing table.
pub async fn list_routes(State(state): State<AppState>) -> Json<RouteListResponse> {
    let routes = state
        .runtime
        .routes()
        .list()
        .await
        .into_iter()
        .map(|(namespace, method, path)| RouteEntry {
            namespace,
            method: method.to_string(),
            path,
        })
        .collect();
    Json(RouteListResponse { routes })
}

/// GET /api/events/subscriptions — Live event subscriptions.
pub async fn list_subscriptions(State(state): State<AppState>) -> Json<SubscriptionListResponse> {
    Json(SubscriptionListResponse {
        subscriptions: state.runtime.bus().subscriptions(),
    })
}

/// POST /api/plugins/:id/disable — Disable a plugin and remove its
/// registrations.
pub async fn disable_plugin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    state.manager.disable(&id).await.map_err(|e| {
        tracing::error!(plugin = %id, "failed to disable plugin: {e}");
        error_response(&e)
    })?;

    tracing::info!(plugin = %id, "plugin disabled via API");
    Ok(Json(serde_json::json!({ "status": "disabled" })))
}

/// POST /api/plugins/:id/reload — Tear the plugin down and run it
/// through init and start again.
pub async fn reload_plugin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    state.manager.reload(&id).await.map_err(|e| {
        tracing::error!(plugin = %id, "failed to reload plugin: {e}");
        error_response(&e)
    })?;

    tracing::info!(plugin = %id, "plugin reloaded via API");
    Ok(Json(serde_json::json!({ "status": "running" })))
}
