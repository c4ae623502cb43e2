//! Atrium bridge server.
//!
//! Terminates external HTTP and WebSocket connections for the plugin
//! runtime: built-in introspection endpoints under `/api`, the event
//! stream at `/ws`, and every other request dispatched through the
//! plugin route registry at `/<namespace>/<path>`.

use axum::http::Method;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod bridge;
pub mod state;
pub mod ws;

use state::AppState;

#[derive(Serialize)]
struct ApiStatus {
    status: &'static str,
    version: &'static str,
}

async fn healthz() -> Json<ApiStatus> {
    Json(ApiStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the bridge application.
pub fn build_app(state: AppState) -> Router {
    // The front-end is served from its own origin and talks to the
    // bridge directly, so CORS is wide open.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws::events_socket))
        .nest("/api", api::router())
        // Everything else belongs to the plugins.
        .fallback(bridge::dispatch)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
