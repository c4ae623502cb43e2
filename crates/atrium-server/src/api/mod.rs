//! Built-in introspection and lifecycle endpoints.

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub mod plugins;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/plugins", get(plugins::list_plugins))
        .route("/plugins/{id}/disable", post(plugins::disable_plugin))
        .route("/plugins/{id}/reload", post(plugins::reload_plugin))
        .route("/services", get(plugins::list_services))
        .route("/routes", get(plugins::list_routes))
        .route("/events/subscriptions", get(plugins::list_subscriptions))
}
