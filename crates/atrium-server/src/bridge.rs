//! Fallback dispatcher — plugin-contributed routes.
//!
//! Any request no built-in endpoint claims lands here and is resolved
//! through the route registry: the first path segment picks the plugin
//! namespace, the rest is matched against that plugin's patterns.

use std::collections::HashMap;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use atrium_runtime::{HttpMethod, RouteRequest, RuntimeError};

use crate::state::AppState;

/// Body size cap for plugin routes (2 MB).
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub async fn dispatch(State(state): State<AppState>, req: Request<Body>) -> Response {
    let method: HttpMethod = match req.method().as_str().parse() {
        Ok(method) => method,
        Err(_) => {
            return error(
                StatusCode::METHOD_NOT_ALLOWED,
                &format!("unsupported method: {}", req.method()),
            )
        }
    };
    let path = req.uri().path().to_string();
    let query = parse_query(req.uri().query());

    let matched = match state.runtime.routes().dispatch(method, &path).await {
        Ok(matched) => matched,
        Err(e @ RuntimeError::RouteNotFound(_)) => {
            return error(StatusCode::NOT_FOUND, &e.to_string())
        }
        Err(e) => {
            tracing::error!("route dispatch failed: {e}");
            return error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    let body_bytes = match to_bytes(req.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return error(StatusCode::PAYLOAD_TOO_LARGE, &format!("body error: {e}")),
    };
    let body = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        match serde_json::from_slice(&body_bytes) {
            Ok(value) => value,
            Err(e) => {
                return error(StatusCode::BAD_REQUEST, &format!("invalid JSON body: {e}"))
            }
        }
    };

    let request = RouteRequest {
        params: matched.params,
        query,
        body,
    };

    match (matched.handler)(request).await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => {
            tracing::error!(
                namespace = %matched.namespace,
                pattern = %matched.pattern,
                "route handler failed: {e}"
            );
            let status = if e.is_not_found() {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error(status, &e.to_string())
        }
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn parse_query(raw: Option<&str>) -> HashMap<String, String> {
    raw.unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key.to_string(), value.to_string())
        })
        .collect()
}
