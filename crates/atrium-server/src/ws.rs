//! WebSocket bridge — mirrors the event bus to connected clients.
//!
//! Broadcast-only: after the welcome frame, every bus publication is
//! forwarded as one JSON frame. Inbound client messages are ignored;
//! anything request-shaped belongs on a plugin's HTTP routes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde_json::json;

use crate::state::AppState;

/// Owner recorded for bridge subscriptions in bus introspection.
const BRIDGE_OWNER: &str = "ws-bridge";

pub async fn events_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, state))
}

async fn stream_events(mut socket: WebSocket, state: AppState) {
    // Subscribe before the welcome frame so nothing published after
    // the client sees "connected" can be missed.
    let mut events = state.runtime.bus().subscribe_all(BRIDGE_OWNER);

    let welcome = json!({
        "type": "connected",
        "channel": "events",
        "message": "atrium event stream connected",
    });
    if send_json(&mut socket, &welcome).await.is_err() {
        return;
    }
    tracing::debug!("websocket client connected");
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let frame = match serde_json::to_value(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!("failed to serialize event: {e}");
                        continue;
                    }
                };
                if send_json(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    // Broadcast-only channel; inbound frames are dropped.
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
        }
    }
    tracing::debug!("websocket client disconnected");
}

async fn send_json(socket: &mut WebSocket, value: &serde_json::Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(value.to_string().into())).await
}
