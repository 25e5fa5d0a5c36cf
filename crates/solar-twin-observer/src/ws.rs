//! `WebSocket` handler for real-time stream delivery.
//!
//! Clients connect to `GET /ws/stream` and receive every
//! [`StreamEvent`](solar_twin_types::StreamEvent) as a JSON text frame,
//! starting with `connected`. A client that cannot keep up is dropped by
//! the broadcaster and the socket is closed.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming.
///
/// # Route
///
/// `GET /ws/stream`
pub async fn ws_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Register as a subscriber and forward events until either side goes
/// away, then unregister.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let mut subscription = state.engine.subscribe().await;
    let id = subscription.id();
    debug!(subscriber = %id, "WebSocket client connected");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    debug!(subscriber = %id, "subscriber dropped by broadcaster, closing socket");
                    break;
                };
                let json = match serde_json::to_string(event.as_ref()) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!("Failed to serialize stream event: {e}");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!(subscriber = %id, "WebSocket client disconnected (send failed)");
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(subscriber = %id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(subscriber = %id, "WebSocket client disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(subscriber = %id, "WebSocket error: {e}");
                        break;
                    }
                    // Client text and binary frames are ignored.
                    _ => {}
                }
            }
        }
    }

    state.engine.unsubscribe(id);
}
