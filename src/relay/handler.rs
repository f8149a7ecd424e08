use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::relay::ClientHandle;
use crate::signaling::{ClientSignal, SignalingMessage};
use crate::state::RelayState;

/// WebSocket routes
pub fn ws_routes() -> Router<RelayState> {
    Router::new().route("/ws", get(ws_upgrade))
}

/// WebSocket upgrade handler
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: RelayState) {
    let conn_id = Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    // Create message channel for sending to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<SignalingMessage>();
    let client = ClientHandle::new(conn_id.clone(), tx);

    // Split socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending messages to client
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "Error encoding relay message"),
            }
        }
    });

    // Process incoming messages
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientSignal>(&text) {
                Ok(signal) => state.registry.handle(&client, signal),
                Err(e) => {
                    tracing::warn!(conn_id = %conn_id, error = %e, "Malformed client signal dropped");
                }
            },
            Ok(Message::Ping(_data)) => {
                // Respond with pong automatically handled by axum
                tracing::trace!(conn_id = %conn_id, "Ping received");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close received");
                break;
            }
            Err(e) => {
                tracing::error!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Cleanup on disconnect
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected, cleaning up");
    state.registry.disconnect(&conn_id);

    // Cancel send task
    send_task.abort();
}
