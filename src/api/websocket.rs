use super::AppState;
use crate::hub::ServerMessage;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Create WebSocket router
pub fn create_ws_router(state: Arc<AppState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

/// GET /ws - WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Forward hub messages to one observer socket.
///
/// The sink's first message is the initial registry snapshot. Any socket
/// send failure ends the connection; the hub entry is removed either here
/// or by the hub itself on the next failed publish, whichever comes first.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let initial = ServerMessage::initial_data(state.registry.snapshot());
    let mut subscription = state.hub.subscribe(initial);

    info!(sink_id = subscription.id, "WebSocket connection established");

    loop {
        tokio::select! {
            outbound = subscription.rx.recv() => {
                match outbound {
                    Some(message) => {
                        let json = match serde_json::to_string(&message) {
                            Ok(json) => json,
                            Err(e) => {
                                error!(error = %e, "Failed to serialize hub message");
                                continue;
                            }
                        };
                        if let Err(e) = socket.send(Message::Text(json)).await {
                            warn!(error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    // Hub dropped this sink (slow consumer)
                    None => break,
                }
            }

            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        // Ignore text, binary, pong messages
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        }
    }

    state.hub.unsubscribe(subscription.id);
    info!(sink_id = subscription.id, "WebSocket connection closed");
}
