//! Observer WebSocket: forwards the tournament broadcast

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::ws::protocol::ServerMsg;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let events = state.tournament.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, events))
}

/// Push every broadcast message to one observer until either side goes away
async fn handle_socket(socket: WebSocket, mut events: broadcast::Receiver<ServerMsg>) {
    let observer_id = Uuid::new_v4();
    info!(observer_id = %observer_id, "Observer connected");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let writer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(msg) => {
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(observer_id = %observer_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(observer_id = %observer_id, lagged_count = n, "Observer lagged, skipping messages");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(observer_id = %observer_id, "Broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Observers only listen; drain until close so pings are answered
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(observer_id = %observer_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer.abort();
    info!(observer_id = %observer_id, "Observer disconnected");
}

async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
