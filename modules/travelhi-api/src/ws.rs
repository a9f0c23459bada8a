//! `/ws` endpoint: one welcome frame, then every inbound message is echoed to
//! every connection and system notices arrive as they are broadcast.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, warn};

use crate::broadcaster::Broadcaster;
use crate::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();

    // Sent before registration so it is always the first frame.
    let welcome = json!({ "type": "welcome", "message": "connected" }).to_string();
    if sink.send(Message::Text(welcome.into())).await.is_err() {
        return;
    }

    let broadcaster = state.broadcaster.clone();
    let (handle, mut outbound) = broadcaster.open();
    let id = handle.id();
    broadcaster.connect(&handle).await;
    drop(handle);

    // Drains this connection's queue. Exiting drops the receiver, so the
    // next broadcast sees a closed queue and prunes the connection.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.as_ref().into())).await {
                debug!(connection_id = id, error = %e, "Write failed");
                break;
            }
        }
    });

    let echo = broadcaster.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => relay(&echo, text.as_str()).await,
                // Binary payloads are relayed as text, invalid UTF-8 replaced.
                Ok(Message::Binary(bytes)) => relay(&echo, &String::from_utf8_lossy(&bytes)).await,
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(connection_id = id, error = %e, "Read failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    broadcaster.disconnect(id).await;
}

async fn relay(broadcaster: &Broadcaster, message: &str) {
    let payload = json!({ "type": "echo", "message": message });
    if let Err(e) = broadcaster.broadcast(&payload).await {
        warn!(error = %e, "Echo broadcast failed");
    }
}
