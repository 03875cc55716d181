//! Websocket transport for the Event Bus (§6): fans `TentacleEvent`s out to
//! dashboard clients and answers their `request_status`/`request_logs` pulls.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tentacle_core::events::LogKind;
use tracing::debug;

use crate::state::AppState;

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    RequestStatus,
    RequestLogs { tentacle: String, log_type: String },
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.events.subscribe();

    if socket
        .send(Message::Text(json!({"type": "connection_status", "connected": true}).to_string()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(p) => p,
                            Err(_) => continue,
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "websocket client lagged behind the event bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&mut socket, &state, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

async fn handle_client_message(socket: &mut WebSocket, state: &Arc<AppState>, text: &str) {
    let Ok(message) = serde_json::from_str::<ClientMessage>(text) else {
        return;
    };

    match message {
        ClientMessage::RequestStatus => {
            for sup in state.fleet.list().await {
                let snap = sup.snapshot().await;
                let payload = json!({
                    "type": "status_update",
                    "branch": sup.branch(),
                    "build_status": snap.build_success,
                    "start_status": snap.start_success,
                });
                if socket.send(Message::Text(payload.to_string())).await.is_err() {
                    return;
                }
            }
        }
        ClientMessage::RequestLogs { tentacle, log_type } => {
            let kind = match log_type.as_str() {
                "build" => LogKind::Build,
                _ => LogKind::Start,
            };
            if let Some(sup) = state.fleet.find(&tentacle).await {
                let logs = sup.get_logs(kind).await;
                let payload = json!({
                    "type": "logs_update",
                    "branch": tentacle,
                    "kind": log_type,
                    "lines": logs,
                });
                let _ = socket.send(Message::Text(payload.to_string())).await;
            }
        }
    }
}
