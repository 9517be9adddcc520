// WebSocket handler for the live scoreboard: events out, commands in.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};

use super::AppState;
use crate::engine::server::ServerMessage;
use crate::engine::session::Command;
use crate::metrics;

/// WebSocket upgrade handler for scoreboard displays and control panels.
pub async fn ws_scoreboard(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: AppState) {
    let mut rx = state.server.subscribe();
    metrics::CONNECTED_WEBSOCKETS.inc();

    // Late joiners get the full state before any event.
    if let Ok(json) = serde_json::to_string(&state.server.snapshot_message()) {
        if socket.send(Message::Text(json.into())).await.is_err() {
            metrics::CONNECTED_WEBSOCKETS.dec();
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if socket.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                        metrics::WEBSOCKET_MESSAGES_SENT_TOTAL.inc();
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket client lagged, skipped {n} messages");
                    }
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        // Accepted commands reach every client through the broadcast;
                        // a refusal is reported only to the sender.
                        if let Some(reply) = handle_command(&state, text.as_str()) {
                            if socket.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    metrics::CONNECTED_WEBSOCKETS.dec();
}

/// Run a command received as JSON. Returns the rejection message to send back, if any.
fn handle_command(state: &AppState, text: &str) -> Option<String> {
    let rejection = match serde_json::from_str::<Command>(text) {
        Ok(cmd) => match state.server.execute(cmd) {
            Ok(_) => return None,
            Err(e) => ServerMessage::CommandRejected {
                kind: e.kind().to_string(),
                error: e.to_string(),
            },
        },
        Err(e) => ServerMessage::CommandRejected {
            kind: "malformed".to_string(),
            error: e.to_string(),
        },
    };
    serde_json::to_string(&rejection).ok()
}
