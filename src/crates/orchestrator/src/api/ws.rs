//! WebSocket endpoint
//!
//! Clients connect to `/ws?chatId=` and receive `{type, payload}` frames for
//! their chat only. Filtering is strict: a subscriber never sees another
//! chat's events. Frames are forwarded in broadcast order with no
//! server-side coalescing.

use crate::api::routes::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub chat_id: String,
}

/// GET /ws?chatId=
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.chat_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, chat_id: String) {
    debug!(chat = %chat_id, "websocket client connected");
    let mut rx = state.bus.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(chat = %chat_id, missed, "websocket client lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                if event.chat_id() != chat_id {
                    continue;
                }
                let Ok(frame) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    // Client pings keep the connection alive; everything
                    // else from the client is ignored
                    Some(Ok(Message::Ping(data))) => {
                        let _ = socket.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    debug!(chat = %chat_id, "websocket client disconnected");
}
