//! Observer WebSocket: one `newResponse` text frame per stored result.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::state::AppState;
use crate::broadcast::{ObserverRegistry, NEW_RESPONSE_EVENT};
use crate::storage::ProbeResult;

/// Frame pushed to observers.
#[derive(Debug, Serialize)]
pub struct ObserverEvent<'a> {
    pub event: &'static str,
    pub data: &'a ProbeResult,
}

impl<'a> ObserverEvent<'a> {
    pub fn new_response(data: &'a ProbeResult) -> Self {
        Self {
            event: NEW_RESPONSE_EVENT,
            data,
        }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let observers = state.monitor.observers().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, observers))
}

async fn handle_socket(socket: WebSocket, observers: ObserverRegistry) {
    let mut subscription = observers.subscribe();
    let id = subscription.id();
    info!(observer = %id, "Client connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            record = subscription.recv() => {
                let Some(record) = record else { break };
                let frame = match serde_json::to_string(&ObserverEvent::new_response(&record)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(observer = %id, record = record.id, "Failed to serialize event: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    debug!(observer = %id, "Send failed, closing");
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) if text.as_str() == "ping" => {
                        if sink.send(Message::Text("pong".into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Unregisters before the log line below.
    drop(subscription);
    info!(observer = %id, "Client disconnected");
}
