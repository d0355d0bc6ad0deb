//! Observer WebSocket
//!
//! Each connection subscribes to the hub, receives a `pending_snapshot` of the
//! requests currently waiting, then every hub event as `{"type", "data"}`.
//!
//! ## Protocol
//!
//! ```json
//! // Client → Server: answer a pending request
//! {"type": "send_response", "id": "uuid", "response": {...}, "status_code": 200}
//!
//! // Server → Client: outcome of the submission
//! {"type": "submit_result", "data": {"id": "uuid", "success": true, "outcome": "resolved"}}
//! ```

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::broker::{BrokerError, RequestId};
use crate::notifications::EventFilter;
use crate::queue::DEFAULT_STATUS_CODE;
use crate::server::AppState;

fn default_status_code() -> u16 {
    DEFAULT_STATUS_CODE
}

/// Messages an operator may send
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    SendResponse {
        id: String,
        response: Value,
        #[serde(default = "default_status_code")]
        status_code: u16,
    },
    Ping,
}

/// `GET /ws`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let hub = state.engine.hub().clone();
    let observer_id = format!("ws-{}", Uuid::new_v4());
    let mut subscription = match hub.subscribe(observer_id.clone(), EventFilter::AcceptAll) {
        Ok(subscription) => subscription,
        Err(e) => {
            error!("Cannot register observer: {}", e);
            return;
        }
    };
    info!("Observer {} connected", observer_id);

    let (mut sender, mut receiver) = socket.split();

    // Subscribed first, so a request may appear in both the snapshot and an event
    let snapshot = json!({
        "type": "pending_snapshot",
        "data": { "requests": state.engine.broker().list_pending() },
    });
    if sender.send(Message::Text(snapshot.to_string().into())).await.is_err() {
        debug!("Observer {} left before the snapshot", observer_id);
        let _ = hub.unsubscribe(&observer_id);
        return;
    }

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    debug!("Hub closed for observer {}", observer_id);
                    break;
                };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to serialize event: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    debug!("Observer {} disconnected", observer_id);
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_text_message(text.as_str(), &state) {
                            if sender.send(Message::Text(reply.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket error for {}: {}", observer_id, e);
                        break;
                    }
                }
            }
        }
    }

    let _ = hub.unsubscribe(&observer_id);
    info!("Observer {} disconnected", observer_id);
}

/// Handle one operator message, returning the reply to send back
fn handle_text_message(text: &str, state: &AppState) -> Option<Value> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            return Some(json!({
                "type": "error",
                "data": { "message": format!("unrecognized message: {}", e) },
            }))
        }
    };

    match message {
        ClientMessage::Ping => Some(json!({ "type": "pong", "data": {} })),
        ClientMessage::SendResponse {
            id,
            response,
            status_code,
        } => Some(submit(state, &id, response, status_code)),
    }
}

fn submit(state: &AppState, id: &str, response: Value, status_code: u16) -> Value {
    let (success, outcome, message) = match id.parse::<RequestId>() {
        Err(_) => (false, "invalid", format!("invalid request id '{}'", id)),
        Ok(request_id) => match state
            .engine
            .broker()
            .submit_manual(request_id, response, status_code)
        {
            Ok(_) => (true, "resolved", format!("request {} resolved", request_id)),
            Err(e) => {
                let outcome = match e {
                    BrokerError::NotFound { .. } => "not_found",
                    BrokerError::AlreadyResolved { .. } => "already_resolved",
                    BrokerError::Queue(_) => "invalid",
                    _ => "unavailable",
                };
                (false, outcome, e.to_string())
            }
        },
    };

    json!({
        "type": "submit_result",
        "data": {
            "id": id,
            "success": success,
            "outcome": outcome,
            "message": message,
        },
    })
}
