use std::collections::HashMap;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::hub::{ClientId, Outbound};
use crate::state::SharedState;

/// Frames a front-end may send us.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum ClientMessage {
    /// Answer to a `GET_ACCESS_TOKEN` request.
    AccessToken {
        #[serde(rename = "requestId")]
        request_id: Uuid,
        #[serde(default)]
        token: Option<String>,
    },
    /// The front-end saw connectivity come back.
    SyncRequested {
        #[serde(default)]
        tag: Option<String>,
    },
}

type PendingReplies = HashMap<Uuid, oneshot::Sender<Option<String>>>;

pub async fn connect(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (client_id, mut outbound) = state.hub.connect();
    let (mut sink, mut stream) = socket.split();
    let mut pending = PendingReplies::new();

    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                let Some(frame) = encode(msg, &mut pending) else { continue };
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&state, client_id, &mut pending, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Dropping `pending` fails any token request still waiting on this front-end.
    state.hub.disconnect(client_id);
}

fn encode(msg: Outbound, pending: &mut PendingReplies) -> Option<String> {
    match msg {
        Outbound::Event(event) => match serde_json::to_string(&event) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!("Failed to serialize sync event: {e}");
                None
            }
        },
        Outbound::TokenRequest(reply) => {
            pending.retain(|_, waiting| !waiting.is_closed());
            let request_id = Uuid::now_v7();
            pending.insert(request_id, reply);
            Some(json!({ "type": "GET_ACCESS_TOKEN", "requestId": request_id }).to_string())
        }
    }
}

fn handle_message(state: &SharedState, client_id: ClientId, pending: &mut PendingReplies, text: &str) {
    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!("Ignoring unrecognised frame from front-end {client_id}: {e}");
            return;
        }
    };

    match msg {
        ClientMessage::AccessToken { request_id, token } => match pending.remove(&request_id) {
            Some(reply) => {
                let _ = reply.send(token);
            }
            None => tracing::debug!("Late or unknown token reply {request_id} from front-end {client_id}"),
        },
        ClientMessage::SyncRequested { tag } => {
            let tag = tag.unwrap_or_else(|| state.config.sync_tag.clone());
            state.scheduler.register(tag);
        }
    }
}
