//! WebSocket endpoint for interactive clients.
//!
//! Protocol:
//! 1. Client connects to `GET /v1/ws`.
//! 2. Gateway assigns a client id and sends `welcome`.
//! 3. Client sends `ClientCommand`s; the gateway streams `ClientEvent`s
//!    (inbound FIX traffic, batch progress, session status, errors).
//! 4. On disconnect every session the client started is stopped.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

use fr_domain::error::Error;
use fr_protocol::{ClientCommand, ClientEvent, SessionStatus};
use fr_sessions::{EventSink, SessionKey};

use crate::orchestrator::Submission;
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let client_id = uuid::Uuid::new_v4().to_string();
    let mut outbound_rx = state.clients.register(&client_id);
    state.clients.publish(
        &client_id,
        ClientEvent::Welcome {
            client_id: client_id.clone(),
        },
    );
    tracing::info!(client_id = %client_id, "client connected");

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            if send_ws_event(&mut ws_sink, &event).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(command) => handle_command(&state, &client_id, command),
                Err(e) => {
                    tracing::debug!(client_id = %client_id, error = %e, "unparseable command");
                    reply_error(
                        &state,
                        &client_id,
                        &Error::InvalidMessage(format!("unrecognized command: {e}")),
                    );
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    let stopped = state.orchestrator.on_client_disconnect(&client_id);
    state.clients.remove(&client_id);
    writer.abort();
    tracing::info!(client_id = %client_id, stopped_sessions = stopped, "client disconnected");
}

fn handle_command(state: &AppState, client_id: &str, command: ClientCommand) {
    let orchestrator = &state.orchestrator;
    match command {
        ClientCommand::StartSession { sender, target, env } => {
            let key = SessionKey::new(sender, target, env);
            match orchestrator.start_session(key.clone(), Some(client_id)) {
                // A fresh session announces its own status to the owner.
                Ok(true) => {}
                Ok(false) => reply_status(state, client_id, key.clone(), orchestrator.status(&key)),
                Err(e) => reply_error(state, client_id, &e),
            }
        }
        ClientCommand::StopSession { sender, target, env } => {
            let key = SessionKey::new(sender, target, env);
            orchestrator.stop_session(&key);
            reply_status(state, client_id, key, SessionStatus::Disconnected);
        }
        ClientCommand::SendMessages { run } => {
            match orchestrator.submit_messages(run, Some(client_id)) {
                Ok(Submission::Scheduled) => {
                    tracing::debug!(client_id, "batch scheduled");
                }
                Ok(Submission::Sent(sent)) => {
                    tracing::debug!(client_id, sent, "messages sent");
                }
                Err(e) => reply_error(state, client_id, &e),
            }
        }
        ClientCommand::StopBatch => {
            orchestrator.stop_batch();
        }
        ClientCommand::Status { sender, target, env } => {
            let key = SessionKey::new(sender, target, env);
            let status = orchestrator.status(&key);
            reply_status(state, client_id, key, status);
        }
    }
}

fn reply_status(state: &AppState, client_id: &str, key: SessionKey, status: SessionStatus) {
    state.clients.publish(
        client_id,
        ClientEvent::SessionStatus {
            sender: key.sender,
            target: key.target,
            env: key.env,
            status,
        },
    );
}

fn reply_error(state: &AppState, client_id: &str, err: &Error) {
    tracing::debug!(client_id, error = %err, "command failed");
    state.clients.publish(client_id, ClientEvent::from_error(err));
}

async fn send_ws_event(
    sink: &mut (impl SinkExt<Message> + Unpin),
    event: &ClientEvent,
) -> Result<(), ()> {
    let json = serde_json::to_string(event).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}
