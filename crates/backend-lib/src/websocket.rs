// ==================
// crates/backend-lib/src/websocket.rs
// ==================
//! WebSocket viewer sessions.
//!
//! A viewer connects to `/ws/experts/{id}` and watches one expert:
//! - the broadcaster subscription is taken before the snapshot is read, so
//!   no commit can fall between the two
//! - `Snapshot` goes out first, then one `SlotTaken` per committed reservation
//! - a `Refresh` frame, or a lagged subscription, gets a fresh `Snapshot`
//! - an unknown expert gets `Error` and the socket is closed

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use slotbook_common::{ClientToServer, ServerToClient};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::events::{RecvError, SlotSubscription};
use crate::storage::{Storage, StorageError};
use crate::AppState;

type WsSender = SplitSink<WebSocket, Message>;

/// Why a viewer session ended early
#[derive(Debug, Error)]
enum SessionError {
    #[error("expert not found")]
    ExpertNotFound,

    #[error("snapshot read failed: {0}")]
    Store(#[from] StorageError),

    #[error("failed to serialize server message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("viewer socket closed: {0}")]
    Socket(#[from] axum::Error),
}

impl SessionError {
    /// The last frame the viewer gets before the close, if any
    fn client_reply(&self, expert_id: &str) -> Option<ServerToClient> {
        match self {
            SessionError::ExpertNotFound => Some(ServerToClient::Error {
                code: "NF_001".to_string(),
                message: format!("Expert {expert_id} not found"),
            }),
            SessionError::Store(_) => Some(ServerToClient::Error {
                code: "STORE_001".to_string(),
                message: "Could not load availability".to_string(),
            }),
            SessionError::Serialize(_) | SessionError::Socket(_) => None,
        }
    }
}

/// `GET /ws/experts/{id}`
pub async fn ws_handler<S: Storage + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<S>>>,
    Path(expert_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_viewer(socket, state, expert_id))
}

#[instrument(skip_all, fields(expert = %expert_id))]
async fn handle_viewer<S: Storage + 'static>(
    socket: WebSocket,
    state: Arc<AppState<S>>,
    expert_id: String,
) {
    let (mut tx, rx) = socket.split();
    let mut subscription = state.broadcaster.subscribe(&expert_id);

    let outcome = match send_snapshot(&state, &expert_id, &mut tx).await {
        Ok(()) => {
            info!("viewer connected");
            viewer_loop(&state, &expert_id, &mut tx, rx, &mut subscription).await
        },
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        match &e {
            SessionError::Socket(_) | SessionError::ExpertNotFound => {
                debug!(error = %e, "viewer session ended")
            },
            _ => warn!(error = %e, "viewer session ended"),
        }
        if let Some(reply) = e.client_reply(&expert_id) {
            if let Err(send_err) = send(&mut tx, &reply).await {
                debug!(error = %send_err, "could not deliver closing error");
            }
        }
    }

    let _ = tx.send(Message::Close(None)).await;
    state.broadcaster.unsubscribe(subscription);
    info!("viewer disconnected");
}

/// Runs until the viewer leaves (`Ok`) or the session cannot continue
async fn viewer_loop<S: Storage + 'static>(
    state: &AppState<S>,
    expert_id: &str,
    tx: &mut WsSender,
    mut rx: SplitStream<WebSocket>,
    subscription: &mut SlotSubscription,
) -> Result<(), SessionError> {
    loop {
        tokio::select! {
            incoming = rx.next() => {
                let Some(Ok(message)) = incoming else { return Ok(()) };
                match message {
                    Message::Text(text) => match serde_json::from_str::<ClientToServer>(text.as_str()) {
                        Ok(ClientToServer::Refresh) => {
                            debug!("refresh requested");
                            send_snapshot(state, expert_id, tx).await?;
                        },
                        Err(e) => {
                            let reply = ServerToClient::MalformedMessage {
                                err_msg: e.to_string(),
                            };
                            send(tx, &reply).await?;
                        },
                    },
                    Message::Binary(_) => {
                        let reply = ServerToClient::MalformedMessage {
                            err_msg: "binary frames are not supported".to_string(),
                        };
                        send(tx, &reply).await?;
                    },
                    Message::Close(_) => return Ok(()),
                    Message::Ping(_) | Message::Pong(_) => {},
                }
            },
            event = subscription.recv() => match event {
                Ok(event) => send(tx, &ServerToClient::SlotTaken { event }).await?,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "viewer lagged, resending snapshot");
                    send_snapshot(state, expert_id, tx).await?;
                },
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

/// Send the current expert
async fn send_snapshot<S: Storage + 'static>(
    state: &AppState<S>,
    expert_id: &str,
    tx: &mut WsSender,
) -> Result<(), SessionError> {
    let expert = state
        .storage
        .find_expert(expert_id)
        .await?
        .ok_or(SessionError::ExpertNotFound)?;
    send(tx, &ServerToClient::Snapshot { expert }).await
}

async fn send(tx: &mut WsSender, message: &ServerToClient) -> Result<(), SessionError> {
    let json = serde_json::to_string(message)?;
    tx.send(Message::Text(json.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_errors_map_to_closing_frames() {
        match SessionError::ExpertNotFound.client_reply("e9") {
            Some(ServerToClient::Error { code, message }) => {
                assert_eq!(code, "NF_001");
                assert!(message.contains("e9"));
            },
            other => panic!("unexpected reply: {other:?}"),
        }

        let store = SessionError::from(StorageError::Unavailable("disk".to_string()));
        match store.client_reply("e1") {
            Some(ServerToClient::Error { code, message }) => {
                assert_eq!(code, "STORE_001");
                assert!(!message.contains("disk"));
            },
            other => panic!("unexpected reply: {other:?}"),
        }

        let closed = SessionError::from(axum::Error::new(std::io::Error::other("reset")));
        assert!(closed.client_reply("e1").is_none());
        assert!(closed.to_string().starts_with("viewer socket closed"));
    }
}
