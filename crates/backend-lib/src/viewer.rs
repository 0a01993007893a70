// ============================
// crates/backend-lib/src/viewer.rs
// ============================
//! WebSocket viewer client.
//!
//! Connects to `/ws/experts/{id}`, keeps an [`AvailabilityView`] current from
//! the server's snapshots and slot events, and bumps a revision counter on
//! every change so callers can wait for a state instead of polling.

use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use slotbook_common::{AvailabilityView, ClientToServer, Expert, ServerToClient};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("server error {code}: {message}")]
    Server { code: String, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("viewer connection closed")]
    Closed,
}

enum Command {
    Send(ClientToServer),
    Close,
}

/// A live view of one expert's availability
pub struct ViewerClient {
    view: Arc<RwLock<AvailabilityView>>,
    revision: watch::Receiver<u64>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl ViewerClient {
    /// Connect and wait for the initial snapshot. `base_url` is `ws://host:port`.
    pub async fn connect(base_url: &str, expert_id: &str) -> Result<Self, ViewerError> {
        let url = format!("{}/ws/experts/{expert_id}", base_url.trim_end_matches('/'));
        let (stream, _) = connect_async(url).await?;
        let (mut sink, mut source) = stream.split();

        let expert = loop {
            let Some(frame) = source.next().await else {
                return Err(ViewerError::Closed);
            };
            match frame? {
                Message::Text(text) => match decode(text.as_str())? {
                    ServerToClient::Snapshot { expert } => break expert,
                    ServerToClient::Error { code, message } => {
                        return Err(ViewerError::Server { code, message });
                    },
                    other => {
                        return Err(ViewerError::Protocol(format!(
                            "expected a snapshot first, got {other:?}"
                        )));
                    },
                },
                Message::Close(_) => return Err(ViewerError::Closed),
                _ => {},
            }
        };

        let view = Arc::new(RwLock::new(AvailabilityView::new(expert)));
        let (revision_tx, revision) = watch::channel(0u64);
        let (commands, mut command_rx) = mpsc::channel::<Command>(16);

        let task_view = view.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = source.next() => {
                        let Some(Ok(frame)) = frame else { break };
                        let text = match frame {
                            Message::Text(text) => text,
                            Message::Close(_) => break,
                            _ => continue,
                        };
                        let message = match decode(text.as_str()) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!(error = %e, "ignoring undecodable server frame");
                                continue;
                            },
                        };
                        let applied = apply_server_message(&mut task_view.write(), message);
                        match applied {
                            Ok(true) => revision_tx.send_modify(|rev| *rev += 1),
                            Ok(false) => {},
                            Err(e) => {
                                warn!(error = %e, "server ended the view");
                                break;
                            },
                        }
                    },
                    command = command_rx.recv() => match command {
                        Some(Command::Send(message)) => {
                            let Ok(json) = serde_json::to_string(&message) else { continue };
                            if sink.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        },
                        Some(Command::Close) | None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        },
                    },
                }
            }
            debug!("viewer task finished");
        });

        Ok(Self {
            view,
            revision,
            commands,
            task,
        })
    }

    /// Copy of the expert as currently known
    pub fn snapshot(&self) -> Expert {
        self.view.read().expert().clone()
    }

    /// `None` if the date or label is not on the expert's calendar
    pub fn is_taken(&self, date: NaiveDate, time: &str) -> Option<bool> {
        self.view.read().is_taken(date, time)
    }

    /// Changes applied so far
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Ask the server for a fresh snapshot
    pub async fn refresh(&self) -> Result<(), ViewerError> {
        self.commands
            .send(Command::Send(ClientToServer::Refresh))
            .await
            .map_err(|_| ViewerError::Closed)
    }

    /// Wait until `predicate` holds for the view
    pub async fn wait_for<F>(&self, predicate: F) -> Result<(), ViewerError>
    where
        F: Fn(&AvailabilityView) -> bool,
    {
        let mut revision = self.revision.clone();
        loop {
            revision.mark_unchanged();
            if predicate(&self.view.read()) {
                return Ok(());
            }
            revision.changed().await.map_err(|_| ViewerError::Closed)?;
        }
    }

    /// Wait for the revision counter to move past `seen`
    pub async fn wait_for_revision(&self, seen: u64) -> Result<u64, ViewerError> {
        let mut revision = self.revision.clone();
        let current = *revision
            .wait_for(|rev| *rev > seen)
            .await
            .map_err(|_| ViewerError::Closed)?;
        Ok(current)
    }

    /// Close the socket and wait for the background task
    pub async fn close(self) {
        let _ = self.commands.send(Command::Close).await;
        let _ = self.task.await;
    }
}

fn decode(text: &str) -> Result<ServerToClient, ViewerError> {
    serde_json::from_str(text).map_err(|e| ViewerError::Protocol(e.to_string()))
}

/// Fold one server message into `view`; `Ok(true)` when it counts as a change.
/// A snapshot always counts, since it is the answer to a refresh.
pub fn apply_server_message(
    view: &mut AvailabilityView,
    message: ServerToClient,
) -> Result<bool, ViewerError> {
    match message {
        ServerToClient::Snapshot { expert } => {
            if view.replace(expert) {
                Ok(true)
            } else {
                Err(ViewerError::Protocol("snapshot for a different expert".to_string()))
            }
        },
        ServerToClient::SlotTaken { event } => Ok(view.apply(&event)),
        ServerToClient::MalformedMessage { err_msg } => {
            warn!(%err_msg, "server rejected a viewer frame");
            Ok(false)
        },
        ServerToClient::Error { code, message } => Err(ViewerError::Server { code, message }),
    }
}
