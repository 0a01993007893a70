//! Storage-layer errors.
use slotbook_common::{CalendarError, SlotKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// The uniqueness guard rejected a second reservation for a triple
    #[error("reservation already exists for {0}")]
    DuplicateReservation(SlotKey),

    #[error("expert not found: {0}")]
    ExpertNotFound(String),

    #[error("invalid expert id: {0:?}")]
    InvalidExpertId(String),

    #[error("invalid calendar: {0}")]
    InvalidCalendar(#[from] CalendarError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
