// ============================
// backend-lib/src/storage/mod.rs
// ============================
//! Storage abstraction with in-memory and flat-file implementations.
//!
//! Experts embed their calendar; reservations are separate records keyed by
//! the (expert, date, slot) triple. Both backends enforce two things at this
//! layer, independently of the reservation engine:
//! - `mark_taken` is a single conditional write on one slot
//! - a second reservation for an already claimed triple is rejected with
//!   [`StorageError::DuplicateReservation`]

mod error;
mod flat_file;
mod memory;

pub use error::StorageError;
pub use flat_file::FlatFileStorage;
pub use memory::{MemoryStorage, ReconcileReport};

use async_trait::async_trait;
use serde::Serialize;
use slotbook_common::{BookingStatus, Expert, ExpertSummary, Reservation, SlotKey};
use uuid::Uuid;

/// Result of a read-only slot lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLookup {
    ExpertMissing,
    SlotMissing,
    Free,
    Taken,
}

/// Directory listing filter, already normalised by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpertQuery {
    pub page: u32,
    pub limit: u32,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl Default for ExpertQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 8,
            category: None,
            search: None,
        }
    }
}

impl ExpertQuery {
    pub(crate) fn matches(&self, expert: &Expert) -> bool {
        let category_ok = self
            .category
            .as_deref()
            .is_none_or(|category| expert.category == category);
        let search_ok = self.search.as_deref().is_none_or(|needle| {
            expert
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        category_ok && search_ok
    }
}

/// One page of directory results
#[derive(Debug, Clone, Serialize)]
pub struct ExpertPage {
    pub experts: Vec<ExpertSummary>,
    pub total: usize,
    pub page: u32,
    pub pages: u32,
}

/// Trait for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or replace an expert document. Calendar invariants are checked.
    async fn upsert_expert(&self, expert: Expert) -> Result<(), StorageError>;

    /// Get an expert with its full calendar
    async fn find_expert(&self, expert_id: &str) -> Result<Option<Expert>, StorageError>;

    /// Filtered, paginated directory listing
    async fn list_experts(&self, query: &ExpertQuery) -> Result<ExpertPage, StorageError>;

    /// Number of experts in the directory
    async fn expert_count(&self) -> Result<usize, StorageError>;

    /// Read-only slot check. Racy by nature; only good for failing fast.
    async fn find_free_slot(&self, key: &SlotKey) -> Result<SlotLookup, StorageError>;

    /// Set `taken` on the slot only if it is currently free.
    ///
    /// Returns `false` when nothing was updated: the slot is taken, or the
    /// expert, date or label does not match exactly.
    async fn mark_taken(&self, key: &SlotKey) -> Result<bool, StorageError>;

    /// Undo a `mark_taken` whose reservation could not be recorded.
    ///
    /// Only the reservation engine's rollback path calls this.
    async fn release_slot(&self, key: &SlotKey) -> Result<bool, StorageError>;

    /// Record a reservation, failing with `DuplicateReservation` if its triple
    /// is already claimed.
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<(), StorageError>;

    /// Reservation holding `key`, if any
    async fn find_reservation(&self, key: &SlotKey) -> Result<Option<Reservation>, StorageError>;

    /// Reservations made with `email`, newest first
    async fn reservations_by_email(&self, email: &str) -> Result<Vec<Reservation>, StorageError>;

    /// Change a reservation's status. Never touches the slot.
    async fn update_status(
        &self,
        id: Uuid,
        status: BookingStatus,
    ) -> Result<Option<Reservation>, StorageError>;
}
