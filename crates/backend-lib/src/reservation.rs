// ============================
// backend-lib/src/reservation.rs
// ============================
//! Reservation engine: the only way a slot becomes taken.
//!
//! Protocol for one `reserve` call:
//! 1. resolve the expert and slot (NotFound if either is missing)
//! 2. conditional mark of the slot (SlotConflict if it did not apply)
//! 3. insert the reservation record, which the storage uniqueness guard may
//!    still reject (SlotConflict)
//! 4. if step 3 fails for any other reason, release the mark from step 2
//! 5. publish the slot event, only after 2 and 3 both succeeded
//!
//! A failed release in step 4 leaves a slot taken with no reservation. It
//! is logged at error level, counted under
//! [`RESERVATION_COMPENSATION_FAILED`](crate::metrics::RESERVATION_COMPENSATION_FAILED)
//! and repaired by storage reconciliation.

use std::sync::Arc;

use slotbook_common::{ContactInfo, Reservation, SlotKey, SlotTakenEvent};
use tracing::{debug, error, info, instrument, warn};

use crate::error::AppError;
use crate::events::SlotEventSink;
use crate::metrics::{
    RESERVATION_COMPENSATED, RESERVATION_COMPENSATION_FAILED, RESERVATION_CONFLICT,
    RESERVATION_CREATED,
};
use crate::storage::{SlotLookup, Storage, StorageError};

/// A request to reserve one slot
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub key: SlotKey,
    pub contact: ContactInfo,
    pub notes: String,
}

pub struct ReservationEngine<S> {
    storage: Arc<S>,
    events: Arc<dyn SlotEventSink>,
}

impl<S: Storage> ReservationEngine<S> {
    pub fn new(storage: Arc<S>, events: Arc<dyn SlotEventSink>) -> Self {
        Self { storage, events }
    }

    /// Reserve a slot, or fail leaving storage exactly as it was.
    ///
    /// # Errors
    /// - `NotFound` if the expert, date or slot label does not resolve
    /// - `SlotConflict` if the slot is already taken or another request won it
    /// - `Storage` for persistence faults; nothing is left behind
    #[instrument(skip_all, fields(slot = %request.key))]
    pub async fn reserve(&self, request: ReservationRequest) -> Result<Reservation, AppError> {
        let ReservationRequest { key, contact, notes } = request;

        match self.storage.find_free_slot(&key).await? {
            SlotLookup::ExpertMissing => {
                return Err(AppError::NotFound(format!("expert {}", key.expert_id)));
            },
            SlotLookup::SlotMissing => {
                return Err(AppError::NotFound(format!(
                    "slot {} on {}",
                    key.time_slot, key.date
                )));
            },
            SlotLookup::Taken => return Err(conflict("taken")),
            SlotLookup::Free => {},
        }

        if !self.storage.mark_taken(&key).await? {
            return Err(conflict("lost_race"));
        }

        let reservation = Reservation::pending(&key, contact, notes);
        match self.storage.insert_reservation(&reservation).await {
            Ok(()) => {},
            Err(StorageError::DuplicateReservation(_)) => {
                // A record already claims this triple while its slot read as
                // free. Keeping the mark makes flag and record agree again.
                warn!("uniqueness guard rejected reservation after a successful mark");
                return Err(conflict("duplicate"));
            },
            Err(e) => {
                self.compensate(&key).await;
                return Err(e.into());
            },
        }

        metrics::counter!(RESERVATION_CREATED).increment(1);
        info!(id = %reservation.id, "reservation committed");

        let delivered = self.events.publish(SlotTakenEvent::from(&key));
        debug!(delivered, "slot event published");

        Ok(reservation)
    }

    async fn compensate(&self, key: &SlotKey) {
        match self.storage.release_slot(key).await {
            Ok(true) => {
                metrics::counter!(RESERVATION_COMPENSATED).increment(1);
                warn!("reservation insert failed, slot released");
            },
            Ok(false) => {
                metrics::counter!(RESERVATION_COMPENSATION_FAILED).increment(1);
                error!("reservation insert failed and the slot was no longer marked");
            },
            Err(e) => {
                metrics::counter!(RESERVATION_COMPENSATION_FAILED).increment(1);
                error!(error = %e, "could not release slot after failed insert; reconciliation required");
            },
        }
    }
}

fn conflict(reason: &'static str) -> AppError {
    metrics::counter!(RESERVATION_CONFLICT, "reason" => reason).increment(1);
    debug!(reason, "slot conflict");
    AppError::SlotConflict
}
