//! In-memory storage backed by `DashMap`.
//!
//! Holding a `get_mut` guard on an expert locks that entry, so the slot
//! check and flip inside it cannot interleave with another writer. The
//! reservation map is keyed by the slot triple and only ever written through
//! its entry API, which is the uniqueness guard.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use slotbook_common::{BookingStatus, Expert, ExpertId, Reservation, SlotKey};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{ExpertPage, ExpertQuery, SlotLookup, Storage, StorageError};

#[derive(Default)]
struct Inner {
    experts: DashMap<ExpertId, Expert>,
    reservations: DashMap<SlotKey, Reservation>,
    by_id: DashMap<Uuid, SlotKey>,
}

/// In-memory storage; clones share the same data
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Inner>,
}

/// What a reconciliation pass repaired
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Slots marked taken with no reservation behind them, now free again
    pub released: Vec<SlotKey>,
    /// Reservations whose slot was free, now marked taken
    pub marked: Vec<SlotKey>,
    /// Reservations pointing at a slot that no longer exists
    pub orphaned: Vec<Uuid>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.released.is_empty() && self.marked.is_empty() && self.orphaned.is_empty()
    }

    /// Experts whose documents changed
    pub fn touched_experts(&self) -> Vec<ExpertId> {
        let mut ids: Vec<ExpertId> = self
            .released
            .iter()
            .chain(self.marked.iter())
            .map(|key| key.expert_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an expert, returning the previous document
    pub(super) fn put_expert(&self, expert: Expert) -> Result<Option<Expert>, StorageError> {
        expert.check_calendar()?;
        Ok(self.inner.experts.insert(expert.id.clone(), expert))
    }

    pub(super) fn restore_expert(&self, id: &str, previous: Option<Expert>) {
        match previous {
            Some(expert) => {
                self.inner.experts.insert(id.to_string(), expert);
            },
            None => {
                self.inner.experts.remove(id);
            },
        }
    }

    pub fn get_expert(&self, expert_id: &str) -> Option<Expert> {
        self.inner
            .experts
            .get(expert_id)
            .map(|entry| entry.value().clone())
    }

    pub fn lookup(&self, key: &SlotKey) -> SlotLookup {
        let Some(expert) = self.inner.experts.get(&key.expert_id) else {
            return SlotLookup::ExpertMissing;
        };
        match expert.slot(key.date, &key.time_slot) {
            None => SlotLookup::SlotMissing,
            Some(slot) if slot.taken => SlotLookup::Taken,
            Some(_) => SlotLookup::Free,
        }
    }

    /// Conditional flip of `taken` from `from` to `!from`
    fn swap_taken(&self, key: &SlotKey, from: bool) -> bool {
        let Some(mut expert) = self.inner.experts.get_mut(&key.expert_id) else {
            return false;
        };
        match expert.slot_mut(key.date, &key.time_slot) {
            Some(slot) if slot.taken == from => {
                slot.taken = !from;
                true
            },
            _ => false,
        }
    }

    pub fn try_mark(&self, key: &SlotKey) -> bool {
        self.swap_taken(key, false)
    }

    pub fn try_release(&self, key: &SlotKey) -> bool {
        self.swap_taken(key, true)
    }

    pub fn insert(&self, reservation: &Reservation) -> Result<(), StorageError> {
        match self.inner.reservations.entry(reservation.key()) {
            Entry::Occupied(entry) => Err(StorageError::DuplicateReservation(entry.key().clone())),
            Entry::Vacant(entry) => {
                self.inner
                    .by_id
                    .insert(reservation.id, entry.key().clone());
                entry.insert(reservation.clone());
                Ok(())
            },
        }
    }

    /// Drop a reservation whose write to disk failed
    pub(super) fn remove(&self, reservation: &Reservation) {
        let key = reservation.key();
        let removed = self
            .inner
            .reservations
            .remove_if(&key, |_, stored| stored.id == reservation.id);
        if removed.is_some() {
            self.inner.by_id.remove(&reservation.id);
        }
    }

    pub fn contains_reservation(&self, key: &SlotKey) -> bool {
        self.inner.reservations.contains_key(key)
    }

    pub fn reservation(&self, key: &SlotKey) -> Option<Reservation> {
        self.inner
            .reservations
            .get(key)
            .map(|entry| entry.value().clone())
    }

    /// Set a status and return `(previous status, updated reservation)`
    pub(super) fn set_status(
        &self,
        id: Uuid,
        status: BookingStatus,
    ) -> Option<(BookingStatus, Reservation)> {
        let key = self.inner.by_id.get(&id).map(|entry| entry.value().clone())?;
        let mut reservation = self.inner.reservations.get_mut(&key)?;
        let previous = reservation.status;
        reservation.status = status;
        Some((previous, reservation.clone()))
    }

    pub fn by_email(&self, email: &str) -> Vec<Reservation> {
        let mut found: Vec<Reservation> = self
            .inner
            .reservations
            .iter()
            .filter(|entry| entry.contact.email == email)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    pub fn experts(&self) -> Vec<Expert> {
        self.inner
            .experts
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        self.inner
            .reservations
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn list(&self, query: &ExpertQuery) -> ExpertPage {
        let mut matching: Vec<Expert> = self
            .inner
            .experts
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let limit = query.limit.max(1);
        let page = query.page.max(1);
        let total = matching.len();
        let skip = (page as usize - 1) * limit as usize;
        let experts = matching
            .iter()
            .skip(skip)
            .take(limit as usize)
            .map(Expert::summary)
            .collect();

        ExpertPage {
            experts,
            total,
            page,
            pages: total.div_ceil(limit as usize) as u32,
        }
    }

    /// Restore `taken` ⇔ reservation coherence.
    ///
    /// Repairs what an interrupted reservation or a failed rollback can
    /// leave behind. Run before serving traffic; concurrent reservations
    /// would look like inconsistencies.
    #[instrument(skip(self))]
    pub fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for expert in self.experts() {
            for day in &expert.availability {
                for slot in day.slots.iter().filter(|slot| slot.taken) {
                    let key = SlotKey::new(expert.id.clone(), day.date, slot.time.clone());
                    if !self.contains_reservation(&key) && self.try_release(&key) {
                        warn!(slot = %key, "released slot with no reservation");
                        report.released.push(key);
                    }
                }
            }
        }

        for reservation in self.reservations() {
            let key = reservation.key();
            match self.lookup(&key) {
                SlotLookup::Free => {
                    if self.try_mark(&key) {
                        warn!(slot = %key, "marked slot held by an existing reservation");
                        report.marked.push(key);
                    }
                },
                SlotLookup::Taken => {},
                SlotLookup::ExpertMissing | SlotLookup::SlotMissing => {
                    warn!(slot = %key, id = %reservation.id, "reservation points at a missing slot");
                    report.orphaned.push(reservation.id);
                },
            }
        }

        report
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upsert_expert(&self, expert: Expert) -> Result<(), StorageError> {
        self.put_expert(expert).map(|_| ())
    }

    async fn find_expert(&self, expert_id: &str) -> Result<Option<Expert>, StorageError> {
        Ok(self.get_expert(expert_id))
    }

    async fn list_experts(&self, query: &ExpertQuery) -> Result<ExpertPage, StorageError> {
        Ok(self.list(query))
    }

    async fn expert_count(&self) -> Result<usize, StorageError> {
        Ok(self.inner.experts.len())
    }

    async fn find_free_slot(&self, key: &SlotKey) -> Result<SlotLookup, StorageError> {
        Ok(self.lookup(key))
    }

    async fn mark_taken(&self, key: &SlotKey) -> Result<bool, StorageError> {
        Ok(self.try_mark(key))
    }

    async fn release_slot(&self, key: &SlotKey) -> Result<bool, StorageError> {
        Ok(self.try_release(key))
    }

    async fn insert_reservation(&self, reservation: &Reservation) -> Result<(), StorageError> {
        self.insert(reservation)
    }

    async fn find_reservation(&self, key: &SlotKey) -> Result<Option<Reservation>, StorageError> {
        Ok(self.reservation(key))
    }

    async fn reservations_by_email(&self, email: &str) -> Result<Vec<Reservation>, StorageError> {
        Ok(self.by_email(email))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: BookingStatus,
    ) -> Result<Option<Reservation>, StorageError> {
        Ok(self.set_status(id, status).map(|(_, updated)| updated))
    }
}
