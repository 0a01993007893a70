//! Client-side cache of one expert's availability.
//!
//! Slot events are merged in place so a viewer does not refetch the whole
//! expert for every reservation. The merge only ever sets `taken` to true,
//! so replaying or duplicating an event is harmless. Anything missed is
//! repaired by the next snapshot.

use chrono::NaiveDate;

use crate::{Expert, ExpertId, SlotTakenEvent};

/// Cached view of the expert currently being looked at
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityView {
    expert: Expert,
}

impl AvailabilityView {
    pub fn new(expert: Expert) -> Self {
        Self { expert }
    }

    pub fn expert_id(&self) -> &ExpertId {
        &self.expert.id
    }

    pub fn expert(&self) -> &Expert {
        &self.expert
    }

    /// Replace the cache with a fresh snapshot of the same expert.
    ///
    /// Snapshots for another expert are ignored and `false` is returned.
    pub fn replace(&mut self, expert: Expert) -> bool {
        if expert.id != self.expert.id {
            return false;
        }
        self.expert = expert;
        true
    }

    /// Merge a slot event; returns whether the cache changed.
    pub fn apply(&mut self, event: &SlotTakenEvent) -> bool {
        if event.expert_id != self.expert.id {
            return false;
        }
        match self.expert.slot_mut(event.date, &event.time_slot) {
            Some(slot) if !slot.taken => {
                slot.taken = true;
                true
            },
            // already taken, or a slot this snapshot does not know yet
            _ => false,
        }
    }

    /// `None` when the slot is not on the cached calendar
    pub fn is_taken(&self, date: NaiveDate, time: &str) -> Option<bool> {
        self.expert.slot(date, time).map(|slot| slot.taken)
    }

    /// Labels still free on `date`
    pub fn free_slots(&self, date: NaiveDate) -> Vec<&str> {
        self.expert
            .availability
            .iter()
            .filter(|day| day.date == date)
            .flat_map(|day| day.slots.iter())
            .filter(|slot| !slot.taken)
            .map(|slot| slot.time.as_str())
            .collect()
    }
}
