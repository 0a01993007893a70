// ================
// common/src/lib.rs
// ================
//! Common types shared by the slot-booking server and its clients.
//! This module defines the expert calendar model, reservation records and
//! the WebSocket protocol messages.

pub mod view;

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use view::AvailabilityView;

/// Identifier of an expert in the directory
pub type ExpertId = String;

/// A single bookable slot on a calendar day
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TimeSlot {
    /// Display label, e.g. "09:00 AM". Unique within its day.
    pub time: String,
    /// Set once, by the reservation engine, when a booking commits
    #[serde(default)]
    pub taken: bool,
}

impl TimeSlot {
    pub fn free(time: impl Into<String>) -> Self {
        Self { time: time.into(), taken: false }
    }
}

/// One calendar day of an expert's availability
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
}

/// Expert profile with its owned, nested calendar
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Expert {
    pub id: ExpertId,
    pub name: String,
    pub category: String,
    /// Years of experience
    pub experience: u32,
    /// Average rating between 0 and 5
    pub rating: f32,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub availability: Vec<Availability>,
}

impl Expert {
    /// Look up a slot by date and label
    pub fn slot(&self, date: NaiveDate, time: &str) -> Option<&TimeSlot> {
        self.availability
            .iter()
            .find(|day| day.date == date)
            .and_then(|day| day.slots.iter().find(|slot| slot.time == time))
    }

    /// Mutable slot lookup
    pub fn slot_mut(&mut self, date: NaiveDate, time: &str) -> Option<&mut TimeSlot> {
        self.availability
            .iter_mut()
            .find(|day| day.date == date)
            .and_then(|day| day.slots.iter_mut().find(|slot| slot.time == time))
    }

    /// Check the calendar invariants: one entry per date, unique labels per day.
    pub fn check_calendar(&self) -> Result<(), CalendarError> {
        let mut dates = std::collections::HashSet::new();
        for day in &self.availability {
            if !dates.insert(day.date) {
                return Err(CalendarError::DuplicateDate(day.date));
            }
            let mut labels = std::collections::HashSet::new();
            for slot in &day.slots {
                if !labels.insert(slot.time.as_str()) {
                    return Err(CalendarError::DuplicateSlot {
                        date: day.date,
                        time: slot.time.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Profile without the calendar, as used by directory listings
    pub fn summary(&self) -> ExpertSummary {
        ExpertSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            experience: self.experience,
            rating: self.rating,
            bio: self.bio.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Calendar invariant violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("date {0} listed more than once")]
    DuplicateDate(NaiveDate),

    #[error("slot {time} listed more than once on {date}")]
    DuplicateSlot { date: NaiveDate, time: String },
}

/// Expert profile fields returned by directory listings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExpertSummary {
    pub id: ExpertId,
    pub name: String,
    pub category: String,
    pub experience: u32,
    pub rating: f32,
    pub bio: String,
    pub avatar: String,
}

/// The (expert, date, slot label) triple a reservation claims
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SlotKey {
    pub expert_id: ExpertId,
    pub date: NaiveDate,
    pub time_slot: String,
}

impl SlotKey {
    pub fn new(expert_id: impl Into<ExpertId>, date: NaiveDate, time_slot: impl Into<String>) -> Self {
        Self {
            expert_id: expert_id.into(),
            date,
            time_slot: time_slot.into(),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.expert_id, self.date, self.time_slot)
    }
}

/// Notification that a slot has been reserved.
///
/// Carries only the triple; who booked it is never broadcast.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SlotTakenEvent {
    pub expert_id: ExpertId,
    pub date: NaiveDate,
    pub time_slot: String,
}

impl From<&SlotKey> for SlotTakenEvent {
    fn from(key: &SlotKey) -> Self {
        Self {
            expert_id: key.expert_id.clone(),
            date: key.date,
            time_slot: key.time_slot.clone(),
        }
    }
}

/// Booking lifecycle status; only `Pending` is set by the reservation engine
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Completed,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 3] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Completed => "Completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }
}

/// Requester contact details
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContactInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// A durable booking of one slot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Uuid,
    pub expert_id: ExpertId,
    pub date: NaiveDate,
    pub time_slot: String,
    #[serde(flatten)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// New pending reservation for `key`
    pub fn pending(key: &SlotKey, contact: ContactInfo, notes: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            expert_id: key.expert_id.clone(),
            date: key.date,
            time_slot: key.time_slot.clone(),
            contact,
            notes,
            status: BookingStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.expert_id.clone(), self.date, self.time_slot.clone())
    }
}

/// Messages sent from a viewer to the server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "msgType")]
pub enum ClientToServer {
    /// Ask for a fresh snapshot of the expert in view
    Refresh,
}

/// Messages sent from the server to a viewer
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "msgType")]
pub enum ServerToClient {
    /// Full current state of the expert in view
    Snapshot {
        expert: Expert,
    },
    /// A slot of the expert in view was reserved
    SlotTaken {
        #[serde(flatten)]
        event: SlotTakenEvent,
    },
    /// Error response for malformed messages
    MalformedMessage {
        #[serde(rename = "errMsg")]
        err_msg: String,
    },
    /// Terminal error, the server closes the socket afterwards
    Error {
        code: String,
        message: String,
    },
}
