// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Request validation module.

use chrono::NaiveDate;
use regex::Regex;
use slotbook_common::{ContactInfo, SlotKey};
use std::sync::LazyLock;
use thiserror::Error;

use crate::handlers::bookings::BookingPayload;
use crate::reservation::ReservationRequest;

const MAX_EXPERT_ID_LENGTH: usize = 64;
const MAX_NAME_LENGTH: usize = 100;
const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit
const MAX_TIME_SLOT_LENGTH: usize = 32;
const MAX_NOTES_LENGTH: usize = 1000;

static EXPERT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").expect("valid regex"));
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid regex")
});
static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9+\-\s()]{7,15}$").expect("valid regex"));
static DATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Possible validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid expert ID: {0}")]
    InvalidExpertId(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Invalid phone: {0}")]
    InvalidPhone(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid time slot: {0}")]
    InvalidTimeSlot(String),

    #[error("Invalid notes: {0}")]
    InvalidNotes(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate an expert ID
pub fn validate_expert_id(expert_id: &str) -> ValidationResult<&str> {
    let expert_id = expert_id.trim();
    if expert_id.is_empty() {
        return Err(ValidationError::InvalidExpertId("Expert ID is required".to_string()));
    }
    if expert_id.len() > MAX_EXPERT_ID_LENGTH {
        return Err(ValidationError::InvalidExpertId(format!(
            "Expert ID must be at most {MAX_EXPERT_ID_LENGTH} characters"
        )));
    }
    if !EXPERT_ID_REGEX.is_match(expert_id) {
        return Err(ValidationError::InvalidExpertId(
            "Expert ID can only contain letters, numbers, and hyphens".to_string(),
        ));
    }
    Ok(expert_id)
}

/// Validate a requester name
pub fn validate_name(name: &str) -> ValidationResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::InvalidName("Name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::InvalidName(format!(
            "Name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name)
}

/// Validate an email address, returning it lower-cased
pub fn validate_email(email: &str) -> ValidationResult<String> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::InvalidEmail("Email is required".to_string()));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::InvalidEmail(format!(
            "Email must be at most {MAX_EMAIL_LENGTH} characters"
        )));
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::InvalidEmail("Invalid email format".to_string()));
    }
    Ok(email.to_lowercase())
}

/// Validate a phone number
pub fn validate_phone(phone: &str) -> ValidationResult<&str> {
    let phone = phone.trim();
    if !PHONE_REGEX.is_match(phone) {
        return Err(ValidationError::InvalidPhone(
            "Phone must be 7-15 characters of digits, spaces, +, -, ( or )".to_string(),
        ));
    }
    Ok(phone)
}

/// Validate a `YYYY-MM-DD` date that exists on the calendar
pub fn validate_date(date: &str) -> ValidationResult<NaiveDate> {
    let date = date.trim();
    if !DATE_REGEX.is_match(date) {
        return Err(ValidationError::InvalidDate("Date must be YYYY-MM-DD".to_string()));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(format!("{date} is not a calendar date")))
}

/// Validate a time slot label
pub fn validate_time_slot(time_slot: &str) -> ValidationResult<&str> {
    let time_slot = time_slot.trim();
    if time_slot.is_empty() {
        return Err(ValidationError::InvalidTimeSlot("Time slot is required".to_string()));
    }
    if time_slot.len() > MAX_TIME_SLOT_LENGTH {
        return Err(ValidationError::InvalidTimeSlot(format!(
            "Time slot must be at most {MAX_TIME_SLOT_LENGTH} characters"
        )));
    }
    Ok(time_slot)
}

/// Validate free-form notes
pub fn validate_notes(notes: &str) -> ValidationResult<&str> {
    if notes.chars().count() > MAX_NOTES_LENGTH {
        return Err(ValidationError::InvalidNotes(format!(
            "Notes must be at most {MAX_NOTES_LENGTH} characters"
        )));
    }
    Ok(notes.trim())
}

/// Validate a booking body and turn it into an engine request
pub fn validate_booking(payload: &BookingPayload) -> ValidationResult<ReservationRequest> {
    let expert_id = validate_expert_id(&payload.expert_id)?;
    let name = validate_name(&payload.name)?;
    let email = validate_email(&payload.email)?;
    let phone = validate_phone(&payload.phone)?;
    let date = validate_date(&payload.date)?;
    let time_slot = validate_time_slot(&payload.time_slot)?;
    let notes = validate_notes(payload.notes.as_deref().unwrap_or_default())?;

    Ok(ReservationRequest {
        key: SlotKey::new(expert_id, date, time_slot),
        contact: ContactInfo {
            name: name.to_string(),
            email,
            phone: phone.to_string(),
        },
        notes: notes.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> BookingPayload {
        BookingPayload {
            expert_id: "e1".to_string(),
            name: "Alex Doe".to_string(),
            email: "Alex@Example.com".to_string(),
            phone: "+1 (555) 010-01".to_string(),
            date: "2026-02-25".to_string(),
            time_slot: "10:00 AM".to_string(),
            notes: Some("  talk about caching  ".to_string()),
        }
    }

    #[test]
    fn test_validate_expert_id() {
        assert!(validate_expert_id("expert-42").is_ok());
        assert!(validate_expert_id("").is_err());
        assert!(validate_expert_id("has space").is_err());
        assert!(validate_expert_id("../etc").is_err());
        assert!(validate_expert_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email("A@B.io").unwrap(), "a@b.io");
        assert!(validate_email("invalid-email").is_err());
        assert!(validate_email("").is_err());
        assert!(validate_email(&format!("{}@example.com", "a".repeat(250))).is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("5550100123").is_ok());
        assert!(validate_phone("+44 20 7946").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("555-CALL-NOW").is_err());
        assert!(validate_phone("1234567890123456").is_err());
    }

    #[test]
    fn test_validate_date() {
        assert_eq!(
            validate_date("2026-02-25").unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 25).unwrap()
        );
        assert!(validate_date("2026-02-30").is_err());
        assert!(validate_date("25/02/2026").is_err());
        assert!(validate_date("2026-2-5").is_err());
    }

    #[test]
    fn test_validate_name_time_slot_and_notes() {
        assert_eq!(validate_name("  Alex ").unwrap(), "Alex");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
        assert!(validate_time_slot("").is_err());
        assert!(validate_time_slot(&"9".repeat(33)).is_err());
        assert!(validate_notes(&"n".repeat(1000)).is_ok());
        assert!(validate_notes(&"n".repeat(1001)).is_err());
    }

    #[test]
    fn test_validate_booking() {
        let request = validate_booking(&payload()).unwrap();
        assert_eq!(request.key.expert_id, "e1");
        assert_eq!(request.key.time_slot, "10:00 AM");
        assert_eq!(request.contact.email, "alex@example.com");
        assert_eq!(request.notes, "talk about caching");

        let mut missing_notes = payload();
        missing_notes.notes = None;
        assert_eq!(validate_booking(&missing_notes).unwrap().notes, "");

        let mut bad = payload();
        bad.email = "nope".to_string();
        assert!(matches!(validate_booking(&bad), Err(ValidationError::InvalidEmail(_))));
    }
}
