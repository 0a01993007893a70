// ============================
// crates/backend-lib/src/handlers/bookings.rs
// ============================
//! Booking handlers: create, look up by email, change status.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use slotbook_common::{BookingStatus, Expert, Reservation};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::Storage;
use crate::validation::{validate_booking, validate_email};
use crate::AppState;

/// `POST /api/bookings` body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPayload {
    #[serde(default)]
    pub expert_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time_slot: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingCreated {
    pub message: &'static str,
    pub booking: Reservation,
}

/// The expert fields shown next to a booking in a "my bookings" list
#[derive(Debug, Clone, Serialize)]
pub struct ExpertBrief {
    pub name: String,
    pub category: String,
    pub avatar: String,
}

impl From<&Expert> for ExpertBrief {
    fn from(expert: &Expert) -> Self {
        Self {
            name: expert.name.clone(),
            category: expert.category.clone(),
            avatar: expert.avatar.clone(),
        }
    }
}

/// A reservation plus who it is with; `expert` is null once the expert is gone
#[derive(Debug, Serialize)]
pub struct BookingListing {
    #[serde(flatten)]
    pub booking: Reservation,
    pub expert: Option<ExpertBrief>,
}

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub status: String,
}

/// `POST /api/bookings`
pub async fn create_booking<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<BookingPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingCreated>), AppError> {
    let Json(payload) = payload?;
    let request = validate_booking(&payload)?;
    let booking = state.engine.reserve(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(BookingCreated {
            message: "Booking confirmed!",
            booking,
        }),
    ))
}

/// `GET /api/bookings?email=`
pub async fn bookings_by_email<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<BookingListing>>, AppError> {
    let email = params
        .get("email")
        .ok_or_else(|| AppError::InvalidInput("Email query parameter is required".to_string()))?;
    let email = validate_email(email).map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let bookings = state.storage.reservations_by_email(&email).await?;
    let mut experts: HashMap<String, Option<ExpertBrief>> = HashMap::new();
    let mut listings = Vec::with_capacity(bookings.len());
    for booking in bookings {
        let expert = match experts.get(&booking.expert_id) {
            Some(brief) => brief.clone(),
            None => {
                let brief = state
                    .storage
                    .find_expert(&booking.expert_id)
                    .await?
                    .as_ref()
                    .map(ExpertBrief::from);
                experts.insert(booking.expert_id.clone(), brief.clone());
                brief
            },
        };
        listings.push(BookingListing { booking, expert });
    }
    Ok(Json(listings))
}

/// `PATCH /api/bookings/{id}/status`
pub async fn update_status<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<StatusPayload>, JsonRejection>,
) -> Result<Json<Reservation>, AppError> {
    let Json(payload) = payload?;
    let status = BookingStatus::parse(&payload.status).ok_or_else(|| {
        let allowed: Vec<&str> = BookingStatus::ALL.iter().map(|s| s.as_str()).collect();
        AppError::InvalidInput(format!(
            "Invalid status. Must be one of: {}",
            allowed.join(", ")
        ))
    })?;
    let id = Uuid::parse_str(id.trim())
        .map_err(|_| AppError::InvalidInput(format!("Invalid booking id: {id}")))?;

    let updated = state
        .storage
        .update_status(id, status)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

    info!(%id, status = status.as_str(), "booking status updated");
    Ok(Json(updated))
}
