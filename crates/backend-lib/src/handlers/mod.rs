// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! HTTP handlers for the JSON API.

pub mod bookings;
pub mod experts;

use axum::Json;
use serde_json::{json, Value};

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
