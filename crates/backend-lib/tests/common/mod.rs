// ============================
// crates/backend-lib/tests/common/mod.rs
// ============================
//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use backend_lib::{
    config::Settings,
    router::create_router,
    storage::{MemoryStorage, Storage},
    AppState,
};
use chrono::NaiveDate;
use serde_json::Value;
use slotbook_common::{Availability, Expert, TimeSlot};
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const SLOTS: [&str; 3] = ["09:00 AM", "10:00 AM", "11:00 AM"];

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 25).unwrap()
}

pub fn expert(id: &str, name: &str, category: &str) -> Expert {
    Expert {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        experience: 10,
        rating: 4.5,
        bio: format!("{name} bio"),
        avatar: String::new(),
        availability: vec![Availability {
            date: day(),
            slots: SLOTS.iter().map(|s| TimeSlot::free(*s)).collect(),
        }],
    }
}

/// Memory-backed state with three experts: `e1`, `e2`, `e3`
pub async fn memory_state(settings: Settings) -> Arc<AppState<MemoryStorage>> {
    let storage = MemoryStorage::new();
    storage.upsert_expert(expert("e1", "James Otieno", "Backend")).await.unwrap();
    storage.upsert_expert(expert("e2", "Priya Nair", "Frontend")).await.unwrap();
    storage.upsert_expert(expert("e3", "Sofia Almeida", "Backend")).await.unwrap();
    Arc::new(AppState::new(storage, settings))
}

/// One request through the router; the body is parsed as JSON when present
pub async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// A bodyless GET carrying the client address header the rate limiter keys on
pub async fn get_from(app: &Router, client_ip: &str, uri: &str) -> StatusCode {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("x-real-ip", client_ip)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap().status()
}

pub fn booking_body(expert_id: &str, slot: &str, email: &str) -> Value {
    serde_json::json!({
        "expertId": expert_id,
        "name": "Alex Doe",
        "email": email,
        "phone": "5550100123",
        "date": day().to_string(),
        "timeSlot": slot,
        "notes": "system design mock",
    })
}

/// Serve the router on an ephemeral loopback port
pub async fn spawn_server<S: Storage + 'static>(state: Arc<AppState<S>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
