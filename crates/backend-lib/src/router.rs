// ============================
// crates/backend-lib/src/router.rs
// ============================
//! HTTP + WebSocket router.
use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method, Uri},
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::error::AppError;
use crate::handlers::{bookings, experts, health};
use crate::middleware::rate_limit;
use crate::storage::Storage;
use crate::websocket::ws_handler;
use crate::AppState;

/// Create the application router
pub fn create_router<S: Storage + 'static>(state: Arc<AppState<S>>) -> Router {
    let api = Router::new()
        .route("/experts", get(experts::list_experts::<S>))
        .route("/experts/{id}", get(experts::get_expert::<S>))
        .route(
            "/bookings",
            post(bookings::create_booking::<S>).get(bookings::bookings_by_email::<S>),
        )
        .route("/bookings/{id}/status", patch(bookings::update_status::<S>))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::<S>));

    Router::new()
        .route("/health", get(health))
        .route("/ws/experts/{id}", get(ws_handler::<S>))
        .nest("/api", api)
        .fallback(not_found)
        .layer(cors_layer(&state.settings.client_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("route {}", uri.path()))
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers(Any);

    if origin.trim() == "*" {
        return layer.allow_origin(Any);
    }
    match origin.trim().parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            warn!(origin, error = %e, "invalid client_origin, cross-origin requests disabled");
            layer
        },
    }
}
