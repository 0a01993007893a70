// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the slot booking server.

pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod reservation;
pub mod router;
pub mod seed;
pub mod storage;
pub mod telemetry;
pub mod validation;
pub mod viewer;
pub mod websocket;

use std::sync::Arc;

use crate::config::Settings;
use crate::events::Broadcaster;
use crate::middleware::RateLimiter;
use crate::reservation::ReservationEngine;
use crate::storage::Storage;

/// Application state shared across all handlers
pub struct AppState<S> {
    /// Storage backend
    pub storage: Arc<S>,
    /// Reservation engine, publishing into `broadcaster`
    pub engine: ReservationEngine<S>,
    /// Per-expert slot event fan-out
    pub broadcaster: Arc<Broadcaster>,
    /// Settings
    pub settings: Arc<Settings>,
    /// Rate limiter for `/api`
    pub rate_limiter: Arc<RateLimiter>,
}

impl<S: Storage + 'static> AppState<S> {
    /// Wire storage, engine and broadcaster together
    pub fn new(storage: S, settings: Settings) -> Self {
        let storage = Arc::new(storage);
        let broadcaster = Arc::new(Broadcaster::new(settings.broadcast_capacity));
        let engine = ReservationEngine::new(storage.clone(), broadcaster.clone());
        let rate_limiter = Arc::new(RateLimiter::from_settings(&settings.rate_limit));

        Self {
            storage,
            engine,
            broadcaster,
            settings: Arc::new(settings),
            rate_limiter,
        }
    }
}
