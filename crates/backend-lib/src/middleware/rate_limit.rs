// ============================
// crates/backend-lib/src/middleware/rate_limit.rs
// ============================
//! Fixed-window request limiter for the JSON API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::RateLimitSettings;
use crate::error::AppError;
use crate::metrics::HTTP_RATE_LIMITED;
use crate::storage::Storage;
use crate::AppState;

const CLIENT_IP_HEADER: &str = "x-real-ip";
const UNKNOWN_CLIENT: &str = "unknown";

/// Requests seen from one client in the current window
#[derive(Debug)]
struct RateLimitEntry {
    requests: u32,
    window_start: Instant,
}

/// Per-client fixed-window counter
///
/// Keys come from a client-supplied header, so the map is swept of closed
/// windows whenever a new client shows up while it holds more than
/// `max_tracked` entries.
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    window: Duration,
    max_requests: u32,
    max_tracked: usize,
    last_prune: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32, max_tracked: usize) -> Self {
        Self {
            entries: DashMap::new(),
            window,
            max_requests,
            max_tracked,
            last_prune: Mutex::new(Instant::now()),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(
            Duration::from_secs(settings.window_secs),
            settings.max_requests,
            settings.max_tracked_clients,
        )
    }

    /// Count one request for `client`; false once the window's budget is spent
    pub fn check(&self, client: &str) -> bool {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> bool {
        // sweep before taking the entry guard; retain locks every shard
        if self.entries.len() >= self.max_tracked && !self.entries.contains_key(client) {
            self.maybe_prune(now);
        }

        let mut entry = self.entries.entry(client.to_string()).or_insert_with(|| RateLimitEntry {
            requests: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.requests = 0;
            entry.window_start = now;
        }

        if entry.requests >= self.max_requests {
            return false;
        }
        entry.requests += 1;
        true
    }

    /// Sweep at most once per window
    fn maybe_prune(&self, now: Instant) {
        {
            let mut last = self.last_prune.lock();
            if now.saturating_duration_since(*last) < self.window {
                return;
            }
            *last = now;
        }
        let before = self.entries.len();
        self.prune_at(now);
        debug!(before, after = self.entries.len(), "pruned rate limit entries");
    }

    /// Drop entries whose window has closed
    fn prune_at(&self, now: Instant) {
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.window_start) < self.window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.entries.len()
    }
}

/// Rate limiter middleware
pub async fn rate_limit<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let client = request
        .headers()
        .get(CLIENT_IP_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or(UNKNOWN_CLIENT);

    if !state.rate_limiter.check(client) {
        metrics::counter!(HTTP_RATE_LIMITED).increment(1);
        warn!(client, path = %request.uri().path(), "rate limit exceeded");
        return Err(AppError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_per_client() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2, 100);
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(Duration::from_secs(1), 1, 100);
        let start = Instant::now();
        assert!(limiter.check_at("a", start));
        assert!(!limiter.check_at("a", start + Duration::from_millis(500)));
        assert!(limiter.check_at("a", start + Duration::from_secs(1)));
    }

    #[test]
    fn test_prune_expired() {
        let limiter = RateLimiter::new(Duration::from_millis(0), 1, 100);
        limiter.check("a");
        limiter.prune_at(Instant::now());
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_new_client_sweeps_closed_windows_past_the_cap() {
        let limiter = RateLimiter::new(Duration::from_secs(1), 5, 3);
        let start = Instant::now();
        for client in ["a", "b", "c"] {
            assert!(limiter.check_at(client, start));
        }
        // under one window nothing has expired yet
        assert!(limiter.check_at("d", start + Duration::from_millis(10)));
        assert_eq!(limiter.tracked_clients(), 4);

        let later = start + Duration::from_secs(2);
        // a known client never triggers a sweep
        assert!(limiter.check_at("a", later));
        assert_eq!(limiter.tracked_clients(), 4);

        assert!(limiter.check_at("e", later));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_sweep_runs_once_per_window() {
        let limiter = RateLimiter::new(Duration::from_secs(1), 5, 1);
        let start = Instant::now();
        assert!(limiter.check_at("a", start + Duration::from_secs(2)));
        assert!(limiter.check_at("b", start + Duration::from_secs(4)));
        assert_eq!(limiter.tracked_clients(), 1);
        // the last sweep was just now, so this one is skipped
        assert!(limiter.check_at("c", start + Duration::from_millis(4500)));
        assert_eq!(limiter.tracked_clients(), 2);
    }
}
