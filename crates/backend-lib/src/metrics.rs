// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for Prometheus metric keys
pub const RESERVATION_CREATED: &str = "reservation.created";
pub const RESERVATION_CONFLICT: &str = "reservation.conflict";
pub const RESERVATION_COMPENSATED: &str = "reservation.compensated";
pub const RESERVATION_COMPENSATION_FAILED: &str = "reservation.compensation_failed";
pub const SLOT_EVENT_PUBLISHED: &str = "slot_event.published";
pub const WS_VIEWERS_ACTIVE: &str = "ws.viewers.active";
pub const HTTP_RATE_LIMITED: &str = "http.rate_limited";
pub const RECONCILE_REPAIRED: &str = "storage.reconcile.repaired";
pub const EXPERT_QUARANTINED: &str = "storage.expert.quarantined";
