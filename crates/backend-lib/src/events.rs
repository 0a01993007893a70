// ============================
// backend-lib/src/events.rs
// ============================
//! Slot event fan-out.
//!
//! One `tokio::sync::broadcast` channel per expert that currently has
//! viewers, held in a `DashMap`. Publishing never blocks and never fails the
//! caller: with no viewers the event is simply dropped, and a viewer that
//! falls behind sees `RecvError::Lagged` and is expected to re-read.

use dashmap::DashMap;
use slotbook_common::{ExpertId, SlotTakenEvent};
use tokio::sync::broadcast;
use tracing::debug;

use crate::metrics::{SLOT_EVENT_PUBLISHED, WS_VIEWERS_ACTIVE};

pub use tokio::sync::broadcast::error::RecvError;

/// Where the reservation engine sends committed slot events
pub trait SlotEventSink: Send + Sync {
    /// Deliver to current viewers of `event.expert_id`; returns how many
    /// subscribers the event reached.
    fn publish(&self, event: SlotTakenEvent) -> usize;
}

/// Per-expert broadcast registry
pub struct Broadcaster {
    channels: DashMap<ExpertId, broadcast::Sender<SlotTakenEvent>>,
    capacity: usize,
}

impl Broadcaster {
    /// `capacity` is the per-expert backlog a slow viewer may fall behind by
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Start receiving events for one expert
    pub fn subscribe(&self, expert_id: &str) -> SlotSubscription {
        let rx = self
            .channels
            .entry(expert_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        metrics::gauge!(WS_VIEWERS_ACTIVE).increment(1.0);

        SlotSubscription {
            expert_id: expert_id.to_string(),
            rx,
        }
    }

    /// Drop a subscription and forget the expert's channel once unwatched
    pub fn unsubscribe(&self, subscription: SlotSubscription) {
        let expert_id = subscription.expert_id.clone();
        drop(subscription);
        metrics::gauge!(WS_VIEWERS_ACTIVE).decrement(1.0);
        self.channels
            .remove_if(&expert_id, |_, tx| tx.receiver_count() == 0);
    }

    pub fn viewer_count(&self, expert_id: &str) -> usize {
        self.channels
            .get(expert_id)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Experts with at least one open channel
    pub fn watched_experts(&self) -> usize {
        self.channels.len()
    }
}

impl SlotEventSink for Broadcaster {
    fn publish(&self, event: SlotTakenEvent) -> usize {
        let expert_id = event.expert_id.clone();
        // clone the sender so no map guard is held across send/remove
        let Some(tx) = self.channels.get(&expert_id).map(|entry| entry.value().clone()) else {
            debug!(expert = %expert_id, "no viewers for slot event");
            return 0;
        };

        match tx.send(event) {
            Ok(delivered) => {
                metrics::counter!(SLOT_EVENT_PUBLISHED).increment(1);
                delivered
            },
            Err(_) => {
                self.channels
                    .remove_if(&expert_id, |_, tx| tx.receiver_count() == 0);
                0
            },
        }
    }
}

/// Receiving end for one expert's slot events
pub struct SlotSubscription {
    expert_id: ExpertId,
    rx: broadcast::Receiver<SlotTakenEvent>,
}

impl SlotSubscription {
    pub fn expert_id(&self) -> &str {
        &self.expert_id
    }

    /// Next event for this expert
    pub async fn recv(&mut self) -> Result<SlotTakenEvent, RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if event.expert_id == self.expert_id {
                return Ok(event);
            }
        }
    }

    /// Non-blocking variant, `None` when nothing is queued
    pub fn try_recv(&mut self) -> Option<SlotTakenEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.expert_id == self.expert_id => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(expert_id: &str) -> SlotTakenEvent {
        SlotTakenEvent {
            expert_id: expert_id.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 2, 25).unwrap(),
            time_slot: "10:00 AM".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fan_out_is_scoped_by_expert() {
        let broadcaster = Broadcaster::new(16);
        let mut viewer_a = broadcaster.subscribe("e1");
        let mut viewer_b = broadcaster.subscribe("e1");
        let mut other = broadcaster.subscribe("e2");

        assert_eq!(broadcaster.publish(event("e1")), 2);

        assert_eq!(viewer_a.recv().await.unwrap(), event("e1"));
        assert_eq!(viewer_b.recv().await.unwrap(), event("e1"));
        assert!(other.try_recv().is_none());
    }

    #[test]
    fn test_publish_without_viewers() {
        let broadcaster = Broadcaster::new(16);
        assert_eq!(broadcaster.publish(event("e1")), 0);
        assert_eq!(broadcaster.watched_experts(), 0);
    }

    #[test]
    fn test_unsubscribe_prunes_channel() {
        let broadcaster = Broadcaster::new(16);
        let first = broadcaster.subscribe("e1");
        let second = broadcaster.subscribe("e1");
        assert_eq!(broadcaster.viewer_count("e1"), 2);

        broadcaster.unsubscribe(first);
        assert_eq!(broadcaster.viewer_count("e1"), 1);
        assert_eq!(broadcaster.watched_experts(), 1);

        broadcaster.unsubscribe(second);
        assert_eq!(broadcaster.watched_experts(), 0);
    }

    #[test]
    fn test_dropped_viewer_channel_is_cleaned_on_publish() {
        let broadcaster = Broadcaster::new(16);
        drop(broadcaster.subscribe("e1"));
        assert_eq!(broadcaster.publish(event("e1")), 0);
        assert_eq!(broadcaster.watched_experts(), 0);
    }

    #[tokio::test]
    async fn test_slow_viewer_lags() {
        let broadcaster = Broadcaster::new(1);
        let mut viewer = broadcaster.subscribe("e1");
        broadcaster.publish(event("e1"));
        broadcaster.publish(event("e1"));

        assert!(matches!(viewer.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(viewer.recv().await.unwrap(), event("e1"));
    }
}
