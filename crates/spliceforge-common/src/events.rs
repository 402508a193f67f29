//! Signaling event system.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events. It is the outbound queue between the
//! signaling core and whatever transport delivers events to clients:
//! "emit" means "enqueue for delivery".

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ad::{AdBreakRequest, AdDecision, Quartile};
use crate::types::AdMarker;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 512;

// ---------------------------------------------------------------------------
// SignalEvent
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalEvent {
    // -- Marker lifecycle ----------------------------------------------------
    MarkerFired {
        stream_id: String,
        marker: AdMarker,
        /// The 188-byte transport packet carrying the cue.
        encoded: Vec<u8>,
    },
    MarkerFailed {
        stream_id: String,
        marker: AdMarker,
        reason: String,
    },

    // -- Ad decisioning ------------------------------------------------------
    AdDecisionResolved {
        stream_id: String,
        ad_break: AdBreakRequest,
        decision: AdDecision,
    },
    AdTrackingSent {
        stream_id: String,
        ad_id: String,
        quartile: Quartile,
    },
    AdImpression {
        stream_id: String,
        ad_id: String,
    },

    // -- Manifests -----------------------------------------------------------
    ManifestWarning {
        stream_id: String,
        marker: AdMarker,
        reason: String,
    },

    // -- Session -------------------------------------------------------------
    /// A session stopped with markers that never completed.
    SessionStopped {
        stream_id: String,
        incomplete: Vec<AdMarker>,
    },
}

impl SignalEvent {
    /// Stream the event belongs to.
    pub fn stream_id(&self) -> &str {
        match self {
            SignalEvent::MarkerFired { stream_id, .. }
            | SignalEvent::MarkerFailed { stream_id, .. }
            | SignalEvent::AdDecisionResolved { stream_id, .. }
            | SignalEvent::AdTrackingSent { stream_id, .. }
            | SignalEvent::AdImpression { stream_id, .. }
            | SignalEvent::ManifestWarning { stream_id, .. }
            | SignalEvent::SessionStopped { stream_id, .. } => stream_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: SignalEvent,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: SignalEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Enqueue an event for every current subscriber and store it in the
    /// ring buffer.
    pub fn publish(&self, payload: SignalEvent) {
        let event = Event::new(payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // Ignore send errors (no subscribers).
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }

    /// Recent events for one stream, oldest first.
    pub fn history_for(&self, stream_id: &str) -> Vec<SignalEvent> {
        let recent = self.recent.read();
        recent
            .iter()
            .rev()
            .filter(|e| e.payload.stream_id() == stream_id)
            .map(|e| e.payload.clone())
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AdType;

    fn marker() -> AdMarker {
        AdMarker::new("m", "cue-1", 10.0, 30.0, AdType::ProviderAd)
    }

    #[test]
    fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(SignalEvent::MarkerFailed {
            stream_id: "s1".into(),
            marker: marker(),
            reason: "boom".into(),
        });

        let event = rx.try_recv().unwrap();
        match &event.payload {
            SignalEvent::MarkerFailed { reason, .. } => assert_eq!(reason, "boom"),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(8);
        for i in 0..(MAX_RECENT_EVENTS + 20) {
            bus.publish(SignalEvent::AdTrackingSent {
                stream_id: "s1".into(),
                ad_id: format!("ad-{}", i),
                quartile: Quartile::Start,
            });
        }
        assert_eq!(bus.recent_events(usize::MAX).len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn history_is_per_stream_and_oldest_first() {
        let bus = EventBus::default();
        for (stream, ad) in [("a", "1"), ("b", "2"), ("a", "3")] {
            bus.publish(SignalEvent::AdTrackingSent {
                stream_id: stream.into(),
                ad_id: ad.into(),
                quartile: Quartile::Complete,
            });
        }

        let history = bus.history_for("a");
        let ids: Vec<_> = history
            .iter()
            .map(|e| match e {
                SignalEvent::AdTrackingSent { ad_id, .. } => ad_id.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(SignalEvent::SessionStopped {
            stream_id: "s".into(),
            incomplete: vec![],
        });
        assert_eq!(bus.recent_events(10).len(), 1);
    }

    #[test]
    fn event_json_is_tagged() {
        let event = Event::new(SignalEvent::ManifestWarning {
            stream_id: "s".into(),
            marker: marker(),
            reason: "clamped".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["type"], "manifest_warning");
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, event.id);
    }
}
