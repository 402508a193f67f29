//! Shared helpers for integration tests.
#![allow(dead_code)]

use spliceforge::common::{AdDecision, AdMarker, AdType, EventBus, SignalEvent};
use std::sync::Arc;
use std::time::Duration;

pub fn marker(cue_id: &str, start: f64, duration: f64, ad_type: AdType) -> AdMarker {
    AdMarker::new(format!("rec-{}", cue_id), cue_id, start, duration, ad_type)
}

pub fn bus() -> Arc<EventBus> {
    Arc::new(EventBus::new(256))
}

pub fn fallback(ad_id: &str, ad_type: AdType) -> AdDecision {
    AdDecision {
        ad_id: ad_id.to_string(),
        ad_url: format!("https://cdn.example/{}.mp4", ad_id),
        duration: 15.0,
        ad_type,
        targeting: None,
        tracking: None,
    }
}

/// Poll the bus history until `pred` matches an event of `stream_id`.
pub async fn wait_for_event<F>(bus: &EventBus, stream_id: &str, timeout: Duration, pred: F) -> Option<SignalEvent>
where
    F: Fn(&SignalEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(event) = bus.history_for(stream_id).into_iter().find(|e| pred(e)) {
            return Some(event);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
