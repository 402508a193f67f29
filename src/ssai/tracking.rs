//! Impression and quartile tracking beacons.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Serialize, Serializer};
use spliceforge_common::{EventBus, Quartile, SignalEvent, TrackingEndpoints, ViewerContext};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const BEACON_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RECORDED_FAILURES: usize = 256;

/// What a beacon reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconKind {
    Impression,
    Quartile(Quartile),
}

impl fmt::Display for BeaconKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Impression => write!(f, "impression"),
            Self::Quartile(q) => write!(f, "{}", q),
        }
    }
}

impl Serialize for BeaconKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A beacon that could not be delivered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingFailure {
    pub stream_id: String,
    pub ad_id: String,
    pub beacon: BeaconKind,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Beacon {
    stream_id: String,
    ad_id: String,
    event: BeaconKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    quartile: Option<Quartile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    viewer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    viewer_context: Option<ViewerContext>,
    timestamp: DateTime<Utc>,
}

/// Sends tracking beacons without blocking the caller.
///
/// Endpoints carried by decisions are kept per stream and per ad until the
/// ad's `complete` beacon goes out or the stream is forgotten.
pub struct Tracker {
    client: Client,
    enabled: bool,
    default_url: Option<String>,
    endpoints: DashMap<String, HashMap<String, TrackingEndpoints>>,
    failures: Mutex<VecDeque<TrackingFailure>>,
    bus: Arc<EventBus>,
}

impl Tracker {
    pub fn new(enabled: bool, default_url: Option<String>, bus: Arc<EventBus>) -> Self {
        let client = Client::builder()
            .timeout(BEACON_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client");
                Client::new()
            });

        Self {
            client,
            enabled,
            default_url,
            endpoints: DashMap::new(),
            failures: Mutex::new(VecDeque::new()),
            bus,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Remember the endpoints a decision for `stream_id` carried.
    pub fn register(&self, stream_id: &str, ad_id: &str, endpoints: TrackingEndpoints) {
        self.endpoints
            .entry(stream_id.to_string())
            .or_default()
            .insert(ad_id.to_string(), endpoints);
    }

    /// Drop every endpoint registered for `stream_id`.
    pub fn forget_stream(&self, stream_id: &str) {
        if let Some((_, ads)) = self.endpoints.remove(stream_id) {
            tracing::debug!(stream_id = %stream_id, ads = ads.len(), "Dropped tracking endpoints");
        }
    }

    /// Number of ads with registered endpoints on `stream_id`.
    pub fn registered(&self, stream_id: &str) -> usize {
        self.endpoints.get(stream_id).map(|ads| ads.len()).unwrap_or(0)
    }

    /// URL a beacon of `kind` for `ad_id` goes to.
    pub fn url_for(&self, stream_id: &str, ad_id: &str, kind: BeaconKind) -> Option<String> {
        self.endpoints
            .get(stream_id)
            .and_then(|ads| {
                let endpoints = ads.get(ad_id)?;
                match kind {
                    BeaconKind::Impression => endpoints.impression.clone(),
                    BeaconKind::Quartile(q) => endpoints.url_for(q).map(str::to_string),
                }
            })
            .or_else(|| self.default_url.clone())
    }

    /// Failed beacons, oldest first.
    pub fn failures(&self) -> Vec<TrackingFailure> {
        self.failures.lock().iter().cloned().collect()
    }

    fn record_failure(&self, stream_id: &str, ad_id: &str, beacon: BeaconKind, reason: String) {
        tracing::warn!(
            stream_id = %stream_id,
            ad_id = %ad_id,
            beacon = %beacon,
            reason = %reason,
            "Tracking beacon failed"
        );
        let mut failures = self.failures.lock();
        if failures.len() >= MAX_RECORDED_FAILURES {
            failures.pop_front();
        }
        failures.push_back(TrackingFailure {
            stream_id: stream_id.to_string(),
            ad_id: ad_id.to_string(),
            beacon,
            reason,
            at: Utc::now(),
        });
    }

    /// Queue a quartile beacon. Returns the delivery task, or `None` when
    /// nothing was sent (tracking disabled, no endpoint or no runtime).
    pub fn track(
        self: &Arc<Self>,
        stream_id: &str,
        ad_id: &str,
        quartile: Quartile,
        viewer_id: Option<&str>,
    ) -> Option<JoinHandle<()>> {
        let handle = self.send(Beacon {
            stream_id: stream_id.to_string(),
            ad_id: ad_id.to_string(),
            event: BeaconKind::Quartile(quartile),
            quartile: Some(quartile),
            viewer_id: viewer_id.map(str::to_string),
            viewer_context: None,
            timestamp: Utc::now(),
        });

        if quartile == Quartile::Complete {
            if let Some(mut ads) = self.endpoints.get_mut(stream_id) {
                ads.remove(ad_id);
            }
        }

        handle
    }

    /// Queue an impression beacon carrying the viewer context.
    pub fn impression(
        self: &Arc<Self>,
        stream_id: &str,
        ad_id: &str,
        viewer: &ViewerContext,
    ) -> Option<JoinHandle<()>> {
        self.send(Beacon {
            stream_id: stream_id.to_string(),
            ad_id: ad_id.to_string(),
            event: BeaconKind::Impression,
            quartile: None,
            viewer_id: viewer.viewer_id.clone(),
            viewer_context: Some(viewer.clone()),
            timestamp: Utc::now(),
        })
    }

    fn send(self: &Arc<Self>, beacon: Beacon) -> Option<JoinHandle<()>> {
        let kind = beacon.event;

        if !self.enabled {
            tracing::debug!(
                stream_id = %beacon.stream_id,
                ad_id = %beacon.ad_id,
                beacon = %kind,
                "Tracking disabled, dropping beacon"
            );
            return None;
        }

        let Some(url) = self.url_for(&beacon.stream_id, &beacon.ad_id, kind) else {
            self.record_failure(&beacon.stream_id, &beacon.ad_id, kind, "no tracking endpoint".into());
            return None;
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.record_failure(&beacon.stream_id, &beacon.ad_id, kind, "no async runtime".into());
            return None;
        };

        let tracker = Arc::clone(self);

        Some(handle.spawn(async move {
            match tracker.client.post(&url).json(&beacon).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(
                        stream_id = %beacon.stream_id,
                        ad_id = %beacon.ad_id,
                        beacon = %kind,
                        url = %url,
                        "Sent tracking beacon"
                    );
                    let event = match kind {
                        BeaconKind::Impression => SignalEvent::AdImpression {
                            stream_id: beacon.stream_id.clone(),
                            ad_id: beacon.ad_id.clone(),
                        },
                        BeaconKind::Quartile(quartile) => SignalEvent::AdTrackingSent {
                            stream_id: beacon.stream_id.clone(),
                            ad_id: beacon.ad_id.clone(),
                            quartile,
                        },
                    };
                    tracker.bus.publish(event);
                }
                Ok(response) => {
                    let reason = format!("HTTP {}", response.status());
                    tracker.record_failure(&beacon.stream_id, &beacon.ad_id, kind, reason);
                }
                Err(e) => {
                    tracker.record_failure(&beacon.stream_id, &beacon.ad_id, kind, e.to_string());
                }
            }
        }))
    }
}
