//! Server-side ad insertion: picks a creative for each ad break and reports
//! playback progress.
//!
//! A break is resolved by the configured [`DecisionSource`] (remote ad server
//! or the local creative table). When that fails, a configured fallback is
//! picked at random, and when none exist a built-in default is returned, so
//! [`AdDecisionService::resolve`] always yields a decision.

mod local;
mod remote;
pub mod targeting;
mod tracking;

pub use local::LocalAdTable;
pub use remote::RemoteDecisionClient;
pub use targeting::derive_targeting;
pub use tracking::{BeaconKind, Tracker, TrackingFailure};

use crate::config::{AdDecisionConfig, DecisionStrategy};
use rand::seq::SliceRandom;
use spliceforge_common::{
    AdBreakRequest, AdDecision, AdType, EventBus, Quartile, ViewerContext,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_AD_ID: &str = "default-ad";
pub const DEFAULT_AD_URL: &str = "/ads/default-ad.mp4";

/// Why the primary decision source produced nothing.
#[derive(Debug, thiserror::Error)]
pub enum AdDecisionError {
    #[error("ad decision timed out after {0:?}")]
    Timeout(Duration),

    #[error("ad server returned {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("malformed ad decision: {0}")]
    MalformedResponse(String),

    #[error("ad server unreachable: {0}")]
    Transport(String),

    #[error("no local creative for {0}")]
    NoLocalEntry(AdType),
}

/// Something that can pick a creative for an ad break.
#[async_trait::async_trait]
pub trait DecisionSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn decide(
        &self,
        request: &AdBreakRequest,
        viewer: &ViewerContext,
    ) -> Result<AdDecision, AdDecisionError>;
}

pub struct AdDecisionService {
    source: Box<dyn DecisionSource>,
    fallbacks: Vec<AdDecision>,
    tracker: Arc<Tracker>,
}

impl AdDecisionService {
    pub fn new(
        source: Box<dyn DecisionSource>,
        fallbacks: Vec<AdDecision>,
        tracker: Arc<Tracker>,
    ) -> Self {
        Self {
            source,
            fallbacks,
            tracker,
        }
    }

    pub fn from_config(config: &AdDecisionConfig, bus: Arc<EventBus>) -> Self {
        let local = || -> Box<dyn DecisionSource> {
            Box::new(LocalAdTable::new(config.local.clone()))
        };

        let source = match (config.strategy, &config.endpoint) {
            (DecisionStrategy::Remote, Some(endpoint)) => {
                Box::new(RemoteDecisionClient::new(endpoint.clone(), config.timeout()))
                    as Box<dyn DecisionSource>
            }
            (DecisionStrategy::Remote, None) => {
                tracing::warn!("Remote ad decisions configured without an endpoint, using local table");
                local()
            }
            (DecisionStrategy::Local, _) => local(),
        };

        let tracker = Arc::new(Tracker::new(
            config.tracking_enabled,
            config.tracking_url.clone(),
            bus,
        ));

        Self::new(source, config.fallbacks.clone(), tracker)
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    /// Decide which creative fills `request`. Never fails.
    pub async fn resolve(&self, request: &AdBreakRequest, viewer: &ViewerContext) -> AdDecision {
        let mut decision = match self.source.decide(request, viewer).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    stream_id = %request.stream_id,
                    cue_id = %request.cue_id,
                    source = self.source.name(),
                    error = %e,
                    "Ad decision failed, using fallback"
                );
                self.fallback(request)
            }
        };

        if decision.targeting.is_none() {
            decision.targeting = Some(derive_targeting(viewer, &chrono::Local::now()));
        }
        if let Some(endpoints) = &decision.tracking {
            self.tracker
                .register(&request.stream_id, &decision.ad_id, endpoints.clone());
        }

        tracing::info!(
            stream_id = %request.stream_id,
            cue_id = %request.cue_id,
            ad_id = %decision.ad_id,
            "Resolved ad break"
        );
        decision
    }

    /// A configured fallback, or the built-in default when there are none.
    pub fn fallback(&self, request: &AdBreakRequest) -> AdDecision {
        self.fallbacks
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| default_decision(request))
    }

    /// Report playback progress for an ad. Fire and forget.
    pub fn track_event(
        &self,
        stream_id: &str,
        ad_id: &str,
        quartile: Quartile,
        viewer_id: Option<&str>,
    ) -> Option<JoinHandle<()>> {
        self.tracker.track(stream_id, ad_id, quartile, viewer_id)
    }

    /// Report that an ad was shown to `viewer`. Fire and forget.
    pub fn track_impression(
        &self,
        stream_id: &str,
        ad_id: &str,
        viewer: &ViewerContext,
    ) -> Option<JoinHandle<()>> {
        self.tracker.impression(stream_id, ad_id, viewer)
    }
}

/// Built-in decision used when nothing else is available.
pub fn default_decision(request: &AdBreakRequest) -> AdDecision {
    AdDecision {
        ad_id: DEFAULT_AD_ID.to_string(),
        ad_url: DEFAULT_AD_URL.to_string(),
        duration: request.duration,
        ad_type: request.ad_type,
        targeting: None,
        tracking: None,
    }
}
