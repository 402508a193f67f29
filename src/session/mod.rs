//! Live stream sessions.
//!
//! A [`SessionManager`] owns one [`StreamSession`] per stream. Each session
//! wraps a [`MarkerScheduler`] for its stream, a ticker task driving it from
//! the wall clock, and a cancellation token shared with the ad decisions it
//! spawned. Sessions can also be opened without a ticker and advanced
//! explicitly with [`SessionManager::tick_at`].

mod dispatch;
mod stream;

pub use stream::StreamSession;

use crate::config::Config;
use crate::scheduler::{MarkerScheduler, SchedulingError, TickReport};
use crate::ssai::AdDecisionService;
use dashmap::DashMap;
use dispatch::DecisionDispatcher;
use serde::Serialize;
use spliceforge_common::{AdMarker, EventBus, Quartile, SignalEvent, ViewerContext};
use spliceforge_media::manifest::{
    embed_dash_with, embed_hls_with, DashOptions, EmbeddedManifest, HlsOptions, ManifestSegment,
    Period,
};
use spliceforge_media::scte35::CueSettings;
use spliceforge_media::ManifestError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Stream '{0}' already has a running session")]
    AlreadyRunning(String),

    #[error("No session for stream '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// What was left over when a session stopped.
#[derive(Debug, Clone, Serialize)]
pub struct StopReport {
    pub stream_id: String,
    /// Markers still pending or caught mid-firing.
    pub incomplete: Vec<AdMarker>,
}

/// Session settings shared by every stream.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cue: CueSettings,
    pub tick_interval: Duration,
    pub hls: HlsOptions,
    pub dash: DashOptions,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        let cue = config.scte35.cue_settings();
        Self {
            cue,
            tick_interval: config.scheduler.tick_interval(),
            hls: config.manifest.hls_options(),
            dash: config.manifest.dash_options(cue),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct SessionManager {
    sessions: DashMap<String, Arc<StreamSession>>,
    settings: SessionSettings,
    decisions: Arc<AdDecisionService>,
    bus: Arc<EventBus>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings, decisions: Arc<AdDecisionService>, bus: Arc<EventBus>) -> Self {
        Self {
            sessions: DashMap::new(),
            settings,
            decisions,
            bus,
        }
    }

    pub fn from_config(config: &Config, bus: Arc<EventBus>) -> Self {
        let decisions = Arc::new(AdDecisionService::from_config(&config.ad_decision, Arc::clone(&bus)));
        Self::new(SessionSettings::from_config(config), decisions, bus)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn decisions(&self) -> &Arc<AdDecisionService> {
        &self.decisions
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start a session ticking from the wall clock. Requires a tokio runtime.
    pub fn start(
        &self,
        stream_id: &str,
        markers: Vec<AdMarker>,
        viewer: ViewerContext,
    ) -> Result<Arc<StreamSession>, SessionError> {
        let session = self.open(stream_id, markers, viewer)?;
        session.spawn_ticker(self.settings.tick_interval);

        tracing::info!(
            stream_id = %stream_id,
            tick_ms = self.settings.tick_interval.as_millis() as u64,
            "Started stream session"
        );
        Ok(session)
    }

    /// Open a session that only advances through [`tick_at`](Self::tick_at).
    pub fn open(
        &self,
        stream_id: &str,
        markers: Vec<AdMarker>,
        viewer: ViewerContext,
    ) -> Result<Arc<StreamSession>, SessionError> {
        if self.sessions.contains_key(stream_id) {
            return Err(SessionError::AlreadyRunning(stream_id.to_string()));
        }

        let cancel = CancellationToken::new();
        let dispatcher = DecisionDispatcher::new(
            Arc::clone(&self.decisions),
            Arc::clone(&self.bus),
            viewer.clone(),
            cancel.clone(),
        );

        let mut scheduler = MarkerScheduler::new(self.settings.cue, Arc::clone(&self.bus))
            .with_notifier(Arc::new(dispatcher));
        scheduler.seed(stream_id, markers)?;

        let session = Arc::new(StreamSession::new(
            stream_id.to_string(),
            viewer,
            scheduler,
            cancel,
        ));

        // Re-checked under the shard lock.
        match self.sessions.entry(stream_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(SessionError::AlreadyRunning(stream_id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    /// Stop a session. In-flight ad decisions are abandoned, not awaited.
    pub fn stop(&self, stream_id: &str) -> Result<StopReport, SessionError> {
        let (_, session) = self
            .sessions
            .remove(stream_id)
            .ok_or_else(|| SessionError::NotFound(stream_id.to_string()))?;

        session.shutdown();
        self.decisions.tracker().forget_stream(stream_id);
        let incomplete = session.incomplete();

        if incomplete.is_empty() {
            tracing::info!(stream_id = %stream_id, "Stopped stream session");
        } else {
            tracing::warn!(
                stream_id = %stream_id,
                incomplete = incomplete.len(),
                "Stopped stream session with unfinished markers"
            );
        }

        self.bus.publish(SignalEvent::SessionStopped {
            stream_id: stream_id.to_string(),
            incomplete: incomplete.clone(),
        });

        Ok(StopReport {
            stream_id: stream_id.to_string(),
            incomplete,
        })
    }

    /// Stop every session.
    pub fn stop_all(&self) -> Vec<StopReport> {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter_map(|id| self.stop(id).ok()).collect()
    }

    pub fn get(&self, stream_id: &str) -> Option<Arc<StreamSession>> {
        self.sessions.get(stream_id).map(|e| Arc::clone(e.value()))
    }

    pub fn stream_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session(&self, stream_id: &str) -> Result<Arc<StreamSession>, SessionError> {
        self.get(stream_id)
            .ok_or_else(|| SessionError::NotFound(stream_id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Markers
    // -----------------------------------------------------------------------

    pub fn seed(&self, stream_id: &str, markers: Vec<AdMarker>) -> Result<(), SessionError> {
        Ok(self.session(stream_id)?.seed(markers)?)
    }

    pub fn add(&self, stream_id: &str, marker: AdMarker) -> Result<(), SessionError> {
        Ok(self.session(stream_id)?.add(marker)?)
    }

    pub fn remove(&self, stream_id: &str, cue_id: &str) -> Result<Option<AdMarker>, SessionError> {
        Ok(self.session(stream_id)?.remove(cue_id)?)
    }

    pub fn tick_at(&self, stream_id: &str, elapsed_secs: f64) -> Result<TickReport, SessionError> {
        Ok(self.session(stream_id)?.tick_at(elapsed_secs)?)
    }

    pub fn markers(&self, stream_id: &str) -> Result<Vec<AdMarker>, SessionError> {
        Ok(self.session(stream_id)?.markers())
    }

    // -----------------------------------------------------------------------
    // Manifests and tracking
    // -----------------------------------------------------------------------

    /// Media playlist for `segments` with the stream's current markers.
    pub fn render_hls(
        &self,
        stream_id: &str,
        segments: &[ManifestSegment],
    ) -> Result<EmbeddedManifest, SessionError> {
        let markers = self.markers(stream_id)?;
        let manifest = embed_hls_with(segments, &markers, &self.settings.hls);
        self.publish_warnings(stream_id, &manifest);
        Ok(manifest)
    }

    /// MPD for `periods` with the stream's current markers.
    pub fn render_dash(
        &self,
        stream_id: &str,
        periods: &[Period],
    ) -> Result<EmbeddedManifest, SessionError> {
        let markers = self.markers(stream_id)?;
        let manifest = embed_dash_with(periods, &markers, &self.settings.dash)?;
        self.publish_warnings(stream_id, &manifest);
        Ok(manifest)
    }

    fn publish_warnings(&self, stream_id: &str, manifest: &EmbeddedManifest) {
        for warning in &manifest.warnings {
            tracing::warn!(
                stream_id = %stream_id,
                cue_id = %warning.marker.cue_id,
                reason = %warning.reason,
                "Manifest placement adjusted"
            );
            self.bus.publish(SignalEvent::ManifestWarning {
                stream_id: stream_id.to_string(),
                marker: warning.marker.clone(),
                reason: warning.reason.clone(),
            });
        }
    }

    /// Report ad playback progress on behalf of the stream's viewer.
    pub fn track(
        &self,
        stream_id: &str,
        ad_id: &str,
        quartile: Quartile,
    ) -> Result<Option<JoinHandle<()>>, SessionError> {
        let session = self.session(stream_id)?;
        Ok(self.decisions.track_event(
            stream_id,
            ad_id,
            quartile,
            session.viewer.viewer_id.as_deref(),
        ))
    }

    /// Report that an ad was shown to the stream's viewer.
    pub fn track_impression(
        &self,
        stream_id: &str,
        ad_id: &str,
    ) -> Result<Option<JoinHandle<()>>, SessionError> {
        let session = self.session(stream_id)?;
        Ok(self
            .decisions
            .track_impression(stream_id, ad_id, &session.viewer))
    }
}
