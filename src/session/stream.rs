use crate::scheduler::{MarkerScheduler, SchedulingError, TickReport};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use spliceforge_common::{AdMarker, ViewerContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Execution context of one live stream.
///
/// The scheduler lives behind a per-session mutex, so streams never contend
/// with each other.
pub struct StreamSession {
    pub stream_id: String,
    pub viewer: ViewerContext,
    scheduler: Mutex<MarkerScheduler>,
    cancel: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("stream_id", &self.stream_id)
            .field("viewer", &self.viewer)
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    pub(crate) fn new(
        stream_id: String,
        viewer: ViewerContext,
        scheduler: MarkerScheduler,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream_id,
            viewer,
            scheduler: Mutex::new(scheduler),
            cancel,
            ticker: Mutex::new(None),
        }
    }

    /// Wall-clock instant of stream time zero.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.scheduler
            .lock()
            .timeline(&self.stream_id)
            .map(|t| t.started_at)
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Advance to an explicit stream time.
    pub fn tick_at(&self, elapsed_secs: f64) -> Result<TickReport, SchedulingError> {
        self.scheduler.lock().tick(&self.stream_id, elapsed_secs)
    }

    /// Advance to the current wall-clock stream time.
    pub fn tick_now(&self) -> Result<TickReport, SchedulingError> {
        let mut scheduler = self.scheduler.lock();
        let elapsed = scheduler
            .timeline(&self.stream_id)
            .map(|t| t.elapsed_at(Utc::now()))
            .ok_or_else(|| SchedulingError::UnknownStream(self.stream_id.clone()))?;
        scheduler.tick(&self.stream_id, elapsed)
    }

    pub fn add(&self, marker: AdMarker) -> Result<(), SchedulingError> {
        self.scheduler.lock().add(&self.stream_id, marker)
    }

    pub fn remove(&self, cue_id: &str) -> Result<Option<AdMarker>, SchedulingError> {
        self.scheduler.lock().remove(&self.stream_id, cue_id)
    }

    /// Replace the pending markers; fired markers and the stream clock stay.
    pub fn seed(&self, markers: Vec<AdMarker>) -> Result<(), SchedulingError> {
        self.scheduler.lock().seed(&self.stream_id, markers)
    }

    /// Snapshot of the markers in timeline order.
    pub fn markers(&self) -> Vec<AdMarker> {
        self.scheduler
            .lock()
            .markers(&self.stream_id)
            .unwrap_or_default()
    }

    pub(crate) fn incomplete(&self) -> Vec<AdMarker> {
        self.scheduler.lock().incomplete(&self.stream_id)
    }

    /// Drive [`tick_now`](Self::tick_now) every `period` until stopped.
    pub(crate) fn spawn_ticker(self: &Arc<Self>, period: Duration) {
        let session = Arc::clone(self);
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        match session.tick_now() {
                            Ok(report) if !report.is_empty() => {
                                tracing::debug!(
                                    stream_id = %session.stream_id,
                                    fired = report.fired.len(),
                                    failed = report.failed.len(),
                                    retrying = report.retrying.len(),
                                    "Tick"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!(stream_id = %session.stream_id, error = %e, "Tick failed");
                            }
                        }
                    }
                }
            }

            tracing::debug!(stream_id = %session.stream_id, "Ticker stopped");
        });

        *self.ticker.lock() = Some(handle);
    }

    /// Cancel in-flight work and stop the ticker without awaiting either.
    pub(crate) fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
        }
    }
}
