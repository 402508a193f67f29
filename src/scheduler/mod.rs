//! Marker scheduling.
//!
//! [`MarkerScheduler`] owns one [`StreamTimeline`] per stream and advances it
//! when driven by [`MarkerScheduler::tick`]. Each marker moves through
//! `Pending -> Firing -> Inserted | Failed` exactly once. The scheduler does
//! no I/O of its own: encoded cues and failures are published on the
//! [`EventBus`], and ad breaks are handed to an [`AdBreakNotifier`].

mod timeline;

pub use timeline::StreamTimeline;

use std::collections::HashMap;
use std::sync::Arc;

use spliceforge_common::{AdBreakRequest, AdMarker, EventBus, MarkerState, SignalEvent};
use spliceforge_media::scte35::{encode_marker, CueSettings, PacketOptions};
use thiserror::Error;

/// Errors returned synchronously by marker ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulingError {
    #[error("Cue id '{cue_id}' already exists on stream '{stream_id}'")]
    DuplicateCueId { stream_id: String, cue_id: String },

    #[error("No marker with cue id '{cue_id}' on stream '{stream_id}'")]
    UnknownMarker { stream_id: String, cue_id: String },

    #[error("Stream '{0}' has no timeline")]
    UnknownStream(String),

    #[error("Marker '{cue_id}' rejected: {reason}")]
    InvalidMarker { cue_id: String, reason: String },
}

/// Receives every ad break as its marker fires.
///
/// Implementations must return quickly; the tick waits for `notify`.
pub trait AdBreakNotifier: Send + Sync {
    fn notify(&self, request: AdBreakRequest);
}

/// Outcome of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Markers that reached `Inserted`, in firing order.
    pub fired: Vec<AdMarker>,
    /// Markers that reached `Failed`, in firing order.
    pub failed: Vec<AdMarker>,
    /// Markers whose first encode failed; they are retried on the next tick.
    pub retrying: Vec<AdMarker>,
    /// Ad breaks announced this tick. A retried marker is announced only on
    /// its first attempt.
    pub announced: usize,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty() && self.failed.is_empty() && self.retrying.is_empty()
    }


    /// Cue ids of every marker handled, in firing order.
    pub fn cue_ids(&self) -> Vec<&str> {
        let mut all: Vec<&AdMarker> = self
            .fired
            .iter()
            .chain(&self.failed)
            .chain(&self.retrying)
            .collect();
        all.sort_by(|a, b| a.timeline_cmp(b));
        all.into_iter().map(|m| m.cue_id.as_str()).collect()
    }
}

/// Scheduler state for any number of streams.
pub struct MarkerScheduler {
    timelines: HashMap<String, StreamTimeline>,
    cue: CueSettings,
    bus: Arc<EventBus>,
    notifier: Option<Arc<dyn AdBreakNotifier>>,
}

impl MarkerScheduler {
    pub fn new(cue: CueSettings, bus: Arc<EventBus>) -> Self {
        Self {
            timelines: HashMap::new(),
            cue,
            bus,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn AdBreakNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn cue_settings(&self) -> &CueSettings {
        &self.cue
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Initialize the timeline of `stream_id`, or replace its pending markers.
    ///
    /// All markers are validated before anything is replaced. On an existing
    /// timeline the stream clock, the continuity counter and every marker
    /// that already left `Pending` are kept; a seeded marker reusing one of
    /// those cue ids is ignored so it can never fire twice.
    pub fn seed(&mut self, stream_id: &str, markers: Vec<AdMarker>) -> Result<(), SchedulingError> {
        let mut incoming: Vec<AdMarker> = Vec::with_capacity(markers.len());
        for marker in markers {
            check_marker(&marker)?;
            if incoming.iter().any(|m| m.cue_id == marker.cue_id) {
                return Err(SchedulingError::DuplicateCueId {
                    stream_id: stream_id.to_string(),
                    cue_id: marker.cue_id,
                });
            }
            incoming.push(marker);
        }

        let timeline = self
            .timelines
            .entry(stream_id.to_string())
            .or_insert_with(|| StreamTimeline::new(stream_id));
        let kept = timeline.retain_started();

        let mut ignored = 0;
        for mut marker in incoming {
            if timeline.contains(&marker.cue_id) {
                tracing::debug!(
                    stream_id = %stream_id,
                    cue_id = %marker.cue_id,
                    "Ignoring seeded marker that already fired"
                );
                ignored += 1;
                continue;
            }
            marker.state = MarkerState::Pending;
            timeline.insert(marker);
        }

        tracing::info!(
            stream_id = %stream_id,
            markers = timeline.len(),
            kept,
            ignored,
            "Seeded stream timeline"
        );

        Ok(())
    }

    /// Add a marker to an existing timeline.
    pub fn add(&mut self, stream_id: &str, mut marker: AdMarker) -> Result<(), SchedulingError> {
        check_marker(&marker)?;
        let timeline = self.timeline_mut(stream_id)?;

        if timeline.contains(&marker.cue_id) {
            return Err(SchedulingError::DuplicateCueId {
                stream_id: stream_id.to_string(),
                cue_id: marker.cue_id,
            });
        }

        if let Some(last) = timeline.last_tick() {
            if marker.is_due(last) {
                tracing::debug!(
                    stream_id = %stream_id,
                    cue_id = %marker.cue_id,
                    "Marker added behind the stream clock; fires on next tick"
                );
            }
        }

        tracing::debug!(stream_id = %stream_id, cue_id = %marker.cue_id, "Added marker");
        marker.state = MarkerState::Pending;
        timeline.insert(marker);
        Ok(())
    }

    /// Cancel a pending marker.
    ///
    /// Returns the removed marker, or `None` when the marker has already
    /// started firing (the removal is ignored).
    pub fn remove(&mut self, stream_id: &str, cue_id: &str) -> Result<Option<AdMarker>, SchedulingError> {
        let timeline = self.timeline_mut(stream_id)?;

        let state = timeline
            .get(cue_id)
            .map(|m| m.state)
            .ok_or_else(|| SchedulingError::UnknownMarker {
                stream_id: stream_id.to_string(),
                cue_id: cue_id.to_string(),
            })?;

        if state != MarkerState::Pending {
            tracing::debug!(
                stream_id = %stream_id,
                cue_id = %cue_id,
                state = %state,
                "Ignoring removal of a marker that already fired"
            );
            return Ok(None);
        }

        tracing::debug!(stream_id = %stream_id, cue_id = %cue_id, "Removed marker");
        Ok(timeline.take(cue_id))
    }

    // -----------------------------------------------------------------------
    // Firing
    // -----------------------------------------------------------------------

    /// Fire every pending marker with `start_time <= elapsed_secs`.
    pub fn tick(&mut self, stream_id: &str, elapsed_secs: f64) -> Result<TickReport, SchedulingError> {
        let cue = self.cue;
        let bus = Arc::clone(&self.bus);
        let notifier = self.notifier.clone();
        let timeline = self.timeline_mut(stream_id)?;

        if let Some(previous) = timeline.record_tick(elapsed_secs) {
            if elapsed_secs < previous {
                tracing::warn!(
                    stream_id = %stream_id,
                    previous,
                    elapsed = elapsed_secs,
                    "Stream clock moved backwards"
                );
            }
        }

        let mut report = TickReport::default();

        for index in timeline.due(elapsed_secs) {
            timeline.marker_mut(index).state = MarkerState::Firing;
            let marker = timeline.marker_mut(index).clone();

            tracing::info!(
                stream_id = %stream_id,
                cue_id = %marker.cue_id,
                start_time = marker.start_time,
                elapsed = elapsed_secs,
                "Firing marker"
            );

            let settings = CueSettings {
                packet: PacketOptions {
                    continuity_counter: timeline.continuity_counter(),
                    ..cue.packet
                },
                ..cue
            };

            let retry = timeline.has_retried(&marker.cue_id);
            let outcome = encode_marker(&marker, &settings);

            if !retry {
                report.announced += 1;
                if let Some(ref notifier) = notifier {
                    notifier.notify(AdBreakRequest::from_marker(stream_id, &marker));
                }
            }

            match outcome {
                Ok(packet) => {
                    timeline.advance_continuity_counter();
                    let marker = timeline.marker_mut(index);
                    marker.state = MarkerState::Inserted;
                    bus.publish(SignalEvent::MarkerFired {
                        stream_id: stream_id.to_string(),
                        marker: marker.clone(),
                        encoded: packet,
                    });
                    report.fired.push(marker.clone());
                }
                Err(e) if !retry => {
                    timeline.mark_retried(&marker.cue_id);
                    let marker = timeline.marker_mut(index);
                    tracing::warn!(
                        stream_id = %stream_id,
                        cue_id = %marker.cue_id,
                        error = %e,
                        "Encode failed, retrying on next tick"
                    );
                    marker.state = MarkerState::Pending;
                    report.retrying.push(marker.clone());
                }
                Err(e) => {
                    let marker = timeline.marker_mut(index);
                    tracing::error!(
                        stream_id = %stream_id,
                        cue_id = %marker.cue_id,
                        error = %e,
                        "Marker failed to encode"
                    );
                    marker.state = MarkerState::Failed;
                    bus.publish(SignalEvent::MarkerFailed {
                        stream_id: stream_id.to_string(),
                        marker: marker.clone(),
                        reason: e.to_string(),
                    });
                    report.failed.push(marker.clone());
                }
            }
        }

        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Snapshot of a stream's markers in timeline order.
    pub fn markers(&self, stream_id: &str) -> Option<Vec<AdMarker>> {
        self.timelines.get(stream_id).map(|t| t.markers().to_vec())
    }

    pub fn timeline(&self, stream_id: &str) -> Option<&StreamTimeline> {
        self.timelines.get(stream_id)
    }

    /// Markers of a stream that have not reached a terminal state.
    pub fn incomplete(&self, stream_id: &str) -> Vec<AdMarker> {
        self.timelines
            .get(stream_id)
            .map(|t| t.unfinished().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget a stream, returning its timeline.
    pub fn drop_stream(&mut self, stream_id: &str) -> Option<StreamTimeline> {
        self.timelines.remove(stream_id)
    }

    pub fn streams(&self) -> impl Iterator<Item = &str> {
        self.timelines.keys().map(String::as_str)
    }

    fn timeline_mut(&mut self, stream_id: &str) -> Result<&mut StreamTimeline, SchedulingError> {
        self.timelines
            .get_mut(stream_id)
            .ok_or_else(|| SchedulingError::UnknownStream(stream_id.to_string()))
    }
}

fn check_marker(marker: &AdMarker) -> Result<(), SchedulingError> {
    match marker.validate() {
        Some(reason) => Err(SchedulingError::InvalidMarker {
            cue_id: marker.cue_id.clone(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use spliceforge_common::AdType;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl AdBreakNotifier for Recorder {
        fn notify(&self, request: AdBreakRequest) {
            self.0.lock().push(request.cue_id);
        }
    }

    fn marker(cue: &str, start: f64) -> AdMarker {
        AdMarker::new(format!("id-{}", cue), cue, start, 30.0, AdType::ProviderAd)
    }

    fn scheduler() -> (MarkerScheduler, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(64));
        (MarkerScheduler::new(CueSettings::default(), Arc::clone(&bus)), bus)
    }

    #[test]
    fn fires_at_start_time_not_before() {
        let (mut s, bus) = scheduler();
        s.seed("s1", vec![marker("cue-1", 10.0)]).unwrap();

        assert!(s.tick("s1", 9.0).unwrap().is_empty());
        let report = s.tick("s1", 10.0).unwrap();
        assert_eq!(report.cue_ids(), vec!["cue-1"]);
        assert!(s.tick("s1", 11.0).unwrap().is_empty());

        let history = bus.history_for("s1");
        assert_eq!(history.len(), 1);
        assert!(matches!(
            &history[0],
            SignalEvent::MarkerFired { encoded, .. } if encoded.len() == 188
        ));
        assert_eq!(s.markers("s1").unwrap()[0].state, MarkerState::Inserted);
    }

    #[test]
    fn ties_fire_in_cue_id_order() {
        for _ in 0..5 {
            let (mut s, _) = scheduler();
            s.seed("s1", vec![marker("cue-2", 10.0), marker("cue-1", 10.0)]).unwrap();
            assert_eq!(s.tick("s1", 10.0).unwrap().cue_ids(), vec!["cue-1", "cue-2"]);
        }
    }

    #[test]
    fn backlog_fires_in_one_tick() {
        let (mut s, _) = scheduler();
        s.seed(
            "s1",
            vec![marker("a", 1.0), marker("b", 2.0), marker("c", 3.0), marker("d", 50.0)],
        )
        .unwrap();

        assert_eq!(s.tick("s1", 5.0).unwrap().cue_ids(), vec!["a", "b", "c"]);
        assert_eq!(s.incomplete("s1").len(), 1);
    }

    #[test]
    fn notifier_sees_every_firing_marker() {
        let recorder = Arc::new(Recorder::default());
        let (s, _) = scheduler();
        let mut s = s.with_notifier(recorder.clone());
        s.seed("s1", vec![marker("a", 1.0), marker("b", 1.0)]).unwrap();
        s.tick("s1", 1.0).unwrap();
        assert_eq!(*recorder.0.lock(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn encode_failure_retries_once_on_next_tick() {
        let recorder = Arc::new(Recorder::default());
        let (s, bus) = scheduler();
        let mut s = s.with_notifier(recorder.clone());
        // 100000s overflows the 33-bit break_duration field
        let too_long = AdMarker::new("x", "bad", 1.0, 100_000.0, AdType::LocalAd);
        s.seed("s1", vec![too_long, marker("good", 1.0)]).unwrap();

        let report = s.tick("s1", 1.0).unwrap();
        assert_eq!(report.fired.len(), 1);
        assert_eq!(report.retrying.len(), 1);
        assert!(report.failed.is_empty());
        assert_eq!(report.announced, 2);
        assert_eq!(s.timeline("s1").unwrap().get("bad").unwrap().state, MarkerState::Pending);

        let failed_events = || {
            bus.history_for("s1")
                .into_iter()
                .filter(|e| matches!(e, SignalEvent::MarkerFailed { .. }))
                .count()
        };
        assert_eq!(failed_events(), 0);

        let report = s.tick("s1", 2.0).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].state, MarkerState::Failed);
        assert_eq!(report.announced, 0);
        assert_eq!(failed_events(), 1);

        // Terminal: never retried again, and announced only once
        assert!(s.tick("s1", 3.0).unwrap().is_empty());
        assert_eq!(*recorder.0.lock(), vec!["bad".to_string(), "good".to_string()]);
    }

    #[test]
    fn reseed_keeps_fired_markers_and_clock() {
        let (mut s, bus) = scheduler();
        s.seed("s1", vec![marker("cue-1", 10.0), marker("cue-2", 20.0)]).unwrap();
        let started_at = s.timeline("s1").unwrap().started_at;
        s.tick("s1", 10.0).unwrap();

        s.seed("s1", vec![marker("cue-1", 10.0), marker("cue-3", 15.0)]).unwrap();

        let timeline = s.timeline("s1").unwrap();
        assert_eq!(timeline.started_at, started_at);
        assert_eq!(timeline.continuity_counter(), 1);
        assert_eq!(timeline.get("cue-1").unwrap().state, MarkerState::Inserted);
        assert!(!timeline.contains("cue-2"));

        assert!(s.tick("s1", 10.0).unwrap().is_empty());
        assert_eq!(s.tick("s1", 20.0).unwrap().cue_ids(), vec!["cue-3"]);

        let fired: Vec<String> = bus
            .history_for("s1")
            .into_iter()
            .filter_map(|e| match e {
                SignalEvent::MarkerFired { marker, .. } => Some(marker.cue_id),
                _ => None,
            })
            .collect();
        assert_eq!(fired, vec!["cue-1", "cue-3"]);
    }

    #[test]
    fn duplicate_cue_ids_rejected() {
        let (mut s, _) = scheduler();
        assert!(matches!(
            s.seed("s1", vec![marker("a", 1.0), marker("a", 2.0)]),
            Err(SchedulingError::DuplicateCueId { .. })
        ));

        s.seed("s1", vec![marker("a", 1.0)]).unwrap();
        assert_eq!(
            s.add("s1", marker("a", 5.0)),
            Err(SchedulingError::DuplicateCueId {
                stream_id: "s1".into(),
                cue_id: "a".into()
            })
        );
    }

    #[test]
    fn invalid_marker_rejected() {
        let (mut s, _) = scheduler();
        s.seed("s1", vec![]).unwrap();
        let err = s.add("s1", marker("a", -1.0)).unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidMarker { .. }));
    }

    #[test]
    fn remove_only_while_pending() {
        let (mut s, _) = scheduler();
        s.seed("s1", vec![marker("a", 1.0), marker("b", 10.0)]).unwrap();
        s.tick("s1", 1.0).unwrap();

        assert_eq!(s.remove("s1", "a").unwrap(), None);
        assert_eq!(s.remove("s1", "b").unwrap().unwrap().cue_id, "b");
        assert!(matches!(
            s.remove("s1", "b"),
            Err(SchedulingError::UnknownMarker { .. })
        ));
        assert!(s.tick("s1", 20.0).unwrap().is_empty());
    }

    #[test]
    fn unknown_stream() {
        let (mut s, _) = scheduler();
        assert_eq!(
            s.tick("nope", 1.0).unwrap_err(),
            SchedulingError::UnknownStream("nope".into())
        );
    }

    #[test]
    fn streams_are_independent() {
        let (mut s, bus) = scheduler();
        s.seed("a", vec![marker("cue-1", 5.0)]).unwrap();
        s.seed("b", vec![marker("cue-1", 5.0)]).unwrap();

        s.tick("a", 5.0).unwrap();
        assert_eq!(bus.history_for("a").len(), 1);
        assert!(bus.history_for("b").is_empty());
        assert_eq!(s.markers("b").unwrap()[0].state, MarkerState::Pending);
    }

    #[test]
    fn continuity_counter_advances_per_packet() {
        let (mut s, bus) = scheduler();
        s.seed("s1", vec![marker("a", 1.0), marker("b", 2.0)]).unwrap();
        s.tick("s1", 2.0).unwrap();

        let counters: Vec<u8> = bus
            .history_for("s1")
            .iter()
            .filter_map(|e| match e {
                SignalEvent::MarkerFired { encoded, .. } => Some(encoded[3] & 0x0F),
                _ => None,
            })
            .collect();
        assert_eq!(counters, vec![0, 1]);
    }
}
