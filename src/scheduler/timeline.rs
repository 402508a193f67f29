//! Per-stream marker timeline.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use spliceforge_common::{AdMarker, MarkerState};

/// Markers of one stream, kept sorted by `(start_time, cue_id)`.
#[derive(Debug, Clone)]
pub struct StreamTimeline {
    pub stream_id: String,
    /// Wall-clock instant of stream time zero.
    pub started_at: DateTime<Utc>,
    markers: Vec<AdMarker>,
    continuity_counter: u8,
    last_tick: Option<f64>,
    /// Cue ids that already used their encode retry.
    retried: HashSet<String>,
}

impl StreamTimeline {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self::starting_at(stream_id, Utc::now())
    }

    pub fn starting_at(stream_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            stream_id: stream_id.into(),
            started_at,
            markers: Vec::new(),
            continuity_counter: 0,
            last_tick: None,
            retried: HashSet::new(),
        }
    }

    pub fn markers(&self) -> &[AdMarker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn contains(&self, cue_id: &str) -> bool {
        self.markers.iter().any(|m| m.cue_id == cue_id)
    }

    pub fn get(&self, cue_id: &str) -> Option<&AdMarker> {
        self.markers.iter().find(|m| m.cue_id == cue_id)
    }

    /// Insert keeping timeline order. The caller checks cue id uniqueness.
    pub(crate) fn insert(&mut self, marker: AdMarker) {
        let at = self
            .markers
            .partition_point(|m| m.timeline_cmp(&marker).is_lt());
        self.markers.insert(at, marker);
    }

    /// Remove a marker by cue id, whatever its state.
    pub(crate) fn take(&mut self, cue_id: &str) -> Option<AdMarker> {
        let index = self.markers.iter().position(|m| m.cue_id == cue_id)?;
        self.retried.remove(cue_id);
        Some(self.markers.remove(index))
    }

    /// Drop every pending marker, keeping those that started firing.
    /// Returns the number of markers kept.
    pub(crate) fn retain_started(&mut self) -> usize {
        self.markers.retain(|m| m.state != MarkerState::Pending);
        self.markers.len()
    }

    /// Whether `cue_id` already spent its encode retry.
    pub(crate) fn has_retried(&self, cue_id: &str) -> bool {
        self.retried.contains(cue_id)
    }

    pub(crate) fn mark_retried(&mut self, cue_id: &str) {
        self.retried.insert(cue_id.to_string());
    }

    /// Indices of pending markers due at `elapsed`, in timeline order.
    pub(crate) fn due(&self, elapsed: f64) -> Vec<usize> {
        self.markers
            .iter()
            .enumerate()
            .take_while(|(_, m)| m.is_due(elapsed))
            .filter(|(_, m)| m.state == MarkerState::Pending)
            .map(|(i, _)| i)
            .collect()
    }

    pub(crate) fn marker_mut(&mut self, index: usize) -> &mut AdMarker {
        &mut self.markers[index]
    }

    /// Continuity counter for the next packet on this stream's PID.
    pub(crate) fn continuity_counter(&self) -> u8 {
        self.continuity_counter
    }

    pub(crate) fn advance_continuity_counter(&mut self) {
        self.continuity_counter = (self.continuity_counter + 1) & 0x0F;
    }

    /// Record a tick; returns the previous tick time.
    pub(crate) fn record_tick(&mut self, elapsed: f64) -> Option<f64> {
        self.last_tick.replace(elapsed)
    }

    pub fn last_tick(&self) -> Option<f64> {
        self.last_tick
    }

    /// Seconds of stream time at `now`.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> f64 {
        (now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }

    /// Markers that have not reached a terminal state.
    pub fn unfinished(&self) -> impl Iterator<Item = &AdMarker> {
        self.markers.iter().filter(|m| !m.state.is_terminal())
    }
}
