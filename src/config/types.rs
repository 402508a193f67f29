use serde::{Deserialize, Serialize};
use spliceforge_common::{AdDecision, AdType};
use spliceforge_media::manifest::{DashOptions, HlsOptions};
use spliceforge_media::scte35::{CueSettings, PacketOptions, DEFAULT_SCTE35_PID};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub scte35: Scte35Config,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub ad_decision: AdDecisionConfig,

    #[serde(default)]
    pub manifest: ManifestConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scte35Config {
    /// PID of the SCTE-35 elementary stream (must not be the null PID 0x1FFF)
    #[serde(default = "default_pid")]
    pub pid: u16,

    /// unique_program_id written into every splice_insert
    #[serde(default = "default_unique_program_id")]
    pub unique_program_id: u16,

    /// PTS (90 kHz) corresponding to stream time zero
    #[serde(default)]
    pub pts_offset: u64,

    /// Attach a segmentation_descriptor describing the ad type
    #[serde(default = "default_true")]
    pub attach_segmentation: bool,
}

impl Default for Scte35Config {
    fn default() -> Self {
        Self {
            pid: default_pid(),
            unique_program_id: default_unique_program_id(),
            pts_offset: 0,
            attach_segmentation: true,
        }
    }
}

impl Scte35Config {
    pub fn cue_settings(&self) -> CueSettings {
        CueSettings {
            unique_program_id: self.unique_program_id,
            pts_offset: self.pts_offset,
            attach_segmentation: self.attach_segmentation,
            packet: PacketOptions {
                pid: self.pid,
                continuity_counter: 0,
            },
        }
    }
}

fn default_pid() -> u16 {
    DEFAULT_SCTE35_PID
}

fn default_unique_program_id() -> u16 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Tick period in milliseconds (at most 1000)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn default_tick_interval_ms() -> u64 {
    1000
}

/// How ad decisions are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStrategy {
    /// POST each break to `endpoint`
    Remote,
    /// Look the ad type up in the local table
    #[default]
    Local,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdDecisionConfig {
    #[serde(default)]
    pub strategy: DecisionStrategy,

    /// Ad decision server URL (required for the remote strategy)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Remote request timeout in milliseconds (default: 5000)
    #[serde(default = "default_decision_timeout_ms")]
    pub timeout_ms: u64,

    /// Send quartile tracking beacons
    #[serde(default = "default_true")]
    pub tracking_enabled: bool,

    /// Beacon URL used when a decision carries no per-quartile endpoint
    #[serde(default)]
    pub tracking_url: Option<String>,

    /// Decisions used when the primary strategy fails, picked uniformly
    #[serde(default)]
    pub fallbacks: Vec<AdDecision>,

    /// Creative URL per ad type for the local strategy
    #[serde(default = "default_local_table")]
    pub local: BTreeMap<AdType, String>,
}

impl Default for AdDecisionConfig {
    fn default() -> Self {
        Self {
            strategy: DecisionStrategy::default(),
            endpoint: None,
            timeout_ms: default_decision_timeout_ms(),
            tracking_enabled: true,
            tracking_url: None,
            fallbacks: Vec::new(),
            local: default_local_table(),
        }
    }
}

impl AdDecisionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_decision_timeout_ms() -> u64 {
    5000
}

fn default_local_table() -> BTreeMap<AdType, String> {
    BTreeMap::from([
        (AdType::ProviderAd, "/ads/provider-ad.mp4".to_string()),
        (AdType::DistributorAd, "/ads/distributor-ad.mp4".to_string()),
        (AdType::NetworkAd, "/ads/network-ad.mp4".to_string()),
        (AdType::LocalAd, "/ads/local-ad.mp4".to_string()),
    ])
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestConfig {
    #[serde(default = "default_hls_version")]
    pub hls_version: u8,

    #[serde(default = "default_min_buffer_secs")]
    pub dash_min_buffer_secs: f64,

    /// Advertised in the master playlist when set
    #[serde(default)]
    pub ad_decision_server: Option<String>,

    /// Add marker descriptions to HLS cue tags as `DESC`
    #[serde(default)]
    pub hls_descriptions: bool,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            hls_version: default_hls_version(),
            dash_min_buffer_secs: default_min_buffer_secs(),
            ad_decision_server: None,
            hls_descriptions: false,
        }
    }
}

impl ManifestConfig {
    pub fn hls_options(&self) -> HlsOptions {
        HlsOptions {
            version: self.hls_version,
            descriptions: self.hls_descriptions,
            ..Default::default()
        }
    }

    pub fn dash_options(&self, cue: CueSettings) -> DashOptions {
        DashOptions {
            min_buffer_secs: self.dash_min_buffer_secs,
            cue,
            ..Default::default()
        }
    }
}

fn default_hls_version() -> u8 {
    6
}

fn default_min_buffer_secs() -> f64 {
    2.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    /// Broadcast channel capacity
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn default_event_capacity() -> usize {
    256
}
