//! Core ad-marker types.
//!
//! Markers arrive from an external store in camelCase JSON, so every struct
//! here serializes with camelCase field names. Ad types use the upper-case
//! names the dashboard and ad servers exchange.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Category of an ad break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdType {
    /// Program content boundary (no ad).
    Program,
    /// Advertisement inserted by the content provider.
    #[serde(alias = "PROVIDER_ADVERTISEMENT")]
    ProviderAd,
    /// Advertisement inserted by the distributor.
    #[serde(alias = "DISTRIBUTOR_ADVERTISEMENT")]
    DistributorAd,
    /// Network-level advertisement.
    #[serde(alias = "NETWORK_ADVERTISEMENT")]
    NetworkAd,
    /// Local (affiliate) advertisement.
    #[serde(alias = "LOCAL_ADVERTISEMENT")]
    LocalAd,
}

impl AdType {
    /// All ad types in declaration order.
    pub const ALL: [AdType; 5] = [
        AdType::Program,
        AdType::ProviderAd,
        AdType::DistributorAd,
        AdType::NetworkAd,
        AdType::LocalAd,
    ];

    /// Wire name, e.g. `PROVIDER_AD`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Program => "PROGRAM",
            Self::ProviderAd => "PROVIDER_AD",
            Self::DistributorAd => "DISTRIBUTOR_AD",
            Self::NetworkAd => "NETWORK_AD",
            Self::LocalAd => "LOCAL_AD",
        }
    }

    /// Whether this type represents an advertisement rather than program content.
    pub fn is_advertisement(&self) -> bool {
        !matches!(self, Self::Program)
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown ad type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown ad type: {0}")]
pub struct ParseAdTypeError(pub String);

impl FromStr for AdType {
    type Err = ParseAdTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PROGRAM" => Ok(Self::Program),
            "PROVIDER_AD" | "PROVIDER_ADVERTISEMENT" => Ok(Self::ProviderAd),
            "DISTRIBUTOR_AD" | "DISTRIBUTOR_ADVERTISEMENT" => Ok(Self::DistributorAd),
            "NETWORK_AD" | "NETWORK_ADVERTISEMENT" => Ok(Self::NetworkAd),
            "LOCAL_AD" | "LOCAL_ADVERTISEMENT" => Ok(Self::LocalAd),
            _ => Err(ParseAdTypeError(s.to_string())),
        }
    }
}

/// Lifecycle state of an ad marker.
///
/// `Pending → Firing → Inserted | Failed`. Only the scheduler moves a marker
/// out of `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerState {
    #[default]
    Pending,
    Firing,
    Inserted,
    Failed,
}

impl MarkerState {
    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Inserted | Self::Failed)
    }
}

impl fmt::Display for MarkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Firing => write!(f, "firing"),
            Self::Inserted => write!(f, "inserted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// An ad break scheduled against stream time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdMarker {
    /// Record identifier from the external store.
    pub id: String,
    /// Cue identifier, unique within a stream.
    pub cue_id: String,
    /// Seconds from stream start.
    pub start_time: f64,
    /// Break duration in seconds.
    pub duration: f64,
    pub ad_type: AdType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub state: MarkerState,
    /// Explicit splice_event_id; derived from the cue id when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splice_event_id: Option<u32>,
    #[serde(default)]
    pub avail_num: u8,
    #[serde(default)]
    pub avails_expected: u8,
}

impl AdMarker {
    /// Create a pending marker.
    pub fn new(
        id: impl Into<String>,
        cue_id: impl Into<String>,
        start_time: f64,
        duration: f64,
        ad_type: AdType,
    ) -> Self {
        Self {
            id: id.into(),
            cue_id: cue_id.into(),
            start_time,
            duration,
            ad_type,
            description: None,
            state: MarkerState::Pending,
            splice_event_id: None,
            avail_num: 0,
            avails_expected: 0,
        }
    }

    /// Attach a human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Pin the splice_event_id instead of deriving it from the cue id.
    pub fn with_splice_event_id(mut self, event_id: u32) -> Self {
        self.splice_event_id = Some(event_id);
        self
    }

    /// End of the break in seconds from stream start.
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// True once stream time has reached the marker's start.
    pub fn is_due(&self, elapsed_secs: f64) -> bool {
        self.start_time <= elapsed_secs
    }

    /// Reason the marker cannot be scheduled, if any.
    pub fn validate(&self) -> Option<String> {
        if self.cue_id.is_empty() {
            return Some("cue id is empty".to_string());
        }
        if !self.start_time.is_finite() || self.start_time < 0.0 {
            return Some(format!("start time {} is not a non-negative number", self.start_time));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Some(format!("duration {} must be positive", self.duration));
        }
        None
    }

    /// Timeline ordering: start time, then cue id lexically.
    pub fn timeline_cmp(&self, other: &Self) -> Ordering {
        self.start_time
            .total_cmp(&other.start_time)
            .then_with(|| self.cue_id.cmp(&other.cue_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_type_wire_names() {
        assert_eq!(serde_json::to_string(&AdType::ProviderAd).unwrap(), "\"PROVIDER_AD\"");
        assert_eq!(serde_json::to_string(&AdType::Program).unwrap(), "\"PROGRAM\"");
        let parsed: AdType = serde_json::from_str("\"LOCAL_ADVERTISEMENT\"").unwrap();
        assert_eq!(parsed, AdType::LocalAd);
    }

    #[test]
    fn ad_type_from_str() {
        assert_eq!("network_ad".parse::<AdType>().unwrap(), AdType::NetworkAd);
        assert_eq!(
            "DISTRIBUTOR_ADVERTISEMENT".parse::<AdType>().unwrap(),
            AdType::DistributorAd
        );
        assert!("BUMPER".parse::<AdType>().is_err());
        for ad_type in AdType::ALL {
            assert_eq!(ad_type.as_str().parse::<AdType>().unwrap(), ad_type);
        }
    }

    #[test]
    fn marker_deserializes_from_store_json() {
        let json = r#"{
            "id": "rec-7",
            "cueId": "cue-1",
            "startTime": 10,
            "duration": 30,
            "adType": "PROVIDER_AD"
        }"#;
        let marker: AdMarker = serde_json::from_str(json).unwrap();
        assert_eq!(marker.cue_id, "cue-1");
        assert_eq!(marker.state, MarkerState::Pending);
        assert_eq!(marker.splice_event_id, None);
        assert_eq!(marker.end_time(), 40.0);
    }

    #[test]
    fn marker_validation() {
        let ok = AdMarker::new("a", "cue", 0.0, 1.0, AdType::LocalAd);
        assert!(ok.validate().is_none());

        let negative = AdMarker::new("a", "cue", -1.0, 1.0, AdType::LocalAd);
        assert!(negative.validate().is_some());

        let zero = AdMarker::new("a", "cue", 5.0, 0.0, AdType::LocalAd);
        assert!(zero.validate().is_some());

        let nan = AdMarker::new("a", "cue", f64::NAN, 1.0, AdType::LocalAd);
        assert!(nan.validate().is_some());

        let empty = AdMarker::new("a", "", 5.0, 1.0, AdType::LocalAd);
        assert!(empty.validate().is_some());
    }

    #[test]
    fn timeline_order_breaks_ties_by_cue_id() {
        let a = AdMarker::new("1", "cue-2", 10.0, 5.0, AdType::ProviderAd);
        let b = AdMarker::new("2", "cue-1", 10.0, 5.0, AdType::ProviderAd);
        let c = AdMarker::new("3", "cue-0", 12.0, 5.0, AdType::ProviderAd);
        let mut markers = vec![c.clone(), a.clone(), b.clone()];
        markers.sort_by(|x, y| x.timeline_cmp(y));
        let order: Vec<_> = markers.iter().map(|m| m.cue_id.as_str()).collect();
        assert_eq!(order, vec!["cue-1", "cue-2", "cue-0"]);
    }

    #[test]
    fn terminal_states() {
        assert!(!MarkerState::Pending.is_terminal());
        assert!(!MarkerState::Firing.is_terminal());
        assert!(MarkerState::Inserted.is_terminal());
        assert!(MarkerState::Failed.is_terminal());
    }
}
