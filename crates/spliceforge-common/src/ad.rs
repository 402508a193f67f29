//! Ad-decisioning types shared between the scheduler, the SSAI service and
//! the event transport.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{AdMarker, AdType};

/// A request for an ad to fill one break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdBreakRequest {
    pub stream_id: String,
    pub cue_id: String,
    pub start_time: f64,
    pub duration: f64,
    pub ad_type: AdType,
}

impl AdBreakRequest {
    /// Build the request for a firing marker.
    pub fn from_marker(stream_id: impl Into<String>, marker: &AdMarker) -> Self {
        Self {
            stream_id: stream_id.into(),
            cue_id: marker.cue_id.clone(),
            start_time: marker.start_time,
            duration: marker.duration,
            ad_type: marker.ad_type,
        }
    }
}

/// What is known about the viewer when an ad is requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub user_agent: String,
    /// Measured bandwidth in kbps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

/// Targeting tags attached to a decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Targeting {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub demographics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub location: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time: Vec<String>,
}

impl Targeting {
    /// Every tag, flattened in field order.
    pub fn tags(&self) -> Vec<String> {
        self.demographics
            .iter()
            .chain(&self.content)
            .chain(&self.device)
            .chain(&self.location)
            .chain(&self.time)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.demographics.is_empty()
            && self.content.is_empty()
            && self.device.is_empty()
            && self.location.is_empty()
            && self.time.is_empty()
    }
}

/// Playback progress points reported for an ad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quartile {
    Start,
    FirstQuartile,
    Midpoint,
    ThirdQuartile,
    Complete,
}

impl fmt::Display for Quartile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::FirstQuartile => write!(f, "first_quartile"),
            Self::Midpoint => write!(f, "midpoint"),
            Self::ThirdQuartile => write!(f, "third_quartile"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Impression and per-quartile tracking endpoints supplied with a decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEndpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_quartile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub third_quartile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<String>,
}

impl TrackingEndpoints {
    /// Endpoint registered for `quartile`, if any.
    pub fn url_for(&self, quartile: Quartile) -> Option<&str> {
        match quartile {
            Quartile::Start => self.start.as_deref(),
            Quartile::FirstQuartile => self.first_quartile.as_deref(),
            Quartile::Midpoint => self.midpoint.as_deref(),
            Quartile::ThirdQuartile => self.third_quartile.as_deref(),
            Quartile::Complete => self.complete.as_deref(),
        }
    }
}

/// A concrete creative chosen for an ad break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdDecision {
    pub ad_id: String,
    pub ad_url: String,
    /// Creative duration in seconds.
    pub duration: f64,
    pub ad_type: AdType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting: Option<Targeting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<TrackingEndpoints>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_request_from_marker() {
        let marker = AdMarker::new("rec", "cue-9", 42.5, 15.0, AdType::NetworkAd);
        let request = AdBreakRequest::from_marker("stream-a", &marker);
        assert_eq!(request.stream_id, "stream-a");
        assert_eq!(request.cue_id, "cue-9");
        assert_eq!(request.start_time, 42.5);
        assert_eq!(request.ad_type, AdType::NetworkAd);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["cueId"], "cue-9");
        assert_eq!(json["adType"], "NETWORK_AD");
    }

    #[test]
    fn tracking_url_lookup() {
        let endpoints = TrackingEndpoints {
            midpoint: Some("https://t.example/mid".into()),
            ..Default::default()
        };
        assert_eq!(endpoints.url_for(Quartile::Midpoint), Some("https://t.example/mid"));
        assert_eq!(endpoints.url_for(Quartile::Complete), None);
    }

    #[test]
    fn targeting_tags_flatten_in_order() {
        let targeting = Targeting {
            content: vec!["live-streaming".into()],
            device: vec!["mobile".into(), "low-bandwidth".into()],
            time: vec!["evening".into()],
            ..Default::default()
        };
        assert_eq!(
            targeting.tags(),
            vec!["live-streaming", "mobile", "low-bandwidth", "evening"]
        );
        assert!(!targeting.is_empty());
        assert!(Targeting::default().is_empty());
    }

    #[test]
    fn quartile_wire_names() {
        assert_eq!(
            serde_json::to_string(&Quartile::FirstQuartile).unwrap(),
            "\"first_quartile\""
        );
        assert_eq!(Quartile::ThirdQuartile.to_string(), "third_quartile");
    }
}
