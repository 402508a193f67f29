//! HLS and DASH manifests with embedded SCTE-35 signaling.
//!
//! The embedders are pure: the same segments (or periods) and markers always
//! render to the same text. Markers that cannot be placed exactly are clamped
//! and reported through [`EmbeddedManifest::warnings`] instead of failing the
//! whole manifest.

mod dash;
mod hls;
mod placement;

pub use dash::{embed_dash, embed_dash_with, AdaptationSet, DashOptions, Period};
pub use hls::{
    embed_hls, embed_hls_with, HlsOptions, ManifestSegment, MasterPlaylist, PlaylistType,
    StreamInfo,
};

use spliceforge_common::AdMarker;

/// A marker that was clamped or dropped while building a manifest.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PlacementWarning {
    pub marker: AdMarker,
    pub reason: String,
}

impl PlacementWarning {
    pub(crate) fn new(marker: &AdMarker, reason: impl Into<String>) -> Self {
        Self {
            marker: marker.clone(),
            reason: reason.into(),
        }
    }
}

/// Rendered manifest text with any non-fatal placement warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedManifest {
    pub text: String,
    pub warnings: Vec<PlacementWarning>,
}

impl EmbeddedManifest {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Replace characters that would terminate a quoted attribute value.
pub(crate) fn quoted_attr(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping() {
        assert_eq!(quoted_attr("a\"b\nc"), "a'b c");
    }
}
