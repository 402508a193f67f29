//! HLS playlists with `#EXT-X-SCTE35` tags.

use std::fmt::Write;

use spliceforge_common::AdMarker;

use super::placement::{layout, Interval, Placement};
use super::{quoted_attr, EmbeddedManifest};

/// A media segment on the stream timeline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ManifestSegment {
    /// Media sequence number.
    pub sequence: u64,
    /// Segment URI.
    pub uri: String,
    /// Duration in seconds.
    pub duration: f64,
    /// Absolute start in stream seconds.
    pub start: f64,
}

impl ManifestSegment {
    pub fn new(sequence: u64, uri: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            sequence,
            uri: uri.into(),
            duration,
            start,
        }
    }

    /// Contiguous segments of equal length starting at `start`.
    pub fn uniform(count: u64, start: f64, duration: f64, uri_prefix: &str) -> Vec<Self> {
        (0..count)
            .map(|i| {
                Self::new(
                    i,
                    format!("{}{}.ts", uri_prefix, i),
                    start + i as f64 * duration,
                    duration,
                )
            })
            .collect()
    }
}

impl Interval for ManifestSegment {
    fn start(&self) -> f64 {
        self.start
    }
    fn duration(&self) -> f64 {
        self.duration
    }
}

/// Playlist type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PlaylistType {
    Vod,
    Event,
    #[default]
    Live,
}

/// Media playlist rendering options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsOptions {
    pub version: u8,
    pub playlist_type: PlaylistType,
    /// Emit `#EXT-X-ENDLIST`.
    pub ended: bool,
    /// Append a non-standard `DESC` attribute carrying the marker description.
    pub descriptions: bool,
}

impl Default for HlsOptions {
    fn default() -> Self {
        Self {
            version: 6,
            playlist_type: PlaylistType::Live,
            ended: false,
            descriptions: false,
        }
    }
}

/// Render a media playlist with SCTE-35 tags using default options.
pub fn embed_hls(segments: &[ManifestSegment], markers: &[AdMarker]) -> EmbeddedManifest {
    embed_hls_with(segments, markers, &HlsOptions::default())
}

/// Render a media playlist with SCTE-35 tags.
///
/// Each marker becomes one tag immediately before the `#EXTINF` of the
/// segment containing its start time, with `TIME` relative to that segment.
pub fn embed_hls_with(
    segments: &[ManifestSegment],
    markers: &[AdMarker],
    options: &HlsOptions,
) -> EmbeddedManifest {
    let placed = layout(segments, markers);

    let target_duration = segments
        .iter()
        .map(|s| s.duration.ceil() as u32)
        .max()
        .unwrap_or(0)
        .max(1);
    let media_sequence = segments.first().map(|s| s.sequence).unwrap_or(0);

    let mut out = String::new();

    writeln!(out, "#EXTM3U").unwrap();
    writeln!(out, "#EXT-X-VERSION:{}", options.version).unwrap();
    writeln!(out, "#EXT-X-TARGETDURATION:{}", target_duration).unwrap();
    writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", media_sequence).unwrap();

    match options.playlist_type {
        PlaylistType::Vod => writeln!(out, "#EXT-X-PLAYLIST-TYPE:VOD").unwrap(),
        PlaylistType::Event => writeln!(out, "#EXT-X-PLAYLIST-TYPE:EVENT").unwrap(),
        PlaylistType::Live => {}
    }

    for (segment, slot) in segments.iter().zip(&placed.slots) {
        for placement in slot {
            writeln!(out, "{}", scte35_tag(placement, options.descriptions)).unwrap();
        }
        writeln!(out, "#EXTINF:{:.3},", segment.duration).unwrap();
        writeln!(out, "{}", segment.uri).unwrap();
    }

    if options.ended {
        writeln!(out, "#EXT-X-ENDLIST").unwrap();
    }

    EmbeddedManifest {
        text: out,
        warnings: placed.warnings,
    }
}

fn scte35_tag(placement: &Placement<'_>, descriptions: bool) -> String {
    let marker = placement.marker;
    let mut tag = format!(
        "#EXT-X-SCTE35:ID=\"{}\",TIME={:.3},DURATION={:.3},CUE=\"{}\",ADTYPE=\"{}\"",
        quoted_attr(&marker.id),
        placement.offset,
        marker.duration,
        quoted_attr(&marker.cue_id),
        marker.ad_type,
    );
    if let Some(description) = marker.description.as_deref().filter(|_| descriptions) {
        write!(tag, ",DESC=\"{}\"", quoted_attr(description)).unwrap();
    }
    tag
}

// ---------------------------------------------------------------------------
// Master playlist
// ---------------------------------------------------------------------------

/// Variant stream entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Playlist URI.
    pub uri: String,
    /// Bandwidth in bits per second.
    pub bandwidth: u32,
    /// Video resolution.
    pub resolution: Option<(u32, u32)>,
    /// Codec string (e.g., "avc1.64001f,mp4a.40.2").
    pub codecs: String,
}

/// Master playlist, optionally advertising the ad decision server.
#[derive(Debug, Clone, Default)]
pub struct MasterPlaylist {
    pub streams: Vec<StreamInfo>,
    pub ad_decision_server: Option<String>,
}

impl MasterPlaylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stream(mut self, stream: StreamInfo) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn with_ad_decision_server(mut self, url: impl Into<String>) -> Self {
        self.ad_decision_server = Some(url.into());
        self
    }

    /// Render to M3U8 string.
    pub fn render(&self) -> String {
        let mut out = String::new();

        writeln!(out, "#EXTM3U").unwrap();
        writeln!(out, "#EXT-X-VERSION:6").unwrap();

        for stream in &self.streams {
            write!(out, "#EXT-X-STREAM-INF:BANDWIDTH={}", stream.bandwidth).unwrap();
            if let Some((width, height)) = stream.resolution {
                write!(out, ",RESOLUTION={}x{}", width, height).unwrap();
            }
            if !stream.codecs.is_empty() {
                write!(out, ",CODECS=\"{}\"", quoted_attr(&stream.codecs)).unwrap();
            }
            writeln!(out).unwrap();
            writeln!(out, "{}", stream.uri).unwrap();
        }

        if let Some(ref server) = self.ad_decision_server {
            writeln!(out, "#EXT-X-SSAI:AD-DECISION-SERVER=\"{}\"", quoted_attr(server)).unwrap();
        }

        out
    }
}
