//! Spliceforge-Media: SCTE-35 cue codec and HLS/DASH cue embedding
//!
//! This crate holds the stateless half of spliceforge. Everything here is a
//! pure function of its inputs and may be called from any task.
//!
//! # Modules
//!
//! - `scte35` - splice_info_section encode/decode, CRC-32/MPEG-2, TS packets
//! - `manifest` - HLS media/master playlists and DASH MPDs carrying cues
//!
//! # Architecture
//!
//! An [`AdMarker`](spliceforge_common::AdMarker) becomes wire bytes in two
//! steps:
//!
//! 1. [`scte35::cue_for_marker`] maps it to a splice_insert section with a
//!    segmentation descriptor describing the ad type
//! 2. The section is either packetized into one 188-byte transport packet
//!    (live injection) or base64 encoded into a DASH `<Binary>` element
//!
//! HLS playlists carry a textual `#EXT-X-SCTE35` tag per marker instead.

pub mod error;
pub mod manifest;
pub mod scte35;

pub use error::{DecodeError, DecodeResult, EncodeResult, EncodingError, ManifestError};
pub use manifest::{embed_dash, embed_hls, EmbeddedManifest, ManifestSegment, Period, PlacementWarning};
pub use scte35::{decode, encode, CueSettings, SpliceCommand, SpliceDescriptor, SpliceInfoSection};
