//! Mapping from [`AdMarker`] records to splice cues.
//!
//! The scheduler and the DASH embedder both go through [`cue_for_marker`], so
//! a marker produces the same section bytes wherever it is emitted.

use spliceforge_common::{AdMarker, AdType};

use super::command::{SpliceCommand, SpliceInsert};
use super::crc::crc32_mpeg2;
use super::descriptor::{segmentation_type, SegmentationDescriptor, SpliceDescriptor};
use super::packet::{packetize, PacketOptions};
use super::section::SpliceInfoSection;
use super::{seconds_to_pts, PTS_MAX, PTS_TIMESCALE};
use crate::error::{EncodeResult, EncodingError};

/// Per-stream parameters applied to every cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CueSettings {
    pub unique_program_id: u16,
    /// PTS (90 kHz) corresponding to stream time zero.
    pub pts_offset: u64,
    /// Attach a segmentation_descriptor describing the ad type.
    pub attach_segmentation: bool,
    pub packet: PacketOptions,
}

impl Default for CueSettings {
    fn default() -> Self {
        Self {
            unique_program_id: 1,
            pts_offset: 0,
            attach_segmentation: true,
            packet: PacketOptions::default(),
        }
    }
}

/// segmentation_type_id announcing the start of a break of this type.
pub fn segmentation_type_for(ad_type: AdType) -> u8 {
    match ad_type {
        AdType::Program => segmentation_type::PROGRAM_START,
        AdType::ProviderAd => segmentation_type::PROVIDER_ADVERTISEMENT_START,
        AdType::DistributorAd => segmentation_type::DISTRIBUTOR_ADVERTISEMENT_START,
        AdType::NetworkAd => segmentation_type::PROVIDER_PLACEMENT_OPPORTUNITY_START,
        AdType::LocalAd => segmentation_type::DISTRIBUTOR_PLACEMENT_OPPORTUNITY_START,
    }
}

/// splice_event_id for a marker: the explicit id, or a CRC of the cue id.
pub fn splice_event_id_for(marker: &AdMarker) -> u32 {
    marker
        .splice_event_id
        .unwrap_or_else(|| crc32_mpeg2(marker.cue_id.as_bytes()))
}

/// Build the splice_insert section that announces `marker`.
pub fn cue_for_marker(marker: &AdMarker, settings: &CueSettings) -> EncodeResult<SpliceInfoSection> {
    if !marker.start_time.is_finite() || marker.start_time < 0.0 {
        return Err(EncodingError::invalid(
            "start_time",
            format!("{} is not a non-negative time", marker.start_time),
        ));
    }
    if !marker.duration.is_finite() || marker.duration <= 0.0 {
        return Err(EncodingError::invalid(
            "duration",
            format!("{} is not a positive duration", marker.duration),
        ));
    }

    let duration = (marker.duration * PTS_TIMESCALE as f64).round() as u64;
    if duration > PTS_MAX {
        return Err(EncodingError::invalid(
            "break_duration",
            format!("{}s exceeds the 33-bit PTS range", marker.duration),
        ));
    }

    let event_id = splice_event_id_for(marker);
    let pts_time = settings.pts_offset.wrapping_add(seconds_to_pts(marker.start_time)) & PTS_MAX;

    let mut insert = SpliceInsert::scheduled(event_id, pts_time, Some(duration));
    insert.out_of_network = marker.ad_type.is_advertisement();
    insert.unique_program_id = settings.unique_program_id;
    insert.avail_num = marker.avail_num;
    insert.avails_expected = marker.avails_expected;

    let mut descriptors = Vec::new();
    if settings.attach_segmentation {
        let type_id = segmentation_type_for(marker.ad_type);
        let mut seg = SegmentationDescriptor::new(event_id, type_id, Some(duration));
        seg.segment_num = marker.avail_num;
        seg.segments_expected = marker.avails_expected;
        if segmentation_type::has_sub_segments(type_id) {
            seg.sub_segment_num = Some(0);
            seg.sub_segments_expected = Some(0);
        }
        descriptors.push(SpliceDescriptor::Segmentation(seg));
    }

    Ok(SpliceInfoSection::new(SpliceCommand::SpliceInsert(insert)).with_descriptors(descriptors))
}

/// Encode the cue for `marker` as a raw section.
pub fn encode_marker_section(marker: &AdMarker, settings: &CueSettings) -> EncodeResult<Vec<u8>> {
    cue_for_marker(marker, settings)?.encode()
}

/// Encode the cue for `marker` into a transport packet.
pub fn encode_marker(marker: &AdMarker, settings: &CueSettings) -> EncodeResult<Vec<u8>> {
    let section = encode_marker_section(marker, settings)?;
    packetize(&section, &settings.packet)
}
