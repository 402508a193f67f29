//! SCTE-35 splice_info_section codec.
//!
//! Sections are built with computed `section_length` and
//! `splice_command_length` fields and a CRC-32/MPEG-2 trailer, then carried in
//! a single 188-byte transport packet. All functions are pure and can be
//! called concurrently from any number of streams.
//!
//! # Example
//!
//! ```
//! use spliceforge_media::scte35::{self, SpliceCommand, SpliceInsert};
//!
//! let cmd = SpliceCommand::SpliceInsert(SpliceInsert::scheduled(1, 900_000, Some(2_700_000)));
//! let packet = scte35::encode(&cmd, &[]).unwrap();
//! assert_eq!(packet.len(), 188);
//! assert_eq!(scte35::decode(&packet).unwrap(), cmd);
//! ```

mod bits;
pub mod command;
pub mod crc;
pub mod cue;
pub mod descriptor;
pub mod packet;
pub mod section;

pub use command::{BreakDuration, SpliceCommand, SpliceInsert};
pub use crc::crc32_mpeg2;
pub use cue::{cue_for_marker, encode_marker, encode_marker_section, splice_event_id_for, CueSettings};
pub use descriptor::{SegmentationDescriptor, SpliceDescriptor};
pub use packet::{extract_section, packetize, PacketOptions, DEFAULT_SCTE35_PID, TS_PACKET_SIZE};
pub use section::SpliceInfoSection;

use crate::error::{DecodeResult, EncodeResult};

/// Largest 33-bit PTS value.
pub const PTS_MAX: u64 = (1 << 33) - 1;

/// PTS clock rate.
pub const PTS_TIMESCALE: u32 = 90_000;

/// Encode a command and descriptors into a transport packet on the default PID.
pub fn encode(cmd: &SpliceCommand, descriptors: &[SpliceDescriptor]) -> EncodeResult<Vec<u8>> {
    encode_with(cmd, descriptors, &PacketOptions::default())
}

/// Encode a command and descriptors into a transport packet.
pub fn encode_with(
    cmd: &SpliceCommand,
    descriptors: &[SpliceDescriptor],
    options: &PacketOptions,
) -> EncodeResult<Vec<u8>> {
    let section = encode_section(cmd, descriptors)?;
    packetize(&section, options)
}

/// Encode a command and descriptors as a raw section.
pub fn encode_section(cmd: &SpliceCommand, descriptors: &[SpliceDescriptor]) -> EncodeResult<Vec<u8>> {
    SpliceInfoSection::new(cmd.clone())
        .with_descriptors(descriptors.to_vec())
        .encode()
}

/// Decode the command from a transport packet or a raw section.
pub fn decode(bytes: &[u8]) -> DecodeResult<SpliceCommand> {
    decode_section(bytes).map(|section| section.command)
}

/// Decode a full section from a transport packet or a raw section.
pub fn decode_section(bytes: &[u8]) -> DecodeResult<SpliceInfoSection> {
    match bytes.first() {
        Some(&packet::SYNC_BYTE) => SpliceInfoSection::decode(extract_section(bytes)?),
        _ => SpliceInfoSection::decode(bytes),
    }
}

/// Convert seconds to 90 kHz ticks, wrapping at 33 bits.
pub fn seconds_to_pts(seconds: f64) -> u64 {
    ((seconds * PTS_TIMESCALE as f64).round() as u64) & PTS_MAX
}

/// Convert 90 kHz ticks to seconds.
pub fn pts_to_seconds(pts: u64) -> f64 {
    (pts & PTS_MAX) as f64 / PTS_TIMESCALE as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, EncodingError};

    #[test]
    fn splice_insert_roundtrip_through_packet() {
        let mut insert = SpliceInsert::scheduled(0x1234_5678, PTS_MAX, Some(PTS_MAX));
        insert.avail_num = 2;
        insert.avails_expected = 4;
        let cmd = SpliceCommand::SpliceInsert(insert);
        assert_eq!(decode(&encode(&cmd, &[]).unwrap()).unwrap(), cmd);
    }

    #[test]
    fn time_signal_roundtrip_through_section() {
        let cmd = SpliceCommand::TimeSignal { pts_time: 0 };
        assert_eq!(decode(&encode_section(&cmd, &[]).unwrap()).unwrap(), cmd);
    }

    #[test]
    fn bit_flip_in_packet_payload_is_crc_mismatch() {
        let cmd = SpliceCommand::TimeSignal { pts_time: 12345 };
        let mut packet = encode(&cmd, &[]).unwrap();
        packet[20] ^= 0x01;
        assert!(matches!(decode(&packet), Err(DecodeError::CrcMismatch { .. })));
    }

    #[test]
    fn too_many_descriptors_is_section_too_large() {
        let descriptors: Vec<_> = (0..20)
            .map(|i| SpliceDescriptor::Avail { provider_avail_id: i })
            .collect();
        let err = encode(&SpliceCommand::SpliceNull, &descriptors).unwrap_err();
        assert!(matches!(err, EncodingError::SectionTooLarge { max: 183, .. }));

        // The raw section has no single-packet limit.
        assert!(encode_section(&SpliceCommand::SpliceNull, &descriptors).is_ok());
    }

    #[test]
    fn empty_input_is_malformed() {
        assert!(matches!(decode(&[]), Err(DecodeError::MalformedSection(_))));
    }

    #[test]
    fn pts_conversions() {
        assert_eq!(seconds_to_pts(1.0), 90_000);
        assert_eq!(seconds_to_pts(0.5), 45_000);
        assert_eq!(seconds_to_pts((PTS_MAX + 1) as f64 / 90_000.0), 0);
        assert_eq!(pts_to_seconds(2_700_000), 30.0);
    }
}
