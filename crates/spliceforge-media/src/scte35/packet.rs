//! Single-packet MPEG-TS carriage of a section.

use bytes::{BufMut, BytesMut};

use crate::error::{DecodeError, DecodeResult, EncodeResult, EncodingError};

pub const TS_PACKET_SIZE: usize = 188;
pub const SYNC_BYTE: u8 = 0x47;
pub const NULL_PID: u16 = 0x1FFF;
pub const DEFAULT_SCTE35_PID: u16 = 0x01F4;

/// Payload bytes left after the 4-byte header and the pointer_field.
pub const MAX_PACKET_SECTION: usize = TS_PACKET_SIZE - 4 - 1;

/// Transport packet header parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PacketOptions {
    /// 13-bit PID carrying the SCTE-35 elementary stream.
    pub pid: u16,
    /// 4-bit continuity counter.
    pub continuity_counter: u8,
}

impl Default for PacketOptions {
    fn default() -> Self {
        Self {
            pid: DEFAULT_SCTE35_PID,
            continuity_counter: 0,
        }
    }
}

/// Wrap a section in one 188-byte packet with pointer_field 0 and 0xFF
/// stuffing.
pub fn packetize(section: &[u8], options: &PacketOptions) -> EncodeResult<Vec<u8>> {
    if options.pid >= NULL_PID {
        return Err(EncodingError::invalid(
            "pid",
            format!("{:#06x} is the null PID or exceeds 13 bits", options.pid),
        ));
    }
    if options.continuity_counter > 0x0F {
        return Err(EncodingError::invalid(
            "continuity_counter",
            format!("{} exceeds 4 bits", options.continuity_counter),
        ));
    }
    if section.len() > MAX_PACKET_SECTION {
        return Err(EncodingError::SectionTooLarge {
            size: section.len(),
            max: MAX_PACKET_SECTION,
        });
    }

    let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
    buf.put_u8(SYNC_BYTE);
    // transport_error 0, payload_unit_start 1, priority 0, PID
    buf.put_u16(0x4000 | options.pid);
    // scrambling 00, adaptation_field_control 01 (payload only)
    buf.put_u8(0x10 | options.continuity_counter);
    buf.put_u8(0x00); // pointer_field
    buf.put_slice(section);
    buf.put_bytes(0xFF, TS_PACKET_SIZE - buf.len());

    Ok(buf.to_vec())
}

/// PID of a transport packet.
pub fn packet_pid(packet: &[u8]) -> Option<u16> {
    (packet.len() >= 3 && packet[0] == SYNC_BYTE)
        .then(|| u16::from_be_bytes([packet[1], packet[2]]) & 0x1FFF)
}

/// Locate the section carried by a packet, sized by its section_length.
pub fn extract_section(packet: &[u8]) -> DecodeResult<&[u8]> {
    if packet.len() != TS_PACKET_SIZE {
        return Err(DecodeError::malformed(format!(
            "transport packet is {} bytes, expected {}",
            packet.len(),
            TS_PACKET_SIZE
        )));
    }
    if packet[0] != SYNC_BYTE {
        return Err(DecodeError::malformed(format!(
            "missing sync byte, found {:#04x}",
            packet[0]
        )));
    }
    if packet[1] & 0x40 == 0 {
        return Err(DecodeError::malformed(
            "packet does not start a section (payload_unit_start unset)",
        ));
    }

    let mut offset = 4;
    match (packet[3] >> 4) & 0b11 {
        0b01 => {}
        0b11 => {
            let af_len = packet[4] as usize;
            offset += 1 + af_len;
        }
        other => {
            return Err(DecodeError::malformed(format!(
                "adaptation_field_control {:#04b} carries no payload",
                other
            )))
        }
    }

    let pointer = *packet
        .get(offset)
        .ok_or_else(|| DecodeError::malformed("adaptation field overruns packet"))?
        as usize;
    let start = offset + 1 + pointer;
    let header = packet
        .get(start..start + 3)
        .ok_or_else(|| DecodeError::malformed("pointer_field overruns packet"))?;

    let section_length = (((header[1] & 0x0F) as usize) << 8) | header[2] as usize;
    packet
        .get(start..start + 3 + section_length)
        .ok_or_else(|| {
            DecodeError::malformed(format!(
                "section_length {} overruns packet payload",
                section_length
            ))
        })
}
