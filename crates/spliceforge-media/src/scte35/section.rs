//! splice_info_section assembly and parsing.

use super::bits::{BitReader, BitWriter};
use super::command::SpliceCommand;
use super::crc::crc32_mpeg2;
use super::descriptor::SpliceDescriptor;
use super::PTS_MAX;
use crate::error::{DecodeError, DecodeResult, EncodeResult, EncodingError};

pub const TABLE_ID: u8 = 0xFC;

/// Tier value meaning "no tier restriction".
pub const TIER_UNRESTRICTED: u16 = 0xFFF;

/// Largest section a 12-bit section_length can describe.
pub const MAX_SECTION_SIZE: usize = 0xFFF + 3;

/// Bytes before the command payload (table_id through splice_command_type).
const HEADER_LEN: usize = 14;

/// A section with no payload: header, descriptor_loop_length and CRC.
pub const MIN_SECTION_SIZE: usize = HEADER_LEN + 2 + 4;

/// Decoded or to-be-encoded splice_info_section.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SpliceInfoSection {
    /// 33-bit offset added to every splice time in the section.
    pub pts_adjustment: u64,
    pub cw_index: u8,
    /// 12-bit authorization tier.
    pub tier: u16,
    pub command: SpliceCommand,
    pub descriptors: Vec<SpliceDescriptor>,
}

impl SpliceInfoSection {
    pub fn new(command: SpliceCommand) -> Self {
        Self {
            pts_adjustment: 0,
            cw_index: 0,
            tier: TIER_UNRESTRICTED,
            command,
            descriptors: Vec::new(),
        }
    }

    pub fn with_descriptors(mut self, descriptors: Vec<SpliceDescriptor>) -> Self {
        self.descriptors = descriptors;
        self
    }

    /// Serialize the section, CRC trailer included.
    pub fn encode(&self) -> EncodeResult<Vec<u8>> {
        if self.pts_adjustment > PTS_MAX {
            return Err(EncodingError::invalid(
                "pts_adjustment",
                format!("{} exceeds 33 bits", self.pts_adjustment),
            ));
        }
        if self.tier > 0xFFF {
            return Err(EncodingError::invalid(
                "tier",
                format!("{:#x} exceeds 12 bits", self.tier),
            ));
        }

        let payload = self.command.encode_payload()?;

        let mut descriptors = Vec::new();
        for descriptor in &self.descriptors {
            descriptors.extend(descriptor.encode()?);
        }

        let total = MIN_SECTION_SIZE + payload.len() + descriptors.len();
        if total > MAX_SECTION_SIZE {
            return Err(EncodingError::SectionTooLarge {
                size: total,
                max: MAX_SECTION_SIZE,
            });
        }

        let mut w = BitWriter::with_capacity(total);
        w.put(8, TABLE_ID as u64);
        w.put_flag(true); // section_syntax_indicator
        w.put_flag(false); // private_indicator
        w.put(2, 0b11); // sap_type: not specified
        w.put(12, (total - 3) as u64);
        w.put(8, 0); // protocol_version
        w.put_flag(false); // encrypted_packet
        w.put(6, 0); // encryption_algorithm
        w.put(33, self.pts_adjustment);
        w.put(8, self.cw_index as u64);
        w.put(12, self.tier as u64);
        w.put(12, payload.len() as u64);
        w.put(8, self.command.command_type() as u64);
        w.put_bytes(&payload);
        w.put(16, descriptors.len() as u64);
        w.put_bytes(&descriptors);

        let mut section = w.into_bytes();
        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        Ok(section)
    }

    /// Parse a complete section. The CRC is verified before any field is
    /// interpreted, so corruption anywhere surfaces as `CrcMismatch`.
    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        if data.len() < MIN_SECTION_SIZE {
            return Err(DecodeError::malformed(format!(
                "section is {} bytes, need at least {}",
                data.len(),
                MIN_SECTION_SIZE
            )));
        }

        let (body, trailer) = data.split_at(data.len() - 4);
        let stored = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let computed = crc32_mpeg2(body);
        if stored != computed {
            return Err(DecodeError::CrcMismatch { stored, computed });
        }

        let mut r = BitReader::new(body);
        let table_id = r.read_u8("table_id")?;
        if table_id != TABLE_ID {
            return Err(DecodeError::malformed(format!(
                "unexpected table_id {:#04x}",
                table_id
            )));
        }
        r.read(4, "section flags")?;
        let section_length = r.read(12, "section_length")? as usize;
        if section_length + 3 != data.len() {
            return Err(DecodeError::malformed(format!(
                "section_length {} does not match {} bytes of input",
                section_length,
                data.len()
            )));
        }

        let protocol_version = r.read_u8("protocol_version")?;
        if protocol_version != 0 {
            return Err(DecodeError::malformed(format!(
                "unsupported protocol_version {}",
                protocol_version
            )));
        }
        if r.read_flag("encrypted_packet")? {
            return Err(DecodeError::malformed("encrypted sections are not supported"));
        }
        r.read(6, "encryption_algorithm")?;
        let pts_adjustment = r.read(33, "pts_adjustment")?;
        let cw_index = r.read_u8("cw_index")?;
        let tier = r.read(12, "tier")? as u16;
        let command_length = r.read(12, "splice_command_length")? as usize;
        let command_type = r.read_u8("splice_command_type")?;

        // 0xFFF marks an unspecified length; the parser measures it instead.
        let remaining = r.read_bytes(r.remaining_bytes(), "splice_command")?;
        let (command, consumed) = SpliceCommand::decode_payload(command_type, remaining)?;
        let command_length = if command_length == 0xFFF {
            consumed
        } else if command_length != consumed {
            return Err(DecodeError::malformed(format!(
                "splice_command_length {} but command occupies {} bytes",
                command_length, consumed
            )));
        } else {
            command_length
        };

        let mut r = BitReader::new(&remaining[command_length..]);
        let loop_length = r.read(16, "descriptor_loop_length")? as usize;
        let loop_bytes = r.read_bytes(loop_length, "descriptor loop")?;
        if r.remaining_bytes() != 0 {
            return Err(DecodeError::malformed(format!(
                "{} trailing bytes after descriptor loop",
                r.remaining_bytes()
            )));
        }
        let descriptors = SpliceDescriptor::decode_loop(loop_bytes)?;

        Ok(Self {
            pts_adjustment,
            cw_index,
            tier,
            command,
            descriptors,
        })
    }
}
