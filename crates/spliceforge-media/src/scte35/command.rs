//! Splice commands carried in a splice_info_section.

use super::bits::{BitReader, BitWriter};
use super::PTS_MAX;
use crate::error::{DecodeError, DecodeResult, EncodeResult, EncodingError};

/// splice_command_type values.
pub mod command_type {
    pub const SPLICE_NULL: u8 = 0x00;
    pub const SPLICE_SCHEDULE: u8 = 0x04;
    pub const SPLICE_INSERT: u8 = 0x05;
    pub const TIME_SIGNAL: u8 = 0x06;
    pub const BANDWIDTH_RESERVATION: u8 = 0x07;
    pub const PRIVATE_COMMAND: u8 = 0xFF;
}

/// A splice command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(tag = "type", rename_all = "snake_case"))]
pub enum SpliceCommand {
    /// Heartbeat; carries no payload.
    SpliceNull,
    /// Timing point whose meaning is supplied by descriptors.
    TimeSignal {
        /// 33-bit PTS in 90 kHz units.
        pts_time: u64,
    },
    /// Splice into or out of the network feed.
    SpliceInsert(SpliceInsert),
}

/// break_duration() of a splice_insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct BreakDuration {
    /// Return to the network automatically when the break ends.
    pub auto_return: bool,
    /// 33-bit duration in 90 kHz units.
    pub duration: u64,
}

/// splice_insert() command fields.
///
/// `pts_time` is present iff `program_splice_flag && !splice_immediate_flag`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SpliceInsert {
    pub event_id: u32,
    pub out_of_network: bool,
    pub program_splice_flag: bool,
    pub splice_immediate_flag: bool,
    pub pts_time: Option<u64>,
    pub break_duration: Option<BreakDuration>,
    pub unique_program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
}

impl SpliceInsert {
    /// Program splice at a given PTS, out of network.
    pub fn scheduled(event_id: u32, pts_time: u64, duration: Option<u64>) -> Self {
        Self {
            event_id,
            out_of_network: true,
            program_splice_flag: true,
            splice_immediate_flag: false,
            pts_time: Some(pts_time),
            break_duration: duration.map(|duration| BreakDuration {
                auto_return: true,
                duration,
            }),
            unique_program_id: 0,
            avail_num: 0,
            avails_expected: 0,
        }
    }

    /// Program splice at the next opportunity, out of network.
    pub fn immediate(event_id: u32, duration: Option<u64>) -> Self {
        Self {
            pts_time: None,
            splice_immediate_flag: true,
            ..Self::scheduled(event_id, 0, duration)
        }
    }

    /// Check the presence invariants and field widths.
    pub fn validate(&self) -> EncodeResult<()> {
        let needs_pts = self.program_splice_flag && !self.splice_immediate_flag;
        match (needs_pts, self.pts_time) {
            (true, None) => {
                return Err(EncodingError::invalid(
                    "pts_time",
                    "required for a scheduled program splice",
                ))
            }
            (false, Some(_)) => {
                return Err(EncodingError::invalid(
                    "pts_time",
                    "only allowed for a scheduled program splice",
                ))
            }
            (true, Some(pts)) if pts > PTS_MAX => {
                return Err(EncodingError::invalid(
                    "pts_time",
                    format!("{} exceeds 33 bits", pts),
                ))
            }
            _ => {}
        }

        if let Some(bd) = self.break_duration {
            if bd.duration > PTS_MAX {
                return Err(EncodingError::invalid(
                    "break_duration",
                    format!("{} exceeds 33 bits", bd.duration),
                ));
            }
        }

        Ok(())
    }
}

impl SpliceCommand {
    /// splice_command_type for this command.
    pub fn command_type(&self) -> u8 {
        match self {
            Self::SpliceNull => command_type::SPLICE_NULL,
            Self::TimeSignal { .. } => command_type::TIME_SIGNAL,
            Self::SpliceInsert(_) => command_type::SPLICE_INSERT,
        }
    }

    /// Serialize the command payload (without the type byte).
    pub(crate) fn encode_payload(&self) -> EncodeResult<Vec<u8>> {
        let mut w = BitWriter::with_capacity(20);

        match self {
            Self::SpliceNull => {}
            Self::TimeSignal { pts_time } => {
                if *pts_time > PTS_MAX {
                    return Err(EncodingError::invalid(
                        "pts_time",
                        format!("{} exceeds 33 bits", pts_time),
                    ));
                }
                write_splice_time(&mut w, *pts_time);
            }
            Self::SpliceInsert(insert) => {
                insert.validate()?;
                write_splice_insert(&mut w, insert);
            }
        }

        Ok(w.into_bytes())
    }

    /// Parse a command payload, returning it with the number of bytes consumed.
    pub(crate) fn decode_payload(command_type: u8, data: &[u8]) -> DecodeResult<(Self, usize)> {
        let mut r = BitReader::new(data);

        let command = match command_type {
            command_type::SPLICE_NULL => Self::SpliceNull,
            command_type::TIME_SIGNAL => {
                let pts_time = read_splice_time(&mut r)?.ok_or_else(|| {
                    DecodeError::malformed("time_signal without a specified pts_time")
                })?;
                Self::TimeSignal { pts_time }
            }
            command_type::SPLICE_INSERT => Self::SpliceInsert(read_splice_insert(&mut r)?),
            other => {
                return Err(DecodeError::malformed(format!(
                    "unsupported splice_command_type {:#04x}",
                    other
                )))
            }
        };

        Ok((command, r.consumed()))
    }
}

fn write_splice_time(w: &mut BitWriter, pts_time: u64) {
    w.put_flag(true); // time_specified_flag
    w.put(6, 0x3F);
    w.put(33, pts_time);
}

fn read_splice_time(r: &mut BitReader<'_>) -> DecodeResult<Option<u64>> {
    if r.read_flag("time_specified_flag")? {
        r.read(6, "splice_time reserved")?;
        Ok(Some(r.read(33, "pts_time")?))
    } else {
        r.read(7, "splice_time reserved")?;
        Ok(None)
    }
}

fn write_splice_insert(w: &mut BitWriter, insert: &SpliceInsert) {
    w.put(32, insert.event_id as u64);
    w.put_flag(false); // splice_event_cancel_indicator
    w.put(7, 0x7F);

    w.put_flag(insert.out_of_network);
    w.put_flag(insert.program_splice_flag);
    w.put_flag(insert.break_duration.is_some());
    w.put_flag(insert.splice_immediate_flag);
    w.put(4, 0xF);

    if let Some(pts) = insert.pts_time {
        write_splice_time(w, pts);
    }
    if !insert.program_splice_flag {
        w.put(8, 0); // component_count
    }
    if let Some(bd) = insert.break_duration {
        w.put_flag(bd.auto_return);
        w.put(6, 0x3F);
        w.put(33, bd.duration);
    }

    w.put(16, insert.unique_program_id as u64);
    w.put(8, insert.avail_num as u64);
    w.put(8, insert.avails_expected as u64);
}

fn read_splice_insert(r: &mut BitReader<'_>) -> DecodeResult<SpliceInsert> {
    let event_id = r.read(32, "splice_event_id")? as u32;
    if r.read_flag("splice_event_cancel_indicator")? {
        return Err(DecodeError::malformed(
            "cancelled splice events are not supported",
        ));
    }
    r.read(7, "splice_insert reserved")?;

    let out_of_network = r.read_flag("out_of_network_indicator")?;
    let program_splice_flag = r.read_flag("program_splice_flag")?;
    let duration_flag = r.read_flag("duration_flag")?;
    let splice_immediate_flag = r.read_flag("splice_immediate_flag")?;
    r.read(4, "splice_insert reserved")?;

    let mut pts_time = None;
    if program_splice_flag && !splice_immediate_flag {
        pts_time = Some(read_splice_time(r)?.ok_or_else(|| {
            DecodeError::malformed("scheduled program splice without pts_time")
        })?);
    }
    if !program_splice_flag {
        let component_count = r.read_u8("component_count")?;
        if component_count > 0 {
            return Err(DecodeError::malformed(
                "component splice mode is not supported",
            ));
        }
    }

    let break_duration = if duration_flag {
        let auto_return = r.read_flag("auto_return")?;
        r.read(6, "break_duration reserved")?;
        let duration = r.read(33, "break_duration")?;
        Some(BreakDuration {
            auto_return,
            duration,
        })
    } else {
        None
    };

    Ok(SpliceInsert {
        event_id,
        out_of_network,
        program_splice_flag,
        splice_immediate_flag,
        pts_time,
        break_duration,
        unique_program_id: r.read(16, "unique_program_id")? as u16,
        avail_num: r.read_u8("avail_num")?,
        avails_expected: r.read_u8("avails_expected")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_insert_payload_length() {
        let cmd = SpliceCommand::SpliceInsert(SpliceInsert::scheduled(1, 900_000, Some(2_700_000)));
        // 4 event id + 1 cancel + 1 flags + 5 splice_time + 5 break_duration + 4 trailer
        assert_eq!(cmd.encode_payload().unwrap().len(), 20);
    }

    #[test]
    fn immediate_insert_omits_splice_time() {
        let cmd = SpliceCommand::SpliceInsert(SpliceInsert::immediate(1, None));
        assert_eq!(cmd.encode_payload().unwrap().len(), 10);
    }

    #[test]
    fn time_signal_payload() {
        let cmd = SpliceCommand::TimeSignal { pts_time: 0x1_0000_0001 };
        assert_eq!(cmd.encode_payload().unwrap(), vec![0xFF, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn payload_roundtrip_with_consumed_length() {
        let mut insert = SpliceInsert::scheduled(0xDEAD_BEEF, 123_456, Some(90_000));
        insert.unique_program_id = 7;
        insert.avail_num = 1;
        insert.avails_expected = 2;
        let cmd = SpliceCommand::SpliceInsert(insert);
        let payload = cmd.encode_payload().unwrap();
        let (decoded, consumed) =
            SpliceCommand::decode_payload(command_type::SPLICE_INSERT, &payload).unwrap();
        assert_eq!(decoded, cmd);
        assert_eq!(consumed, payload.len());
    }

    #[test]
    fn component_mode_insert_roundtrips_without_components() {
        let insert = SpliceInsert {
            program_splice_flag: false,
            pts_time: None,
            ..SpliceInsert::scheduled(5, 0, None)
        };
        let cmd = SpliceCommand::SpliceInsert(insert);
        let payload = cmd.encode_payload().unwrap();
        let (decoded, _) =
            SpliceCommand::decode_payload(command_type::SPLICE_INSERT, &payload).unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn pts_presence_invariant_enforced() {
        let mut missing = SpliceInsert::scheduled(1, 0, None);
        missing.pts_time = None;
        assert!(matches!(
            missing.validate(),
            Err(EncodingError::InvalidField { field: "pts_time", .. })
        ));

        let mut unexpected = SpliceInsert::immediate(1, None);
        unexpected.pts_time = Some(10);
        assert!(unexpected.validate().is_err());
    }

    #[test]
    fn oversized_values_rejected() {
        let cmd = SpliceCommand::TimeSignal { pts_time: PTS_MAX + 1 };
        assert!(cmd.encode_payload().is_err());

        let insert = SpliceInsert::scheduled(1, 0, Some(PTS_MAX + 1));
        assert!(matches!(
            insert.validate(),
            Err(EncodingError::InvalidField { field: "break_duration", .. })
        ));
    }

    #[test]
    fn unsupported_command_type_is_malformed() {
        let err = SpliceCommand::decode_payload(command_type::BANDWIDTH_RESERVATION, &[]).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedSection(_)));
    }
}
