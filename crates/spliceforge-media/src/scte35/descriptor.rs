//! Splice descriptors.
//!
//! Only `avail_descriptor` and `segmentation_descriptor` are modelled; other
//! tags are skipped on decode.

use super::bits::{BitReader, BitWriter};
use crate::error::{DecodeError, DecodeResult, EncodeResult, EncodingError};

/// "CUEI", the identifier every SCTE-35 descriptor carries.
pub const CUEI_IDENTIFIER: u32 = 0x4355_4549;

pub const AVAIL_DESCRIPTOR_TAG: u8 = 0x00;
pub const SEGMENTATION_DESCRIPTOR_TAG: u8 = 0x02;

/// Largest value of the 40-bit segmentation_duration.
const SEGMENTATION_DURATION_MAX: u64 = (1 << 40) - 1;

/// segmentation_type_id values used by the cue builder.
pub mod segmentation_type {
    pub const PROGRAM_START: u8 = 0x10;
    pub const PROGRAM_END: u8 = 0x11;
    pub const PROVIDER_ADVERTISEMENT_START: u8 = 0x30;
    pub const PROVIDER_ADVERTISEMENT_END: u8 = 0x31;
    pub const DISTRIBUTOR_ADVERTISEMENT_START: u8 = 0x32;
    pub const DISTRIBUTOR_ADVERTISEMENT_END: u8 = 0x33;
    pub const PROVIDER_PLACEMENT_OPPORTUNITY_START: u8 = 0x34;
    pub const PROVIDER_PLACEMENT_OPPORTUNITY_END: u8 = 0x35;
    pub const DISTRIBUTOR_PLACEMENT_OPPORTUNITY_START: u8 = 0x36;
    pub const DISTRIBUTOR_PLACEMENT_OPPORTUNITY_END: u8 = 0x37;

    /// Types that carry sub_segment_num/sub_segments_expected.
    pub fn has_sub_segments(type_id: u8) -> bool {
        matches!(type_id, 0x34 | 0x36 | 0x38 | 0x3A | 0x44 | 0x46)
    }
}

/// A descriptor in the section's descriptor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(tag = "type", rename_all = "snake_case"))]
pub enum SpliceDescriptor {
    Avail { provider_avail_id: u32 },
    Segmentation(SegmentationDescriptor),
}

/// segmentation_descriptor() with program-level segmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentationDescriptor {
    pub event_id: u32,
    /// Duration in 90 kHz units (40 bits).
    pub duration: Option<u64>,
    pub upid_type: u8,
    pub upid: Vec<u8>,
    pub segmentation_type_id: u8,
    pub segment_num: u8,
    pub segments_expected: u8,
    pub sub_segment_num: Option<u8>,
    pub sub_segments_expected: Option<u8>,
}

impl SegmentationDescriptor {
    /// Descriptor with no UPID and no sub-segment fields.
    pub fn new(event_id: u32, segmentation_type_id: u8, duration: Option<u64>) -> Self {
        Self {
            event_id,
            duration,
            upid_type: 0,
            upid: Vec::new(),
            segmentation_type_id,
            segment_num: 0,
            segments_expected: 0,
            sub_segment_num: None,
            sub_segments_expected: None,
        }
    }

    fn write_body(&self, w: &mut BitWriter) -> EncodeResult<()> {
        if let Some(d) = self.duration {
            if d > SEGMENTATION_DURATION_MAX {
                return Err(EncodingError::invalid(
                    "segmentation_duration",
                    format!("{} exceeds 40 bits", d),
                ));
            }
        }
        if self.upid.len() > u8::MAX as usize {
            return Err(EncodingError::invalid(
                "segmentation_upid",
                format!("{} bytes exceeds 255", self.upid.len()),
            ));
        }
        if self.sub_segments_expected.is_some() && self.sub_segment_num.is_none() {
            return Err(EncodingError::invalid(
                "sub_segments_expected",
                "requires sub_segment_num",
            ));
        }

        w.put(32, CUEI_IDENTIFIER as u64);
        w.put(32, self.event_id as u64);
        w.put_flag(false); // segmentation_event_cancel_indicator
        w.put(7, 0x7F);

        w.put_flag(true); // program_segmentation_flag
        w.put_flag(self.duration.is_some());
        w.put_flag(true); // delivery_not_restricted_flag
        w.put(5, 0x1F);

        if let Some(d) = self.duration {
            w.put(40, d);
        }

        w.put(8, self.upid_type as u64);
        w.put(8, self.upid.len() as u64);
        w.put_bytes(&self.upid);

        w.put(8, self.segmentation_type_id as u64);
        w.put(8, self.segment_num as u64);
        w.put(8, self.segments_expected as u64);

        if let Some(num) = self.sub_segment_num {
            w.put(8, num as u64);
        }
        if let Some(expected) = self.sub_segments_expected {
            w.put(8, expected as u64);
        }

        Ok(())
    }

    fn read_body(body: &[u8]) -> DecodeResult<Self> {
        let mut r = BitReader::new(body);
        let event_id = r.read(32, "segmentation_event_id")? as u32;
        if r.read_flag("segmentation_event_cancel_indicator")? {
            return Err(DecodeError::malformed(
                "cancelled segmentation events are not supported",
            ));
        }
        r.read(7, "segmentation reserved")?;

        let program_segmentation = r.read_flag("program_segmentation_flag")?;
        let has_duration = r.read_flag("segmentation_duration_flag")?;
        r.read(6, "delivery restrictions")?;

        if !program_segmentation {
            let count = r.read_u8("component_count")? as usize;
            r.read_bytes(count * 6, "segmentation components")?;
        }

        let duration = if has_duration {
            Some(r.read(40, "segmentation_duration")?)
        } else {
            None
        };

        let upid_type = r.read_u8("segmentation_upid_type")?;
        let upid_len = r.read_u8("segmentation_upid_length")? as usize;
        let upid = r.read_bytes(upid_len, "segmentation_upid")?.to_vec();

        let segmentation_type_id = r.read_u8("segmentation_type_id")?;
        let segment_num = r.read_u8("segment_num")?;
        let segments_expected = r.read_u8("segments_expected")?;

        let sub_segment_num = match r.remaining_bytes() {
            0 => None,
            _ => Some(r.read_u8("sub_segment_num")?),
        };
        let sub_segments_expected = match r.remaining_bytes() {
            0 => None,
            _ => Some(r.read_u8("sub_segments_expected")?),
        };

        Ok(Self {
            event_id,
            duration,
            upid_type,
            upid,
            segmentation_type_id,
            segment_num,
            segments_expected,
            sub_segment_num,
            sub_segments_expected,
        })
    }
}

impl SpliceDescriptor {
    pub fn tag(&self) -> u8 {
        match self {
            Self::Avail { .. } => AVAIL_DESCRIPTOR_TAG,
            Self::Segmentation(_) => SEGMENTATION_DESCRIPTOR_TAG,
        }
    }

    /// Serialize tag, length and body.
    pub(crate) fn encode(&self) -> EncodeResult<Vec<u8>> {
        let mut body = BitWriter::with_capacity(32);
        match self {
            Self::Avail { provider_avail_id } => {
                body.put(32, CUEI_IDENTIFIER as u64);
                body.put(32, *provider_avail_id as u64);
            }
            Self::Segmentation(seg) => seg.write_body(&mut body)?,
        }

        if body.len() > u8::MAX as usize {
            return Err(EncodingError::invalid(
                "descriptor_length",
                format!("{} bytes exceeds 255", body.len()),
            ));
        }

        let body = body.into_bytes();
        let mut out = Vec::with_capacity(body.len() + 2);
        out.push(self.tag());
        out.push(body.len() as u8);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse a descriptor loop. Descriptors with unknown tags or a foreign
    /// identifier are skipped.
    pub(crate) fn decode_loop(data: &[u8]) -> DecodeResult<Vec<Self>> {
        let mut r = BitReader::new(data);
        let mut descriptors = Vec::new();

        while r.remaining_bytes() > 0 {
            let tag = r.read_u8("splice_descriptor_tag")?;
            let len = r.read_u8("descriptor_length")? as usize;
            let body = r.read_bytes(len, "descriptor body")?;

            if body.len() < 4 {
                return Err(DecodeError::malformed(format!(
                    "descriptor {:#04x} shorter than its identifier",
                    tag
                )));
            }
            let identifier = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
            if identifier != CUEI_IDENTIFIER {
                continue;
            }
            let body = &body[4..];

            match tag {
                AVAIL_DESCRIPTOR_TAG => {
                    let mut br = BitReader::new(body);
                    let provider_avail_id = br.read(32, "provider_avail_id")? as u32;
                    descriptors.push(Self::Avail { provider_avail_id });
                }
                SEGMENTATION_DESCRIPTOR_TAG => {
                    descriptors.push(Self::Segmentation(SegmentationDescriptor::read_body(body)?));
                }
                _ => {}
            }
        }

        Ok(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segmentation_descriptor_layout() {
        let seg = SegmentationDescriptor::new(
            0x0102_0304,
            segmentation_type::PROVIDER_ADVERTISEMENT_START,
            Some(2_700_000),
        );
        let bytes = SpliceDescriptor::Segmentation(seg).encode().unwrap();

        assert_eq!(bytes[0], SEGMENTATION_DESCRIPTOR_TAG);
        assert_eq!(bytes[1] as usize, bytes.len() - 2);
        assert_eq!(&bytes[2..6], b"CUEI");
        assert_eq!(&bytes[6..10], &[0x01, 0x02, 0x03, 0x04]);
        // program_segmentation, duration, delivery_not_restricted, reserved
        assert_eq!(bytes[11], 0xFF);
        // 4 id + 4 event + 1 + 1 + 5 duration + 2 upid + 3 type/num/expected
        assert_eq!(bytes[1], 20);
    }

    #[test]
    fn sub_segment_fields_follow_descriptor_length() {
        let mut seg = SegmentationDescriptor::new(
            9,
            segmentation_type::PROVIDER_PLACEMENT_OPPORTUNITY_START,
            None,
        );
        seg.sub_segment_num = Some(1);
        seg.sub_segments_expected = Some(3);
        let desc = SpliceDescriptor::Segmentation(seg);

        let bytes = desc.encode().unwrap();
        let decoded = SpliceDescriptor::decode_loop(&bytes).unwrap();
        assert_eq!(decoded, vec![desc]);
    }

    #[test]
    fn expected_without_num_rejected() {
        let mut seg = SegmentationDescriptor::new(1, 0x34, None);
        seg.sub_segments_expected = Some(2);
        assert!(SpliceDescriptor::Segmentation(seg).encode().is_err());
    }

    #[test]
    fn unknown_and_foreign_descriptors_skipped() {
        let mut data = vec![0x01, 0x08];
        data.extend_from_slice(b"CUEI");
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(&[0x02, 0x04]);
        data.extend_from_slice(b"XXXX");
        data.extend(
            SpliceDescriptor::Avail {
                provider_avail_id: 77,
            }
            .encode()
            .unwrap(),
        );

        let decoded = SpliceDescriptor::decode_loop(&data).unwrap();
        assert_eq!(
            decoded,
            vec![SpliceDescriptor::Avail {
                provider_avail_id: 77
            }]
        );
    }

    #[test]
    fn truncated_loop_is_malformed() {
        let data = [0x02, 0x10, b'C', b'U'];
        assert!(matches!(
            SpliceDescriptor::decode_loop(&data),
            Err(DecodeError::MalformedSection(_))
        ));
    }
}
