//! MSB-first bit packing for section fields.

use crate::error::{DecodeError, DecodeResult};

/// Bit writer producing big-endian, MSB-first output.
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    buf: Vec<u8>,
    bit_pos: u8,
}

impl BitWriter {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            bit_pos: 0,
        }
    }

    /// Write the low `width` bits of `value` (width <= 64).
    pub(crate) fn put(&mut self, width: u32, value: u64) {
        debug_assert!(width <= 64);
        for i in (0..width).rev() {
            let bit = ((value >> i) & 1) as u8;
            if self.bit_pos == 0 {
                self.buf.push(0);
            }
            if let Some(last) = self.buf.last_mut() {
                *last |= bit << (7 - self.bit_pos);
            }
            self.bit_pos = (self.bit_pos + 1) % 8;
        }
    }

    pub(crate) fn put_flag(&mut self, flag: bool) {
        self.put(1, flag as u64);
    }

    /// Append whole bytes; the writer must be byte aligned.
    pub(crate) fn put_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.bit_pos, 0, "put_bytes on unaligned writer");
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        debug_assert_eq!(self.bit_pos, 0, "unaligned writer finished");
        self.buf
    }
}

/// Bit reader over a borrowed section.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Read `width` bits (up to 64) as an unsigned value.
    pub(crate) fn read(&mut self, width: u32, field: &str) -> DecodeResult<u64> {
        let mut result = 0u64;

        for _ in 0..width {
            let byte = self
                .data
                .get(self.byte_pos)
                .ok_or_else(|| DecodeError::malformed(format!("truncated while reading {}", field)))?;
            let bit = (byte >> (7 - self.bit_pos)) & 1;
            result = (result << 1) | bit as u64;

            self.bit_pos += 1;
            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
        }

        Ok(result)
    }

    pub(crate) fn read_flag(&mut self, field: &str) -> DecodeResult<bool> {
        Ok(self.read(1, field)? == 1)
    }

    pub(crate) fn read_u8(&mut self, field: &str) -> DecodeResult<u8> {
        Ok(self.read(8, field)? as u8)
    }

    /// Borrow the next `len` bytes; the reader must be byte aligned.
    pub(crate) fn read_bytes(&mut self, len: usize, field: &str) -> DecodeResult<&'a [u8]> {
        debug_assert_eq!(self.bit_pos, 0, "read_bytes on unaligned reader");
        let end = self
            .byte_pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                DecodeError::malformed(format!(
                    "{} needs {} bytes, {} remain",
                    field,
                    len,
                    self.remaining_bytes()
                ))
            })?;
        let bytes = &self.data[self.byte_pos..end];
        self.byte_pos = end;
        Ok(bytes)
    }

    /// Whole bytes left after the current position.
    pub(crate) fn remaining_bytes(&self) -> usize {
        self.data.len().saturating_sub(self.byte_pos)
    }

    /// Bytes consumed so far (rounded up for a partial byte).
    pub(crate) fn consumed(&self) -> usize {
        self.byte_pos + usize::from(self.bit_pos > 0)
    }
}
