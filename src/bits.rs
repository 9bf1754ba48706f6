//! MSB-first bit reading over JPEG entropy-coded data.
//!
//! The cursor works on bytes that have already had their `0xFF 0x00`
//! stuffing and restart markers removed, so every byte it sees is payload.

use crate::error::{Error, Result};

/// Largest value accepted by [`BitCursor::read_bits`].
pub const MAX_READ_BITS: u8 = 16;

/// A (byte, bit) position in an entropy-coded byte stream.
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    byte: usize,
    bit: u8,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte: 0,
            bit: 0,
        }
    }

    /// Current byte offset.
    pub fn byte_position(&self) -> usize {
        self.byte
    }

    /// Bits consumed within the current byte (0..8).
    pub fn bit_position(&self) -> u8 {
        self.bit
    }

    /// Number of unread bits.
    pub fn remaining_bits(&self) -> usize {
        self.data
            .len()
            .saturating_sub(self.byte)
            .saturating_mul(8)
            .saturating_sub(self.bit as usize)
    }

    /// Read a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<u8> {
        let byte = *self.data.get(self.byte).ok_or(Error::StreamUnderrun)?;
        let value = (byte >> (7 - self.bit)) & 1;
        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.byte += 1;
        }
        Ok(value)
    }

    /// Read `n` bits (at most 16) as an unsigned value, most significant first.
    ///
    /// The bits may span up to three bytes.
    pub fn read_bits(&mut self, n: u8) -> Result<u16> {
        if n == 0 {
            return Ok(0);
        }
        if n > MAX_READ_BITS {
            return Err(Error::InvalidDecode(format!(
                "cannot read {n} bits at once"
            )));
        }
        if (n as usize) > self.remaining_bits() {
            return Err(Error::StreamUnderrun);
        }

        let at = |i: usize| self.data.get(self.byte + i).copied().unwrap_or(0) as u32;
        let window = (at(0) << 16) | (at(1) << 8) | at(2);
        let shift = 24 - self.bit as u32 - n as u32;
        let value = (window >> shift) & ((1u32 << n) - 1);

        let consumed = self.bit as usize + n as usize;
        self.byte += consumed / 8;
        self.bit = (consumed % 8) as u8;
        Ok(value as u16)
    }

    /// Skip to the next byte boundary.
    pub fn align(&mut self) {
        if self.bit != 0 {
            self.bit = 0;
            self.byte += 1;
        }
    }

    /// Read a `len`-bit JPEG magnitude value and sign-extend it.
    ///
    /// A value whose top bit is clear is negative: `value - (2^len - 1)`.
    pub fn receive_extend(&mut self, len: u8) -> Result<i32> {
        if len == 0 {
            return Ok(0);
        }
        let value = self.read_bits(len)? as i32;
        Ok(extend(value, len))
    }
}

/// JPEG EXTEND procedure (ITU T.81 F.2.2.1).
#[inline]
pub fn extend(value: i32, len: u8) -> i32 {
    if len == 0 {
        return 0;
    }
    if value < (1 << (len - 1)) {
        value - ((1 << len) - 1)
    } else {
        value
    }
}
