//! MSB-first bit ranges over byte slices.
//!
//! EEP tables address fields by bit offset counted from the most significant
//! bit of the first payload byte. Fields may straddle byte boundaries.

use serde::Serialize;

/// Largest field width supported by [`BitRange`].
pub const MAX_FIELD_BITS: u8 = 32;

/// A contiguous run of bits: `offset` bits from the MSB of byte 0, `size` bits wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BitRange {
    pub offset: u16,
    pub size: u8,
}

impl BitRange {
    pub const fn new(offset: u16, size: u8) -> Self {
        Self { offset, size }
    }

    /// First bit past the range.
    pub fn end(self) -> usize {
        self.offset as usize + self.size as usize
    }

    /// Largest value representable in the range.
    pub fn max_value(self) -> u32 {
        if self.size >= 32 {
            u32::MAX
        } else {
            (1u32 << self.size) - 1
        }
    }

    /// Returns true if the range lies within `len` bytes.
    pub fn fits(self, len: usize) -> bool {
        self.size > 0 && self.size <= MAX_FIELD_BITS && self.end() <= len * 8
    }

    /// Read the range as an unsigned integer.
    ///
    /// Returns `None` if the range does not fit in `data`.
    pub fn read(self, data: &[u8]) -> Option<u32> {
        if !self.fits(data.len()) {
            return None;
        }

        let mut value = 0u32;
        for bit in self.offset as usize..self.end() {
            let byte = data[bit / 8];
            let b = (byte >> (7 - (bit % 8))) & 1;
            value = (value << 1) | b as u32;
        }
        Some(value)
    }

    /// Write the low `size` bits of `value` into the range.
    ///
    /// Returns `None` if the range does not fit in `data`; bits of `value`
    /// above the width are ignored.
    pub fn write(self, data: &mut [u8], value: u32) -> Option<()> {
        if !self.fits(data.len()) {
            return None;
        }

        let value = value & self.max_value();
        for (i, bit) in (self.offset as usize..self.end()).enumerate() {
            let shift = self.size as usize - 1 - i;
            let mask = 1u8 << (7 - (bit % 8));
            if (value >> shift) & 1 == 1 {
                data[bit / 8] |= mask;
            } else {
                data[bit / 8] &= !mask;
            }
        }
        Some(())
    }
}
