//! Fixed-position bit-field accessors over integer container words.
//!
//! The IGMP and MLD wire formats pack several sub-byte fields into shared
//! octets (the Resv/S/QRV octet, the max-resp-code mantissa/exponent
//! split).  These accessors precompute the mask and shift for a field and
//! guarantee that setting a field never disturbs bits outside its mask.
//!
//! Bit offsets are counted from the least significant bit of the
//! container.  Constructing a field whose range does not fit the
//! container fails immediately rather than at first use.

use crate::errors::BitFieldError;

/// A bit-field within a 32-bit container word.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitField {
    shift: u32,
    mask: u32,
    width: u32,
}

impl BitField {
    /// Creates an accessor for `width` bits starting `offset` bits above
    /// the least significant bit of a `u32`.
    pub fn new(offset: u32, width: u32) -> Result<BitField, BitFieldError> {
        if width == 0 || offset.checked_add(width).map_or(true, |end| end > 32) {
            return Err(BitFieldError::OutOfRange {
                offset,
                width,
                container_bits: 32,
            });
        }

        let value_mask = if width == 32 {
            u32::MAX
        } else {
            (1_u32 << width) - 1
        };

        Ok(BitField {
            shift: offset,
            mask: value_mask << offset,
            width,
        })
    }

    /// The largest value the field can hold.
    pub fn max_value(&self) -> u32 {
        self.mask >> self.shift
    }

    pub fn get(&self, word: u32) -> u32 {
        (word & self.mask) >> self.shift
    }

    /// Writes `value` into the field, preserving all bits of `word`
    /// outside the field's mask.
    pub fn set(&self, word: &mut u32, value: u32) -> Result<(), BitFieldError> {
        if value > self.max_value() {
            return Err(BitFieldError::ValueTooLarge {
                value,
                width: self.width,
            });
        }

        *word = (*word & !self.mask) | (value << self.shift);
        Ok(())
    }
}

/// A bit-field within a single octet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ByteBitField {
    shift: u32,
    mask: u8,
    width: u32,
}

impl ByteBitField {
    /// Creates an accessor for `width` bits starting `offset` bits above
    /// the least significant bit of a `u8`.
    pub fn new(offset: u32, width: u32) -> Result<ByteBitField, BitFieldError> {
        if width == 0 || offset.checked_add(width).map_or(true, |end| end > 8) {
            return Err(BitFieldError::OutOfRange {
                offset,
                width,
                container_bits: 8,
            });
        }

        let value_mask = ((1_u16 << width) - 1) as u8;

        Ok(ByteBitField {
            shift: offset,
            mask: value_mask << offset,
            width,
        })
    }

    pub fn max_value(&self) -> u8 {
        self.mask >> self.shift
    }

    pub fn get(&self, octet: u8) -> u8 {
        (octet & self.mask) >> self.shift
    }

    /// Writes `value` into the field, preserving all bits of `octet`
    /// outside the field's mask.
    pub fn set(&self, octet: &mut u8, value: u8) -> Result<(), BitFieldError> {
        if value > self.max_value() {
            return Err(BitFieldError::ValueTooLarge {
                value: value as u32,
                width: self.width,
            });
        }

        *octet = (*octet & !self.mask) | (value << self.shift);
        Ok(())
    }
}
