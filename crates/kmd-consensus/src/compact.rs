//! Compact ("nBits") target encoding.
//!
//! A compact value packs a 256-bit target into 32 bits: the high byte is
//! the size in bytes, the low 23 bits are the mantissa and bit 23 is a sign
//! bit. Decoding reports the sign and overflow conditions separately so
//! that validation can reject them.

use crate::uint::U256;

/// Sign bit of the mantissa.
const SIGN_BIT: u32 = 0x0080_0000;

/// Mantissa mask (23 bits).
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Result of decoding a compact value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTarget {
    /// The decoded target (bits shifted beyond 256 are lost).
    pub target: U256,
    /// Mantissa was non-zero with the sign bit set.
    pub negative: bool,
    /// The encoded value does not fit in 256 bits.
    pub overflow: bool,
}

impl DecodedTarget {
    /// True when the target may be used as a proof-of-work bound:
    /// not negative, not overflowed and non-zero.
    pub fn is_usable(&self) -> bool {
        !self.negative && !self.overflow && !self.target.is_zero()
    }
}

/// Decode compact bits into a target.
pub fn decode_compact(bits: u32) -> DecodedTarget {
    let size = bits >> 24;
    let mut word = bits & MANTISSA_MASK;

    let target = if size <= 3 {
        word >>= 8 * (3 - size);
        U256::from(word)
    } else {
        U256::from(word) << (8 * (size - 3))
    };

    let negative = word != 0 && (bits & SIGN_BIT) != 0;
    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

    DecodedTarget {
        target,
        negative,
        overflow,
    }
}

/// Encode a target as compact bits.
///
/// Only the three most significant bytes survive; the mantissa is shifted
/// down a byte when its top bit would read as a sign.
pub fn encode_compact(target: &U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        target.low_u64() << (8 * (3 - size))
    } else {
        (target >> (8 * (size - 3))).low_u64()
    } as u32;

    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | (size << 24)
}
