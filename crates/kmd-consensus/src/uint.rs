//! Fixed-width 256-bit unsigned integer.
//!
//! Difficulty targets are defined over 256-bit integers whose addition,
//! subtraction and multiplication wrap modulo 2^256. Every implementation
//! of the retarget rules has to reproduce that wrapping exactly, so the
//! arithmetic here never grows past 256 bits.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use std::fmt;
use std::ops::{Add, Div, Mul, Not, Shl, Shr, Sub};
use std::sync::OnceLock;

/// 2^256.
fn modulus() -> &'static BigUint {
    static MODULUS: OnceLock<BigUint> = OnceLock::new();
    MODULUS.get_or_init(|| BigUint::one() << 256usize)
}

/// 2^256 - 1.
fn all_ones() -> &'static BigUint {
    static ALL_ONES: OnceLock<BigUint> = OnceLock::new();
    ALL_ONES.get_or_init(|| modulus() - BigUint::one())
}

/// 256-bit unsigned integer with wrapping arithmetic.
///
/// Invariant: the wrapped value is always below 2^256.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct U256(BigUint);

impl U256 {
    /// Zero.
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// One.
    pub fn one() -> Self {
        Self(BigUint::one())
    }

    /// 2^256 - 1.
    pub fn max_value() -> Self {
        Self(all_ones().clone())
    }

    /// Wrap an arbitrary-precision value into 256 bits.
    pub fn from_biguint(value: BigUint) -> Self {
        if value.bits() > 256 {
            Self(value % modulus())
        } else {
            Self(value)
        }
    }

    /// Borrow the underlying arbitrary-precision value.
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Interpret 32 bytes as a little-endian integer (the in-memory order of
    /// block hashes).
    pub fn from_le_bytes(bytes: &[u8; 32]) -> Self {
        Self(BigUint::from_bytes_le(bytes))
    }

    /// Interpret 32 bytes as a big-endian integer.
    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }

    /// Big-endian 32-byte representation.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let raw = self.0.to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - raw.len()..].copy_from_slice(&raw);
        out
    }

    /// Parse a big-endian hex string (optional `0x` prefix, at most 64 digits).
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        let trimmed = hex_str.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > 64 {
            return None;
        }
        BigUint::parse_bytes(digits.as_bytes(), 16).map(Self)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Position of the highest set bit plus one (0 for zero).
    pub fn bits(&self) -> u32 {
        self.0.bits() as u32
    }

    /// The least significant 64 bits.
    pub fn low_u64(&self) -> u64 {
        self.0.iter_u64_digits().next().unwrap_or(0)
    }

    /// Division that returns `None` for a zero divisor.
    pub fn checked_div(&self, rhs: &U256) -> Option<U256> {
        if rhs.is_zero() {
            None
        } else {
            Some(Self(&self.0 / &rhs.0))
        }
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<u32> for U256 {
    fn from(value: u32) -> Self {
        Self(BigUint::from(value))
    }
}

impl<'a> Add<&'a U256> for &'a U256 {
    type Output = U256;

    fn add(self, rhs: &'a U256) -> U256 {
        U256::from_biguint(&self.0 + &rhs.0)
    }
}

impl<'a> Sub<&'a U256> for &'a U256 {
    type Output = U256;

    fn sub(self, rhs: &'a U256) -> U256 {
        if self.0 >= rhs.0 {
            U256(&self.0 - &rhs.0)
        } else {
            U256(modulus() - (&rhs.0 - &self.0))
        }
    }
}

impl<'a> Mul<&'a U256> for &'a U256 {
    type Output = U256;

    fn mul(self, rhs: &'a U256) -> U256 {
        U256::from_biguint(&self.0 * &rhs.0)
    }
}

/// Truncating division. Panics on a zero divisor, like the primitive
/// integer types; callers guard divisors that come from configuration.
impl<'a> Div<&'a U256> for &'a U256 {
    type Output = U256;

    fn div(self, rhs: &'a U256) -> U256 {
        U256(&self.0 / &rhs.0)
    }
}

macro_rules! forward_owned_binop {
    ($($imp:ident :: $method:ident),*) => {$(
        impl $imp<U256> for U256 {
            type Output = U256;

            fn $method(self, rhs: U256) -> U256 {
                (&self).$method(&rhs)
            }
        }

        impl<'a> $imp<&'a U256> for U256 {
            type Output = U256;

            fn $method(self, rhs: &'a U256) -> U256 {
                (&self).$method(rhs)
            }
        }

        impl $imp<u64> for U256 {
            type Output = U256;

            fn $method(self, rhs: u64) -> U256 {
                (&self).$method(&U256::from(rhs))
            }
        }

        impl<'a> $imp<u64> for &'a U256 {
            type Output = U256;

            fn $method(self, rhs: u64) -> U256 {
                self.$method(&U256::from(rhs))
            }
        }
    )*};
}

forward_owned_binop!(Add::add, Sub::sub, Mul::mul, Div::div);

impl Not for &U256 {
    type Output = U256;

    fn not(self) -> U256 {
        U256(all_ones() - &self.0)
    }
}

impl Not for U256 {
    type Output = U256;

    fn not(self) -> U256 {
        !&self
    }
}

impl Shl<u32> for &U256 {
    type Output = U256;

    fn shl(self, shift: u32) -> U256 {
        if shift >= 256 {
            U256::zero()
        } else {
            U256::from_biguint(&self.0 << shift as usize)
        }
    }
}

impl Shl<u32> for U256 {
    type Output = U256;

    fn shl(self, shift: u32) -> U256 {
        &self << shift
    }
}

impl Shr<u32> for &U256 {
    type Output = U256;

    fn shr(self, shift: u32) -> U256 {
        U256(&self.0 >> shift as usize)
    }
}

impl Shr<u32> for U256 {
    type Output = U256;

    fn shr(self, shift: u32) -> U256 {
        &self >> shift
    }
}

impl fmt::Display for U256 {
    /// 64 lowercase hex digits, most significant first.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_be_bytes()))
    }
}

impl fmt::LowerHex for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U256(0x{})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_wraps() {
        let sum = U256::max_value() + U256::from(2u64);
        assert_eq!(sum, U256::one());
    }

    #[test]
    fn test_sub_wraps() {
        let diff = U256::zero() - U256::one();
        assert_eq!(diff, U256::max_value());

        let diff = U256::from(10u64) - U256::from(3u64);
        assert_eq!(diff, U256::from(7u64));
    }

    #[test]
    fn test_mul_wraps() {
        let half = U256::one() << 255;
        assert_eq!(half.clone() * 2u64, U256::zero());
        assert_eq!(half * 3u64, U256::one() << 255);
    }

    #[test]
    fn test_not_is_complement() {
        assert_eq!(!U256::zero(), U256::max_value());
        assert_eq!(!U256::from(0xffu64) + U256::from(0xffu64), U256::max_value());
    }

    #[test]
    fn test_shifts_truncate() {
        assert_eq!(U256::one() << 256, U256::zero());
        assert_eq!(U256::from(3u64) << 255, U256::one() << 255);
        assert_eq!(U256::from(0x1234u64) >> 8, U256::from(0x12u64));
    }

    #[test]
    fn test_bits_and_low_u64() {
        assert_eq!(U256::zero().bits(), 0);
        assert_eq!(U256::one().bits(), 1);
        assert_eq!((U256::one() << 200).bits(), 201);

        let value = (U256::one() << 128) + U256::from(42u64);
        assert_eq!(value.low_u64(), 42);
        assert_eq!(U256::zero().low_u64(), 0);
    }

    #[test]
    fn test_hex_roundtrip() {
        let hex_str = "0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f";
        let value = U256::from_hex(hex_str).unwrap();
        assert_eq!(value.to_string(), hex_str);
        assert_eq!(value.bits(), 252);
    }

    #[test]
    fn test_hex_rejects_garbage() {
        assert!(U256::from_hex("").is_none());
        assert!(U256::from_hex("zz").is_none());
        assert!(U256::from_hex(&"1".repeat(65)).is_none());
        assert_eq!(U256::from_hex("0x10"), Some(U256::from(16u64)));
    }

    #[test]
    fn test_le_bytes_ordering() {
        let mut bytes = [0u8; 32];
        bytes[0] = 1;
        assert_eq!(U256::from_le_bytes(&bytes), U256::one());
        bytes[0] = 0;
        bytes[31] = 0x80;
        assert_eq!(U256::from_le_bytes(&bytes), U256::one() << 255);
    }

    #[test]
    fn test_checked_div() {
        assert!(U256::one().checked_div(&U256::zero()).is_none());
        assert_eq!(
            U256::from(100u64).checked_div(&U256::from(7u64)),
            Some(U256::from(14u64))
        );
    }
}
