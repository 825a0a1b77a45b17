//! Block header wire layout and hashing.

use crate::uint::U256;
use sha2::{Digest, Sha256};
use std::fmt;

/// Double SHA-256 block hash, stored in internal (little-endian) byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// The hash as a 256-bit integer, for comparison against a target.
    pub fn to_u256(&self) -> U256 {
        U256::from_le_bytes(&self.0)
    }

    /// Parse the conventional byte-reversed hex display form.
    pub fn from_hex(display: &str) -> Option<Self> {
        let mut bytes: [u8; 32] = hex::decode(display).ok()?.try_into().ok()?;
        bytes.reverse();
        Some(Self(bytes))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "{}", hex::encode(reversed))
    }
}

/// Block header as carried on the wire.
///
/// Height is not part of the header; it is assigned when the block is
/// connected and passed to validation separately.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: BlockHash,
    pub merkle_root: [u8; 32],
    pub final_sapling_root: [u8; 32],
    /// Seconds since the Unix epoch.
    pub time: u32,
    /// Compact target.
    pub bits: u32,
    pub nonce: [u8; 32],
    pub solution: Vec<u8>,
}

impl BlockHeader {
    /// Length of the header without nonce and solution.
    pub const EQUIHASH_INPUT_LEN: usize = 4 + 32 + 32 + 32 + 4 + 4;

    /// Header fields hashed into the Equihash personalisation input
    /// (everything before the nonce).
    pub fn equihash_input(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::EQUIHASH_INPUT_LEN);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.prev_block.0);
        buf.extend_from_slice(&self.merkle_root);
        buf.extend_from_slice(&self.final_sapling_root);
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf.extend_from_slice(&self.bits.to_le_bytes());
        buf
    }

    /// Full wire serialization.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = self.equihash_input();
        buf.reserve(32 + 9 + self.solution.len());
        buf.extend_from_slice(&self.nonce);
        write_compact_size(&mut buf, self.solution.len() as u64);
        buf.extend_from_slice(&self.solution);
        buf
    }

    /// Double SHA-256 of the serialized header.
    pub fn hash(&self) -> BlockHash {
        let first = Sha256::digest(self.serialize());
        let second = Sha256::digest(first);
        let mut out = [0u8; 32];
        out.copy_from_slice(&second);
        BlockHash(out)
    }
}

/// Bitcoin-style variable-length integer prefix.
fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}
