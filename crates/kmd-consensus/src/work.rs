//! Chain work accounting.
//!
//! The work of a block is the expected number of hashes needed to meet its
//! target. Summed over a chain it decides which fork is best; divided by
//! the tip's work it converts a work difference into seconds.

use crate::chain_params::ConsensusParams;
use crate::compact::{decode_compact, encode_compact};
use crate::difficulty::get_next_work_required;
use crate::error::ConsensusResult;
use crate::uint::U256;
use crate::window::AncestorWindow;
use tracing::trace;

/// Expected hashes to meet the target encoded by `bits`.
///
/// Unusable targets (negative, overflowed or zero) carry no work.
pub fn block_proof(bits: u32) -> U256 {
    let decoded = decode_compact(bits);
    if !decoded.is_usable() {
        return U256::zero();
    }
    work_for_target(&decoded.target)
}

/// `2^256 / (target + 1)`, computed without leaving 256 bits.
pub fn work_for_target(target: &U256) -> U256 {
    (!target / &(target + 1u64)) + 1u64
}

/// Cumulative chain work.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChainWork(U256);

impl ChainWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Work accumulated over blocks with the given compact targets.
    pub fn from_bits<I: IntoIterator<Item = u32>>(bits: I) -> Self {
        let mut work = Self::new();
        for b in bits {
            work.add_block(b);
        }
        work
    }

    pub fn add_block(&mut self, bits: u32) {
        self.0 = &self.0 + &block_proof(bits);
    }

    /// Work after connecting a block with `bits` on top of `self`.
    pub fn extended(&self, bits: u32) -> Self {
        let mut next = self.clone();
        next.add_block(bits);
        next
    }

    pub fn total(&self) -> &U256 {
        &self.0
    }
}

impl From<U256> for ChainWork {
    fn from(work: U256) -> Self {
        Self(work)
    }
}

/// Seconds of mining at the tip's difficulty that separate two chain works.
///
/// Positive when `to` has more work than `from`. Results that do not fit in
/// 63 bits, or a tip without usable work, saturate to `±i64::MAX`.
pub fn equivalent_time(to: &U256, from: &U256, tip_bits: u32, params: &ConsensusParams) -> i64 {
    let (diff, sign) = if to > from {
        (to - from, 1)
    } else {
        (from - to, -1)
    };

    let tip_proof = block_proof(tip_bits);
    let Some(seconds) = (diff * params.target_spacing as u64).checked_div(&tip_proof) else {
        return sign * i64::MAX;
    };
    if seconds.bits() > 63 {
        return sign * i64::MAX;
    }
    sign * seconds.low_u64() as i64
}

/// Difficulty of `bits` relative to the chain's `pow_limit`, as reported
/// over RPC.
pub fn difficulty(bits: u32, params: &ConsensusParams) -> f64 {
    let limit_bits = encode_compact(&params.pow_limit);
    let mut shift = (bits >> 24) & 0xff;
    let limit_shift = (limit_bits >> 24) & 0xff;

    let mut diff = (limit_bits & 0x00ff_ffff) as f64 / (bits & 0x00ff_ffff) as f64;
    while shift < limit_shift {
        diff *= 256.0;
        shift += 1;
    }
    while shift > limit_shift {
        diff /= 256.0;
        shift -= 1;
    }
    diff
}

/// Difficulty the next block will be required to meet.
pub fn network_difficulty(window: &AncestorWindow, params: &ConsensusParams) -> ConsensusResult<f64> {
    let bits = get_next_work_required(window, None, params)?;
    let diff = difficulty(bits, params);
    trace!(bits, diff, "Network difficulty");
    Ok(diff)
}
