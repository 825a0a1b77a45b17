//! Test data generators for integration tests.
//!
//! Chains with controlled solve times, notary keys and headers ground to
//! meet (or miss) a target.

use crate::harness::InMemoryChain;
use kmd_consensus::{BlockHash, BlockHeader, U256};

/// Timestamp of the first generated block.
pub const GENESIS_TIME: u32 = 1_600_000_000;

/// A typical mid-range compact target.
pub const STEADY_BITS: u32 = 0x1e0f_fff0;

/// Chain of `len` blocks spaced exactly `spacing` seconds apart.
pub fn steady_chain(len: usize, spacing: u32, bits: u32) -> InMemoryChain {
    let mut chain = InMemoryChain::new();
    for i in 0..len as u32 {
        chain.push(GENESIS_TIME + i * spacing, bits);
    }
    chain
}

/// Chain whose block `i + 1` arrives `solvetimes[i]` seconds after block `i`.
pub fn chain_with_solvetimes(solvetimes: &[u32], bits: u32) -> InMemoryChain {
    chain_with_solvetimes_and_bits(solvetimes, |_| bits)
}

/// As `chain_with_solvetimes`, choosing each block's bits by height.
pub fn chain_with_solvetimes_and_bits<F: Fn(u32) -> u32>(solvetimes: &[u32], bits: F) -> InMemoryChain {
    let mut chain = InMemoryChain::new();
    let mut time = GENESIS_TIME;
    chain.push(time, bits(0));
    for (i, solvetime) in solvetimes.iter().enumerate() {
        time = time.wrapping_add(*solvetime);
        chain.push(time, bits(i as u32 + 1));
    }
    chain
}

/// Deterministic compressed pubkey for notary `seed`.
pub fn notary_pubkey(seed: u8) -> [u8; 33] {
    let mut key = [seed; 33];
    key[0] = 0x02 | (seed & 1);
    key
}

/// Header with the given time and bits and a zero nonce.
pub fn test_header(time: u32, bits: u32) -> BlockHeader {
    BlockHeader {
        version: 4,
        prev_block: BlockHash([0xab; 32]),
        merkle_root: [0xcd; 32],
        final_sapling_root: [0xef; 32],
        time,
        bits,
        nonce: [0; 32],
        solution: vec![0; 1344],
    }
}

/// Vary the nonce until the hash meets `target` (`meet = true`) or misses it.
pub fn grind_header(mut header: BlockHeader, target: &U256, meet: bool) -> BlockHeader {
    for n in 0u64.. {
        header.nonce[..8].copy_from_slice(&n.to_le_bytes());
        if (header.hash().to_u256() <= *target) == meet {
            return header;
        }
    }
    unreachable!("nonce space exhausted")
}
