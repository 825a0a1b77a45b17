//! # kmd-consensus
//!
//! Proof-of-work consensus rules for the Komodo base chain and its asset
//! chains.
//!
//! This crate provides:
//! - Compact target encoding over wrapping 256-bit integers
//! - The averaging difficulty retarget and the adaptive retarget engine
//! - Proof-of-work validation, including notary easy-mining
//! - Equihash solution checking
//! - Chain work and RPC difficulty
//!
//! ## Retargeting
//!
//! The baseline retarget averages the targets of the last 17 blocks and
//! scales by the dampened ratio of actual to expected timespan, measured
//! between median-time-past values. Asset chains may enable adaptive proof
//! of work, which reacts to unusually fast or slow blocks within a 64-block
//! history and records its decision in the low two bits of `nBits`.
//!
//! ## Notaries
//!
//! Elected notaries may mine at the minimum difficulty (`0x200f0f0f`). The
//! election state lives outside consensus and is reached through the
//! [`NotaryElection`] trait.
//!
//! All rules are pure functions over an owned [`AncestorWindow`] snapshot,
//! so validation can run on many threads without sharing the block index.

mod adaptive;
mod chain_params;
mod compact;
mod difficulty;
pub mod equihash;
mod error;
pub mod header;
pub mod notary;
mod uint;
mod validation;
mod window;
pub mod work;

pub use adaptive::{
    exponential, exponential_multiplier, first_outer_trigger, solvetime_scaled_target,
    AdaptiveFlag, AdaptiveHistory, AdaptiveOutcome, AdaptiveRetarget, OuterTrigger,
    ADAPTIVE_HISTORY_LEN,
};
pub use chain_params::{
    AdaptivePowMode, ChainParamsError, ConsensusParams, ConsensusParamsConfig, EquihashParams,
    NetworkKind, PowAlgorithm, DEFAULT_BLOCK_TIME, MAX_AVERAGING_WINDOW,
};
pub use compact::{decode_compact, encode_compact, DecodedTarget};
pub use difficulty::{calculate_next_work_required, get_next_work_required, DifficultyAdjustment};
pub use equihash::{check_equihash_solution, EquihashVerifier, SolutionVerifier};
pub use error::{ConsensusError, ConsensusResult};
pub use header::{BlockHash, BlockHeader};
pub use notary::{
    is_second_block_allowed, NotaryElection, NotaryElectionResult, NotaryQuery, NotaryStanding,
    PriorityList,
};
pub use uint::U256;
pub use validation::{ChainTip, PowAcceptance, PowVerdict, ProofOfWorkValidator, ValidationContext};
pub use window::{
    median_time_past, AncestorWindow, ChainIndex, IndexedHeader, ANCESTOR_WINDOW_CAPACITY,
    MEDIAN_TIME_SPAN,
};
pub use work::{block_proof, equivalent_time, ChainWork};

/// Komodo network constants.
pub mod params {
    /// Compact encoding of the minimum difficulty (easiest target).
    pub const MINDIFF_NBITS: u32 = 0x200f_0f0f;

    /// Blocks per notary election.
    pub const ELECTION_GAP: u32 = 2000;

    /// Blocks at the start of each election during which notaries get no
    /// easy-mining relief.
    pub const ELECTION_GAP_GRACE: u32 = 64;

    /// Notary easy-mining applies above this height on the base chain.
    pub const NOTARY_ACTIVATION_HEIGHT: u32 = 34_000;

    /// Single height granted easy mining regardless of standing.
    pub const LEGACY_EASY_HEIGHT: u32 = 790_833;

    /// Above this height a base-chain hash that misses its target is
    /// rejected.
    pub const STRICT_POW_HEIGHT: u32 = 792_000;
}
