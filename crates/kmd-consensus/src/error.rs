//! Error types for consensus validation.

use thiserror::Error;

/// Consensus validation errors.
///
/// Every variant means "this candidate is invalid"; none of them indicate
/// a fault in the validator itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// The claimed target is negative, zero, overflowed or easier than the
    /// chain allows.
    #[error("Invalid target at height {height}: bits {bits:#010x} ({reason})")]
    InvalidTarget {
        height: u32,
        bits: u32,
        reason: &'static str,
    },

    /// The header hash does not meet the target.
    #[error("Invalid proof of work at height {height}: hash {hash} above target {target}")]
    InvalidProofOfWork {
        height: u32,
        hash: String,
        target: String,
    },

    /// The Equihash solution does not verify.
    #[error("Invalid Equihash solution: {0}")]
    InvalidEquihashSolution(String),

    /// The ancestor window does not reach back far enough.
    #[error("Height out of range: need ancestor at height {required}, window ends at {available}")]
    HeightOutOfRange { required: u32, available: u32 },

    /// Ancestor entries are not a contiguous, newest-first run of heights.
    #[error("Invalid ancestry: {0}")]
    InvalidAncestry(String),
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
