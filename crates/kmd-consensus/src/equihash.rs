//! Equihash solution checking.

use crate::chain_params::ConsensusParams;
use crate::header::{BlockHash, BlockHeader};
use crate::{ConsensusError, ConsensusResult};
use tracing::trace;

/// Block on a chain with customised parameters that was accepted without a
/// valid solution and must stay accepted.
const GRANDFATHERED_HASH: &str =
    "027e3758c3a65b12aa1046462b486d0a63bfa1beae327897f56c5cfb7daaae71";

/// Verifies an Equihash solution.
pub trait SolutionVerifier {
    /// # Arguments
    /// * `n`, `k` - Equihash parameters
    /// * `input` - Header bytes before the nonce
    /// * `nonce` - 32-byte nonce
    /// * `solution` - Packed solution indices
    fn verify(&self, n: u32, k: u32, input: &[u8], nonce: &[u8], solution: &[u8])
        -> Result<(), String>;
}

/// Verifier backed by the `equihash` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct EquihashVerifier;

impl SolutionVerifier for EquihashVerifier {
    fn verify(
        &self,
        n: u32,
        k: u32,
        input: &[u8],
        nonce: &[u8],
        solution: &[u8],
    ) -> Result<(), String> {
        ::equihash::is_valid_solution(n, k, input, nonce, solution).map_err(|e| e.to_string())
    }
}

/// True for the one header exempt from solution checks on customised chains.
pub fn is_grandfathered(hash: &BlockHash) -> bool {
    hash.to_string() == GRANDFATHERED_HASH
}

/// Check a header's Equihash solution with the default verifier.
pub fn check_equihash_solution(
    header: &BlockHeader,
    params: &ConsensusParams,
) -> ConsensusResult<()> {
    check_equihash_solution_with(header, params, &EquihashVerifier)
}

/// Check a header's Equihash solution.
///
/// Chains on another algorithm and regtest skip the check.
pub fn check_equihash_solution_with<V: SolutionVerifier + ?Sized>(
    header: &BlockHeader,
    params: &ConsensusParams,
    verifier: &V,
) -> ConsensusResult<()> {
    if !params.is_equihash() {
        return Ok(());
    }
    if params.equihash_override.is_some() && is_grandfathered(&header.hash()) {
        return Ok(());
    }
    if params.is_regtest() {
        return Ok(());
    }

    let eh = params.equihash_params();
    trace!(n = eh.n, k = eh.k, len = header.solution.len(), "Verifying Equihash solution");
    verifier
        .verify(
            eh.n,
            eh.k,
            &header.equihash_input(),
            &header.nonce,
            &header.solution,
        )
        .map_err(ConsensusError::InvalidEquihashSolution)
}
