//! Proof-of-work validation.
//!
//! This module decides whether a header's proof of work is acceptable:
//! - Elected notaries may mine at the minimum difficulty (see `notary`)
//! - The claimed target must decode cleanly and stay within the chain limit
//! - Staked chains always compare against the minimum difficulty
//! - The header hash must meet the target, with the historical leniency
//!   the base chain granted before strict enforcement

use crate::chain_params::ConsensusParams;
use crate::compact::{decode_compact, DecodedTarget};
use crate::header::BlockHeader;
use crate::notary::{
    apply_gap_override, easy_mining_flag, NotaryElection, NotaryQuery, NotaryStanding,
};
use crate::params::{MINDIFF_NBITS, NOTARY_ACTIVATION_HEIGHT, STRICT_POW_HEIGHT};
use crate::uint::U256;
use crate::{ConsensusError, ConsensusResult};
use tracing::{debug, instrument, warn};

/// Height and time of the active chain tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainTip {
    pub height: u32,
    pub time: u32,
}

/// Node state that affects validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationContext {
    pub tip: ChainTip,
    /// The block index is still being loaded from disk.
    pub loading_blocks: bool,
}

impl ValidationContext {
    pub fn new(tip: ChainTip) -> Self {
        Self {
            tip,
            loading_blocks: false,
        }
    }

    pub fn loading(tip: ChainTip) -> Self {
        Self {
            tip,
            loading_blocks: true,
        }
    }
}

/// Why a proof of work was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowAcceptance {
    /// The hash meets the target.
    HashBelowTarget,
    /// The hash misses the target but the block index is loading.
    LoadingBypass,
    /// The hash misses the target on a base-chain block from before strict
    /// enforcement.
    LegacyLenient,
    /// Null miner pubkey; the block is checked again once the pubkey is known.
    DeferredNullPubkey,
}

/// Outcome of an accepted proof-of-work check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowVerdict {
    /// Height the header was checked at.
    pub height: u32,
    /// Target the hash was compared against.
    pub target: U256,
    /// The minimum-difficulty target replaced the claimed one.
    pub easy_mining: bool,
    pub notary_id: Option<u32>,
    /// Standing after any gap override.
    pub standing: NotaryStanding,
    pub acceptance: PowAcceptance,
}

/// Proof-of-work validator.
pub struct ProofOfWorkValidator<'a, E: NotaryElection> {
    params: &'a ConsensusParams,
    election: &'a E,
}

impl<'a, E: NotaryElection> ProofOfWorkValidator<'a, E> {
    pub fn new(params: &'a ConsensusParams, election: &'a E) -> Self {
        Self { params, election }
    }

    /// Check a header's proof of work.
    ///
    /// # Arguments
    /// * `header` - Candidate header
    /// * `pubkey` - Compressed public key of the miner (all zeros if unknown)
    /// * `height` - Candidate height, or 0 for "next after the tip"
    /// * `ctx` - Tip and loading state
    ///
    /// # Returns
    /// A verdict describing how the proof of work was accepted, or the
    /// reason it was rejected.
    #[instrument(skip(self, header, pubkey, ctx), fields(bits = header.bits, time = header.time))]
    pub fn check_proof_of_work(
        &self,
        header: &BlockHeader,
        pubkey: &[u8; 33],
        height: u32,
        ctx: &ValidationContext,
    ) -> ConsensusResult<PowVerdict> {
        let params = self.params;
        let height = if height == 0 {
            ctx.tip.height.saturating_add(1)
        } else {
            height
        };

        let mut decoded = decode_compact(header.bits);
        let mut verdict = PowVerdict {
            height,
            target: U256::zero(),
            easy_mining: false,
            notary_id: None,
            standing: NotaryStanding::NonNotary,
            acceptance: PowAcceptance::HashBelowTarget,
        };

        if height > NOTARY_ACTIVATION_HEIGHT && params.is_base_chain() {
            if pubkey.iter().all(|b| *b == 0) {
                debug!(height, "Null pubkey, deferring proof-of-work check");
                verdict.target = decoded.target;
                verdict.acceptance = PowAcceptance::DeferredNullPubkey;
                return Ok(verdict);
            }

            let election = self.election.elect(&NotaryQuery {
                height,
                tip_time: ctx.tip.time,
                block_time: header.time,
                pubkey,
            });

            if let Some(notary_id) = election.notary_id {
                let flag =
                    easy_mining_flag(height, election.special, election.standing, election.eligible);
                let mut standing = election.standing;

                if let Some(hf22_height) = params.hf22_height {
                    if height > hf22_height {
                        standing = apply_gap_override(
                            &election,
                            notary_id,
                            header.time,
                            ctx.tip.time,
                            self.max_gap(),
                            params.hf22_rotate_delta,
                        );
                    }
                }

                verdict.notary_id = Some(notary_id);
                verdict.standing = standing;

                if (flag || standing.value() > 0) && standing != NotaryStanding::CooldownPending {
                    debug!(height, notary_id, ?standing, "Easy mining");
                    decoded = decode_compact(MINDIFF_NBITS);
                    verdict.easy_mining = true;
                }
            }
        }

        check_target_bounds(&decoded, height, header.bits, params.validation_limit(height))?;

        if params.staked {
            decoded = decode_compact(MINDIFF_NBITS);
        }
        verdict.target = decoded.target;

        let hash = header.hash();
        if hash.to_u256() > verdict.target {
            if ctx.loading_blocks {
                verdict.acceptance = PowAcceptance::LoadingBypass;
                return Ok(verdict);
            }

            if !params.is_base_chain() || height > STRICT_POW_HEIGHT {
                if !params.is_regtest() {
                    warn!(
                        height,
                        hash = %hash,
                        target = %verdict.target,
                        notary_id = ?verdict.notary_id,
                        standing = ?verdict.standing,
                        pubkey = %hex::encode(pubkey),
                        "Hash above target"
                    );
                }
                return Err(ConsensusError::InvalidProofOfWork {
                    height,
                    hash: hash.to_string(),
                    target: verdict.target.to_string(),
                });
            }

            verdict.acceptance = PowAcceptance::LegacyLenient;
        }

        Ok(verdict)
    }

    /// Seconds past the tip after which the gap rules apply.
    fn max_gap(&self) -> u32 {
        u32::try_from(self.params.max_future_block_time.saturating_add(1)).unwrap_or(u32::MAX)
    }
}

fn check_target_bounds(
    decoded: &DecodedTarget,
    height: u32,
    bits: u32,
    limit: &U256,
) -> ConsensusResult<()> {
    let reason = if decoded.negative {
        "negative"
    } else if decoded.overflow {
        "overflow"
    } else if decoded.target.is_zero() {
        "zero"
    } else if decoded.target > *limit {
        "easier than limit"
    } else {
        return Ok(());
    };
    Err(ConsensusError::InvalidTarget {
        height,
        bits,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_params::PowAlgorithm;
    use crate::header::BlockHash;
    use crate::notary::{NotaryElectionResult, NOTARY_HISTORY_LEN};
    use std::cell::Cell;

    const PUBKEY: [u8; 33] = [0x02; 33];
    const HARD_BITS: u32 = 0x1d00_ffff;

    struct FixedElection {
        result: NotaryElectionResult,
        calls: Cell<u32>,
    }

    impl FixedElection {
        fn non_notary() -> Self {
            Self::with(NotaryElectionResult::default())
        }

        fn with(result: NotaryElectionResult) -> Self {
            Self {
                result,
                calls: Cell::new(0),
            }
        }
    }

    impl NotaryElection for FixedElection {
        fn elect(&self, _query: &NotaryQuery<'_>) -> NotaryElectionResult {
            self.calls.set(self.calls.get() + 1);
            self.result.clone()
        }
    }

    fn header(bits: u32, time: u32) -> BlockHeader {
        BlockHeader {
            version: 4,
            prev_block: BlockHash([0x01; 32]),
            merkle_root: [0x02; 32],
            time,
            bits,
            ..Default::default()
        }
    }

    /// Grind the nonce until the hash meets (or misses) `target`.
    fn grind(mut header: BlockHeader, target: &U256, meet: bool) -> BlockHeader {
        for n in 0u32.. {
            header.nonce[..4].copy_from_slice(&n.to_le_bytes());
            if (header.hash().to_u256() <= *target) == meet {
                return header;
            }
        }
        unreachable!()
    }

    fn mindiff() -> U256 {
        decode_compact(MINDIFF_NBITS).target
    }

    fn ctx(height: u32, time: u32) -> ValidationContext {
        ValidationContext::new(ChainTip { height, time })
    }

    fn notary(standing: NotaryStanding) -> NotaryElectionResult {
        NotaryElectionResult {
            notary_id: Some(4),
            standing,
            ..Default::default()
        }
    }

    // ============ Hash Comparison Tests ============

    #[test]
    fn test_hash_below_target_accepted() {
        let params = ConsensusParams::asset_chain("TEST");
        let election = FixedElection::non_notary();
        let validator = ProofOfWorkValidator::new(&params, &election);

        let h = grind(header(MINDIFF_NBITS, 1_000), &mindiff(), true);
        let verdict = validator
            .check_proof_of_work(&h, &PUBKEY, 100, &ctx(99, 940))
            .unwrap();
        assert_eq!(verdict.acceptance, PowAcceptance::HashBelowTarget);
        assert_eq!(verdict.target, mindiff());
        assert!(!verdict.easy_mining);
        assert_eq!(election.calls.get(), 0);
    }

    #[test]
    fn test_asset_chain_rejects_hash_above_target() {
        let params = ConsensusParams::asset_chain("TEST");
        let election = FixedElection::non_notary();
        let validator = ProofOfWorkValidator::new(&params, &election);

        let h = grind(header(MINDIFF_NBITS, 1_000), &mindiff(), false);
        let err = validator
            .check_proof_of_work(&h, &PUBKEY, 100, &ctx(99, 940))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidProofOfWork { height: 100, .. }));
    }

    #[test]
    fn test_loading_bypasses_hash_check() {
        let params = ConsensusParams::asset_chain("TEST");
        let election = FixedElection::non_notary();
        let validator = ProofOfWorkValidator::new(&params, &election);

        let h = grind(header(HARD_BITS, 1_000), &decode_compact(HARD_BITS).target, false);
        let loading = ValidationContext::loading(ChainTip {
            height: 99,
            time: 940,
        });
        let verdict = validator.check_proof_of_work(&h, &PUBKEY, 100, &loading).unwrap();
        assert_eq!(verdict.acceptance, PowAcceptance::LoadingBypass);
    }

    #[test]
    fn test_loading_does_not_bypass_bounds() {
        let params = ConsensusParams::asset_chain("TEST");
        let election = FixedElection::non_notary();
        let validator = ProofOfWorkValidator::new(&params, &election);

        let loading = ValidationContext::loading(ChainTip::default());
        let err = validator
            .check_proof_of_work(&header(0, 1_000), &PUBKEY, 100, &loading)
            .unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidTarget { reason: "zero", .. }));
    }

    #[test]
    fn test_legacy_base_chain_leniency() {
        let params = ConsensusParams::kmd_mainnet();
        let election = FixedElection::non_notary();
        let validator = ProofOfWorkValidator::new(&params, &election);

        let h = grind(header(HARD_BITS, 1_000), &decode_compact(HARD_BITS).target, false);
        let verdict = validator
            .check_proof_of_work(&h, &PUBKEY, 500_000, &ctx(499_999, 940))
            .unwrap();
        assert_eq!(verdict.acceptance, PowAcceptance::LegacyLenient);
        assert_eq!(election.calls.get(), 1);

        let err = validator
            .check_proof_of_work(&h, &PUBKEY, 792_001, &ctx(792_000, 940))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidProofOfWork { .. }));
    }

    #[test]
    fn test_regtest_still_rejects() {
        let params = ConsensusParams {
            asset_chain_symbol: Some("REG".to_string()),
            ..ConsensusParams::regtest()
        };
        let election = FixedElection::non_notary();
        let validator = ProofOfWorkValidator::new(&params, &election);

        let h = grind(header(MINDIFF_NBITS, 1_000), &mindiff(), false);
        assert!(validator
            .check_proof_of_work(&h, &PUBKEY, 10, &ctx(9, 940))
            .is_err());
    }

    // ============ Target Bounds Tests ============

    #[test]
    fn test_rejects_malformed_targets() {
        let params = ConsensusParams::asset_chain("TEST");
        let election = FixedElection::non_notary();
        let validator = ProofOfWorkValidator::new(&params, &election);
        let tip = ctx(99, 940);

        let cases = [
            (0x0492_3456, "negative"),
            (0x0000_0000, "zero"),
            (0x0180_3456, "zero"),
            (0xff12_3456, "overflow"),
            (0x207f_ffff, "easier than limit"),
        ];
        for (bits, expected) in cases {
            let err = validator
                .check_proof_of_work(&header(bits, 1_000), &PUBKEY, 100, &tip)
                .unwrap_err();
            assert_eq!(
                err,
                ConsensusError::InvalidTarget {
                    height: 100,
                    bits,
                    reason: expected
                }
            );
        }
    }

    #[test]
    fn test_alternate_limit_after_height_one() {
        let mut params = ConsensusParams::asset_chain("TEST");
        params.algorithm = PowAlgorithm::Alternate;
        let election = FixedElection::non_notary();
        let validator = ProofOfWorkValidator::new(&params, &election);

        // Within pow_limit but easier than the alternate limit.
        let h = grind(header(MINDIFF_NBITS, 1_000), &mindiff(), true);
        assert!(validator
            .check_proof_of_work(&h, &PUBKEY, 1, &ctx(0, 940))
            .is_ok());
        let err = validator
            .check_proof_of_work(&h, &PUBKEY, 2, &ctx(1, 940))
            .unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::InvalidTarget {
                reason: "easier than limit",
                ..
            }
        ));
    }

    #[test]
    fn test_staked_chain_uses_mindiff() {
        let mut params = ConsensusParams::asset_chain("TEST");
        params.staked = true;
        let election = FixedElection::non_notary();
        let validator = ProofOfWorkValidator::new(&params, &election);

        let h = grind(header(HARD_BITS, 1_000), &mindiff(), true);
        let verdict = validator
            .check_proof_of_work(&h, &PUBKEY, 100, &ctx(99, 940))
            .unwrap();
        assert_eq!(verdict.target, mindiff());
        assert!(!verdict.easy_mining);
    }

    #[test]
    fn test_height_zero_means_next() {
        let params = ConsensusParams::asset_chain("TEST");
        let election = FixedElection::non_notary();
        let validator = ProofOfWorkValidator::new(&params, &election);

        let h = grind(header(MINDIFF_NBITS, 1_000), &mindiff(), true);
        let verdict = validator
            .check_proof_of_work(&h, &PUBKEY, 0, &ctx(41, 940))
            .unwrap();
        assert_eq!(verdict.height, 42);
    }

    // ============ Notary Tests ============

    #[test]
    fn test_null_pubkey_deferred() {
        let params = ConsensusParams::kmd_mainnet();
        let election = FixedElection::non_notary();
        let validator = ProofOfWorkValidator::new(&params, &election);

        let verdict = validator
            .check_proof_of_work(&header(HARD_BITS, 1_000), &[0u8; 33], 900_000, &ctx(1, 940))
            .unwrap();
        assert_eq!(verdict.acceptance, PowAcceptance::DeferredNullPubkey);
        assert_eq!(election.calls.get(), 0);
    }

    #[test]
    fn test_notary_logic_skipped_below_activation() {
        let params = ConsensusParams::kmd_mainnet();
        let election = FixedElection::with(notary(NotaryStanding::Notary));
        let validator = ProofOfWorkValidator::new(&params, &election);

        let h = grind(header(MINDIFF_NBITS, 1_000), &mindiff(), true);
        let verdict = validator
            .check_proof_of_work(&h, &PUBKEY, 33_999, &ctx(33_998, 940))
            .unwrap();
        assert_eq!(election.calls.get(), 0);
        assert!(!verdict.easy_mining);
        assert_eq!(verdict.notary_id, None);
    }

    #[test]
    fn test_notary_easy_mining() {
        let params = ConsensusParams::kmd_mainnet();
        let election = FixedElection::with(notary(NotaryStanding::Notary));
        let validator = ProofOfWorkValidator::new(&params, &election);

        let h = grind(header(HARD_BITS, 1_000), &mindiff(), true);
        let verdict = validator
            .check_proof_of_work(&h, &PUBKEY, 900_100, &ctx(900_099, 940))
            .unwrap();
        assert!(verdict.easy_mining);
        assert_eq!(verdict.notary_id, Some(4));
        assert_eq!(verdict.target, mindiff());
        assert_eq!(verdict.acceptance, PowAcceptance::HashBelowTarget);
    }

    #[test]
    fn test_recently_mined_notary_after_strict_height() {
        let params = ConsensusParams::kmd_mainnet();
        let mut result = notary(NotaryStanding::RecentlyMined);
        result.eligible = true;
        let election = FixedElection::with(result);
        let validator = ProofOfWorkValidator::new(&params, &election);

        let h = grind(header(HARD_BITS, 1_000), &mindiff(), true);
        let verdict = validator
            .check_proof_of_work(&h, &PUBKEY, 500_000, &ctx(499_999, 940))
            .unwrap();
        assert!(verdict.easy_mining);

        let err = validator
            .check_proof_of_work(&h, &PUBKEY, 800_000, &ctx(799_999, 940))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidProofOfWork { .. }));
    }

    #[test]
    fn test_cooldown_never_easy() {
        let params = ConsensusParams::kmd_mainnet();
        let mut result = notary(NotaryStanding::CooldownPending);
        result.eligible = true;
        let election = FixedElection::with(result);
        let validator = ProofOfWorkValidator::new(&params, &election);

        let h = grind(header(MINDIFF_NBITS, 1_000), &mindiff(), true);
        let verdict = validator
            .check_proof_of_work(&h, &PUBKEY, 500_000, &ctx(499_999, 940))
            .unwrap();
        assert!(!verdict.easy_mining);
        assert_eq!(verdict.standing, NotaryStanding::CooldownPending);
    }

    #[test]
    fn test_gap_override_grants_easy_mining() {
        let params = ConsensusParams::kmd_mainnet();
        let tip_time = 1_700_000_000;
        let mut result = notary(NotaryStanding::RecentlyMined);
        result.mined_times[1] = tip_time;
        result.mined_ids = [None; NOTARY_HISTORY_LEN];
        let election = FixedElection::with(result);
        let validator = ProofOfWorkValidator::new(&params, &election);

        // threshold = tip + 421; slot (121 / 20 = 6) covers notary 4
        let block_time = tip_time + 421 + 121;
        let h = grind(header(HARD_BITS, block_time), &mindiff(), true);
        let height = 3_000_000;
        let verdict = validator
            .check_proof_of_work(&h, &PUBKEY, height, &ctx(height - 1, tip_time))
            .unwrap();
        assert_eq!(verdict.standing, NotaryStanding::GapPriority);
        assert!(verdict.easy_mining);

        // Without the gap the recently-mined notary gets no relief.
        let early = grind(header(HARD_BITS, tip_time + 60), &decode_compact(HARD_BITS).target, false);
        let err = validator
            .check_proof_of_work(&early, &PUBKEY, height, &ctx(height - 1, tip_time))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidProofOfWork { .. }));
    }
}
