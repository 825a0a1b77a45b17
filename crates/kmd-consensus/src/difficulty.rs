//! Difficulty adjustment algorithm.
//!
//! The baseline retarget averages the targets of the last
//! `averaging_window` blocks and scales the average by the dampened ratio
//! of actual to expected timespan, measured between median-time-past
//! values. Chains with adaptive proof of work then pass the result through
//! the adaptive engine (see `adaptive`).

use crate::adaptive::{
    AdaptiveFlag, AdaptiveHistory, AdaptiveOutcome, AdaptiveRetarget, ADAPTIVE_HISTORY_LEN,
};
use crate::chain_params::{AdaptivePowMode, ConsensusParams};
use crate::compact::{decode_compact, encode_compact};
use crate::error::{ConsensusError, ConsensusResult};
use crate::params::MINDIFF_NBITS;
use crate::uint::U256;
use crate::window::AncestorWindow;
use tracing::{debug, trace};

/// Ancestors inspected for the "behind schedule" measure.
const SCHEDULE_LOOKBACK: usize = 6;

/// Difficulty adjustment calculator.
pub struct DifficultyAdjustment<'a> {
    params: &'a ConsensusParams,
}

impl<'a> DifficultyAdjustment<'a> {
    pub fn new(params: &'a ConsensusParams) -> Self {
        Self { params }
    }

    /// Baseline retarget.
    ///
    /// # Arguments
    /// * `average` - Mean target of the averaging window
    /// * `last_mtp` - Median time past of the newest ancestor
    /// * `first_mtp` - Median time past of the ancestor `averaging_window` blocks back
    ///
    /// # Returns
    /// The new target as compact bits, never easier than the chain limit,
    /// or `InvalidTarget` when the parameters give an empty window timespan.
    /// Errors from this entry point report height 0.
    pub fn calculate_next_work_required(
        &self,
        average: &U256,
        last_mtp: i64,
        first_mtp: i64,
    ) -> ConsensusResult<u32> {
        self.retarget(average, last_mtp, first_mtp, 0)
    }

    fn retarget(
        &self,
        average: &U256,
        last_mtp: i64,
        first_mtp: i64,
        height: u32,
    ) -> ConsensusResult<u32> {
        let params = self.params;
        let window_timespan = params.averaging_window_timespan();

        let mut actual = last_mtp.wrapping_sub(first_mtp);
        trace!(actual, "Actual timespan before dampening");
        actual = window_timespan + (actual - window_timespan) / 4;

        if !params.adaptive_pow.is_active() {
            if actual < params.min_actual_timespan() {
                actual = params.min_actual_timespan();
            }
            if actual > params.max_actual_timespan() {
                actual = params.max_actual_timespan();
            }
        }

        let limit = params.retarget_limit();
        let divisor = U256::from(u64::try_from(window_timespan).unwrap_or(0));
        let Some(scaled) = average.checked_div(&divisor) else {
            return Err(ConsensusError::InvalidTarget {
                height,
                bits: encode_compact(average),
                reason: "empty window timespan",
            });
        };
        // Multiplication by the timespan is 32-bit.
        let mut target = scaled * (actual as u32) as u64;
        if target > *limit {
            target = limit.clone();
        }

        let bits = encode_compact(&target);
        debug!(
            window_timespan,
            actual_timespan = actual,
            average = %average,
            new_bits = bits,
            "Baseline retarget"
        );
        Ok(bits)
    }

    /// Compact target required of the block after `window`'s tip.
    ///
    /// # Arguments
    /// * `window` - Snapshot of the tip and its ancestors
    /// * `candidate_time` - Timestamp of the block being built or checked;
    ///   `None` when only the chain's current difficulty is wanted
    ///
    /// # Returns
    /// The required compact target, or `HeightOutOfRange` if the window
    /// does not cover the ancestors the rules need.
    pub fn next_work_required(
        &self,
        window: &AncestorWindow,
        candidate_time: Option<u32>,
    ) -> ConsensusResult<u32> {
        let params = self.params;
        let limit_bits = encode_compact(params.retarget_limit());
        let Some(tip) = window.tip() else {
            return Ok(limit_bits);
        };

        let height = tip.height.wrapping_add(1);
        let block_time = params.block_time;
        let adaptive = params.adaptive_pow.is_active();
        let candidate_time = candidate_time.filter(|_| adaptive);
        if candidate_time.is_some() && block_time <= 0 {
            return Err(ConsensusError::InvalidTarget {
                height,
                bits: limit_bits,
                reason: "non-positive block time",
            });
        }

        let mut mult: i32 = 0;
        let mut tipdiff: i32 = 0;
        let mut history = None;
        if let Some(now) = candidate_time {
            if height as usize >= ADAPTIVE_HISTORY_LEN {
                tipdiff = now.wrapping_sub(tip.time) as i32;
                mult = tipdiff.wrapping_sub(7i32.wrapping_mul(block_time));
                let captured = AdaptiveHistory::capture(window, block_time)?;
                if params.adaptive_pow == AdaptivePowMode::TimeWeightedEma {
                    let target = AdaptiveRetarget::new(&captured, block_time, now, height)
                        .time_weighted_ema(tipdiff);
                    return Ok(encode_compact(&target) & !3);
                }
                history = Some(captured);
            }
        }

        let averaging_window = params.averaging_window as usize;
        let Some(first) = window.ancestor(averaging_window)? else {
            debug!(height, "Not enough ancestors to retarget, using limit");
            return Ok(limit_bits);
        };

        let flag_at = |depth: usize| {
            history
                .as_ref()
                .map_or(AdaptiveFlag::None, |h| h.flag(depth))
        };

        let mut total = U256::zero();
        for (depth, entry) in window.iter().take(averaging_window).enumerate() {
            let mut target = decode_compact(entry.bits).target;
            if let Some(now) = candidate_time {
                if depth < SCHEDULE_LOOKBACK {
                    let behind = (now.wrapping_sub(entry.time) as i32)
                        .wrapping_sub((8 + depth as i32).wrapping_mul(block_time));
                    mult = mult.max(behind);
                }
                // A flagged ancestor while the tip is unflagged counts at 7/8.
                if flag_at(depth) != AdaptiveFlag::None && flag_at(0) == AdaptiveFlag::None {
                    target = (target / 8) * 7;
                }
            }
            total = total + target;
        }

        let Some(average) = total.checked_div(&U256::from(averaging_window as u64)) else {
            return Err(ConsensusError::InvalidTarget {
                height,
                bits: limit_bits,
                reason: "empty averaging window",
            });
        };
        let bits =
            self.retarget(&average, tip.median_time_past, first.median_time_past, height)?;
        if !adaptive {
            return Ok(bits);
        }

        let mut target = decode_compact(bits).target;
        let mut flag = AdaptiveFlag::None;
        if let (Some(history), Some(now)) = (history.as_ref(), candidate_time) {
            if height as usize > ADAPTIVE_HISTORY_LEN && tipdiff > 0 {
                match AdaptiveRetarget::new(history, block_time, now, height).apply(&target, mult) {
                    AdaptiveOutcome::Easy => return Ok(MINDIFF_NBITS & !3),
                    AdaptiveOutcome::Adjusted {
                        target: adjusted,
                        flag: adjusted_flag,
                    } => {
                        target = adjusted;
                        flag = adjusted_flag;
                    }
                }
            }
        }

        let bits = (encode_compact(&target) & !3) | flag.bits();
        debug!(
            height,
            tipdiff,
            mult,
            ?flag,
            new_bits = bits,
            "Adaptive retarget"
        );
        Ok(bits)
    }
}

/// Compact target required of the block after `window`'s tip.
pub fn get_next_work_required(
    window: &AncestorWindow,
    candidate_time: Option<u32>,
    params: &ConsensusParams,
) -> ConsensusResult<u32> {
    DifficultyAdjustment::new(params).next_work_required(window, candidate_time)
}

/// Baseline retarget from an average target and two median times.
pub fn calculate_next_work_required(
    average: &U256,
    last_mtp: i64,
    first_mtp: i64,
    params: &ConsensusParams,
) -> ConsensusResult<u32> {
    DifficultyAdjustment::new(params).calculate_next_work_required(average, last_mtp, first_mtp)
}
