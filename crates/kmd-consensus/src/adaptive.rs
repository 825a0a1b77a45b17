//! Adaptive retarget engine.
//!
//! Chains with adaptive proof of work adjust the baseline target inside the
//! block being mined, using the candidate's own timestamp:
//!
//! - **Outer triggers** tighten the target when recent blocks arrived much
//!   faster than the block time.
//! - **Inner corrections** keep tightening while an earlier trigger is still
//!   "active" (emission has not slowed back down).
//! - **Exponential relief** loosens the target when the candidate is far
//!   behind schedule, falling back to the minimum difficulty.
//! - **TSA-EMA** (mode 2) replaces all of the above with a time-weighted
//!   exponential moving average.
//!
//! The low two bits of the resulting compact value record which correction
//! fired, so later blocks can see it (`AdaptiveFlag`).
//!
//! Every intermediate product is 64-bit or 256-bit wrapping arithmetic and
//! every time difference is an unsigned 32-bit wrapping subtraction. These
//! must not be "fixed": the resulting targets are consensus.

use crate::compact::decode_compact;
use crate::error::{ConsensusError, ConsensusResult};
use crate::params::MINDIFF_NBITS;
use crate::uint::U256;
use crate::window::{AncestorWindow, ANCESTOR_WINDOW_CAPACITY};
use tracing::{debug, trace};

/// Number of ancestors the adaptive engine inspects.
pub const ADAPTIVE_HISTORY_LEN: usize = ANCESTOR_WINDOW_CAPACITY;

/// Fixed-point scale for the trigger ratios.
const K: i64 = 1_000_000;

/// Fixed-point scale of `exponential_multiplier` (3600 * 100).
const EXP_SCALE: u64 = 360_000;

/// Inner corrections only look this far back for an active outer trigger.
const INNER_LOOKBACK: usize = 50;

/// Correction recorded in the low two bits of an adaptive compact target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdaptiveFlag {
    #[default]
    None = 0,
    /// An inner correction changed the target.
    Inner = 1,
    /// An outer trigger fired.
    Outer = 2,
    /// Reserved; never produced.
    Reserved = 3,
}

impl AdaptiveFlag {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::None,
            1 => Self::Inner,
            2 => Self::Outer,
            _ => Self::Reserved,
        }
    }

    pub fn bits(self) -> u32 {
        self as u32
    }
}

/// Outer trigger: fires when the last `width` solve times sum to less than
/// `block_time * numerator / denominator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OuterTrigger {
    pub numerator: i32,
    pub denominator: i32,
    pub width: usize,
}

impl OuterTrigger {
    const fn new(numerator: i32, denominator: i32, width: usize) -> Self {
        Self {
            numerator,
            denominator,
            width,
        }
    }
}

/// Triggers after the first, evaluated least aggressive last.
const OUTER_TRIGGERS: [OuterTrigger; 4] = [
    OuterTrigger::new(15, 100, 2),
    OuterTrigger::new(1, 2, 3),
    OuterTrigger::new(7, 3, 6),
    OuterTrigger::new(12, 7, 12),
];

/// `(width, offset bound)` for inner corrections: a correction of a given
/// width is only attempted when the last outer trigger lies within the bound.
const INNER_CORRECTIONS: [(usize, usize); 5] = [(1, 10), (2, 20), (3, 30), (6, 40), (12, 50)];

/// The single-block trigger depends on the block time; chains faster than
/// 60 seconds skip it.
pub fn first_outer_trigger(block_time: i32) -> Option<OuterTrigger> {
    match block_time {
        60..=99 => Some(OuterTrigger::new(1, 60, 1)),
        t if t >= 100 => Some(OuterTrigger::new(1, 100, 1)),
        _ => None,
    }
}

fn div_or_zero(numerator: i64, denominator: i64) -> i64 {
    numerator.checked_div(denominator).unwrap_or(0)
}

/// `3^(num / T) * (360000 + quadratic interpolation of the remainder)`.
pub fn exponential_multiplier(num: i32, block_time: i32) -> i64 {
    let t = block_time;
    let whole = num.checked_div(t).unwrap_or(0);
    let a = if whole > 0 {
        3i64.wrapping_pow(whole as u32)
    } else {
        1
    };

    let mut b = EXP_SCALE as i64;
    let modval = num.checked_rem(t).unwrap_or(0);
    if modval != 0 {
        b += 3600i32
            .wrapping_mul(110)
            .wrapping_mul(modval)
            .checked_div(t)
            .unwrap_or(0) as i64;
        b += 3600i32
            .wrapping_mul(60)
            .wrapping_mul(modval)
            .wrapping_mul(modval)
            .checked_div(t.wrapping_mul(t))
            .unwrap_or(0) as i64;
    }
    a.wrapping_mul(b)
}

/// Scale `target` by the exponential multiplier for `mult` seconds.
pub fn exponential(target: &U256, mult: i32, block_time: i32) -> U256 {
    (target / EXP_SCALE) * exponential_multiplier(mult, block_time) as u64
}

/// Scale a flagged ancestor's target by its squared solve time relative to
/// the block time, so a fast trigger block does not drag the average down.
pub fn solvetime_scaled_target(target: &U256, solvetime: u32, block_time: i32) -> U256 {
    let squared = 1000i64
        .wrapping_mul(solvetime as i64)
        .wrapping_mul(solvetime as i64)
        .wrapping_mul(1000);
    let scale = block_time.wrapping_mul(block_time).wrapping_mul(784) as i64;
    let num = div_or_zero(squared, scale);
    if num > 1 {
        (target / 1000) * num as u64
    } else {
        target.clone()
    }
}

/// Targets, times and flags of the last 64 ancestors, index 0 = tip.
#[derive(Debug, Clone)]
pub struct AdaptiveHistory {
    targets: Vec<U256>,
    times: Vec<u32>,
    flags: Vec<AdaptiveFlag>,
}

impl AdaptiveHistory {
    /// Capture from a full 64-entry window.
    ///
    /// When the chain extends past the window, targets of ancestors carrying
    /// an inner or outer flag are rescaled by their solve time.
    pub fn capture(window: &AncestorWindow, block_time: i32) -> ConsensusResult<Self> {
        if window.len() < ADAPTIVE_HISTORY_LEN {
            let (required, available) = match (window.tip(), window.iter().last()) {
                (Some(tip), Some(oldest)) => (
                    tip.height.saturating_sub(ADAPTIVE_HISTORY_LEN as u32 - 1),
                    oldest.height,
                ),
                _ => (0, 0),
            };
            return Err(ConsensusError::HeightOutOfRange {
                required,
                available,
            });
        }

        let mut targets = Vec::with_capacity(ADAPTIVE_HISTORY_LEN);
        let mut times = Vec::with_capacity(ADAPTIVE_HISTORY_LEN);
        let mut flags = Vec::with_capacity(ADAPTIVE_HISTORY_LEN);
        for entry in window.iter().take(ADAPTIVE_HISTORY_LEN) {
            targets.push(decode_compact(entry.bits).target);
            times.push(entry.time);
            flags.push(AdaptiveFlag::from_bits(entry.bits));
        }

        if window.extends_beyond() {
            for i in 0..ADAPTIVE_HISTORY_LEN - 1 {
                if matches!(flags[i], AdaptiveFlag::Inner | AdaptiveFlag::Outer) {
                    let solvetime = times[i].wrapping_sub(times[i + 1]);
                    targets[i] = solvetime_scaled_target(&targets[i], solvetime, block_time);
                }
            }
        }

        Ok(Self {
            targets,
            times,
            flags,
        })
    }

    pub fn flag(&self, depth: usize) -> AdaptiveFlag {
        self.flags.get(depth).copied().unwrap_or_default()
    }

    pub fn target(&self, depth: usize) -> &U256 {
        &self.targets[depth]
    }

    pub fn time(&self, depth: usize) -> u32 {
        self.times[depth]
    }
}

/// Outcome of the adaptive adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdaptiveOutcome {
    /// Use `target`, tagging the compact value with `flag`.
    Adjusted { target: U256, flag: AdaptiveFlag },
    /// Exponential relief overshot; use the minimum difficulty.
    Easy,
}

/// Adaptive adjustment of one candidate block.
pub struct AdaptiveRetarget<'a> {
    history: &'a AdaptiveHistory,
    block_time: i32,
    candidate_time: u32,
    height: u32,
}

impl<'a> AdaptiveRetarget<'a> {
    pub fn new(
        history: &'a AdaptiveHistory,
        block_time: i32,
        candidate_time: u32,
        height: u32,
    ) -> Self {
        Self {
            history,
            block_time,
            candidate_time,
            height,
        }
    }

    /// Seconds since the tip, as an unsigned wrapping difference.
    fn since_tip(&self) -> u32 {
        self.candidate_time.wrapping_sub(self.history.time(0))
    }

    /// Time-weighted EMA target (mode 2).
    pub fn time_weighted_ema(&self, tipdiff: i32) -> U256 {
        let t = self.block_time;
        let tipdiff = tipdiff.max(4) & !1;
        let kt = K.wrapping_mul(t as i64) as u64;
        let val = exponential_multiplier(tipdiff / 2, t);

        let base = self.history.target(0) / kt;
        let a = &base * t as u64;
        let scaled = &base / EXP_SCALE;
        let b = &scaled * (tipdiff as i64).wrapping_mul(val) as u64;
        let c = &scaled * (t as i64).wrapping_mul(val) as u64;
        let target = ((a + b - c) / tipdiff as u64) * kt;

        debug!(height = self.height, tipdiff, target = %target, "TSA-EMA target");
        target
    }

    /// Adjust the baseline target.
    ///
    /// `mult` is the largest "behind schedule" measure collected while
    /// averaging; values above 1 enable exponential relief.
    pub fn apply(&self, baseline: &U256, mult: i32) -> AdaptiveOutcome {
        let (mut target, flag) = match self.history.flag(0) {
            AdaptiveFlag::None | AdaptiveFlag::Reserved => self.outer_cascade(baseline),
            AdaptiveFlag::Inner | AdaptiveFlag::Outer => self.inner_cascade(baseline),
        };

        if mult > 1 {
            let easy = decode_compact(MINDIFF_NBITS & !3).target;
            let before = target;
            target = exponential(&before, mult, self.block_time);
            if target < before || target > easy {
                debug!(height = self.height, mult, "Exponential relief exceeded, easy target");
                return AdaptiveOutcome::Easy;
            }
            debug!(height = self.height, mult, target = %target, "Exponential relief");
        }

        AdaptiveOutcome::Adjusted { target, flag }
    }

    /// Evaluate outer triggers against the baseline; the first one that
    /// tightens wins.
    fn outer_cascade(&self, baseline: &U256) -> (U256, AdaptiveFlag) {
        let mut target = match first_outer_trigger(self.block_time) {
            Some(trigger) => self.outer(baseline, trigger),
            None => baseline.clone(),
        };
        if target < *baseline {
            return (target, AdaptiveFlag::Outer);
        }
        for trigger in OUTER_TRIGGERS {
            target = self.outer(baseline, trigger);
            if target < *baseline {
                return (target, AdaptiveFlag::Outer);
            }
        }
        (target, AdaptiveFlag::None)
    }

    /// Apply inner corrections while the most recent outer trigger is still
    /// within reach.
    fn inner_cascade(&self, baseline: &U256) -> (U256, AdaptiveFlag) {
        let offset = (0..INNER_LOOKBACK)
            .find(|&i| self.history.flag(i) == AdaptiveFlag::Outer)
            .unwrap_or(INNER_LOOKBACK);

        let mut target = baseline.clone();
        for (idx, &(width, bound)) in INNER_CORRECTIONS.iter().enumerate() {
            if offset >= bound {
                continue;
            }
            let corrected = self.inner(&target, width, offset);
            if idx == 0 {
                target = corrected.min(baseline.clone());
            } else if corrected < target {
                target = corrected;
            }
        }

        let flag = if target != *baseline {
            AdaptiveFlag::Inner
        } else {
            AdaptiveFlag::None
        };
        (target, flag)
    }

    fn outer(&self, target: &U256, trigger: OuterTrigger) -> U256 {
        let t = self.block_time;
        let mintarget = target / 2;
        let cmpval = t
            .wrapping_mul(trigger.numerator)
            .checked_div(trigger.denominator)
            .unwrap_or(0)
            .max(2);

        let span = self
            .history
            .time(0)
            .wrapping_sub(self.history.time(trigger.width));
        if span >= cmpval as u32 {
            return target.clone();
        }

        let elapsed = self.since_tip();
        let outer_k = div_or_zero(
            K.wrapping_mul(elapsed as i64)
                .wrapping_mul(span as i64)
                .wrapping_mul(trigger.denominator as i64),
            trigger.numerator.wrapping_mul(t.wrapping_mul(t)) as i64,
        );

        let mut result = target.clone();
        if outer_k < K {
            result = (self.history.target(0) / K as u64) * outer_k as u64;
        }
        if result > mintarget {
            result = mintarget;
        }

        trace!(
            height = self.height,
            width = trigger.width,
            outer_k,
            elapsed,
            span,
            target = %result,
            "Outer trigger"
        );
        result
    }

    fn inner(&self, target: &U256, width: usize, offset: usize) -> U256 {
        let t = self.block_time;
        let span_width = offset + width;
        let expected = (span_width as i32 + 1).wrapping_mul(t);
        let elapsed = self
            .history
            .time(0)
            .wrapping_sub(self.history.time(span_width)) as i32;
        if elapsed >= expected {
            return target.clone();
        }

        let mintarget = (target / 101) * 100;
        let mut result = self.windowed_target(width);
        if result == *target {
            result = mintarget;
        }

        trace!(
            height = self.height,
            offset,
            width,
            elapsed,
            expected,
            target = %result,
            "Inner correction"
        );
        result
    }

    /// Average of the last `width` targets scaled by the time since the tip
    /// relative to the span they covered.
    fn windowed_target(&self, width: usize) -> U256 {
        let t = self.block_time;
        let mut sum = U256::zero();
        for depth in 0..width {
            sum = sum + self.history.target(depth);
        }
        let sum = sum / (width as i64).wrapping_mul(K) as u64;

        let span = self
            .history
            .time(0)
            .wrapping_sub(self.history.time(width));
        let inner_k = div_or_zero(
            K.wrapping_mul(self.since_tip() as i64)
                .wrapping_mul(span as i64),
            (width as i32).wrapping_mul(t).wrapping_mul(t) as i64,
        );
        sum * inner_k as u64
    }
}
