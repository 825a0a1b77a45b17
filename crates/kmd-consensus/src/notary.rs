//! Notary election bridge and second-block priority rotation.
//!
//! Elected notaries may mine at the minimum difficulty under rules that
//! changed at fixed heights over the chain's history. The election state
//! itself (who is elected, who mined recently) lives outside consensus and
//! is reached through the `NotaryElection` trait; this module turns its
//! answer into an easy-mining decision.

use crate::params::{ELECTION_GAP, ELECTION_GAP_GRACE, LEGACY_EASY_HEIGHT, STRICT_POW_HEIGHT};
use tracing::{debug, trace};

/// Number of notaries in an election.
pub const NOTARY_SET_SIZE: usize = 64;

/// Recent-history slots reported by the election provider (index 0 is the
/// candidate, 1 the tip).
pub const NOTARY_HISTORY_LEN: usize = 66;

/// Gap-priority rules stop distinguishing eras past this height.
const UNBOUNDED_GAP_HEIGHT: u32 = 1_000_000;

/// Standing of the candidate's miner, as judged by the election provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum NotaryStanding {
    /// Notary, but the cooldown since its last block has not elapsed.
    CooldownPending = -2,
    /// Notary that mined one of the recent blocks.
    RecentlyMined = -1,
    /// Not a notary.
    #[default]
    NonNotary = 0,
    /// Notary in good standing.
    Notary = 1,
    /// Notary allowed a second block after a gap.
    GapPriority = 2,
}

impl NotaryStanding {
    pub fn value(self) -> i32 {
        self as i32
    }

    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            -2 => Some(Self::CooldownPending),
            -1 => Some(Self::RecentlyMined),
            0 => Some(Self::NonNotary),
            1 => Some(Self::Notary),
            2 => Some(Self::GapPriority),
            _ => None,
        }
    }
}

/// Question put to the election provider for one candidate block.
#[derive(Debug, Clone, Copy)]
pub struct NotaryQuery<'a> {
    pub height: u32,
    /// Timestamp of the current chain tip.
    pub tip_time: u32,
    /// Timestamp of the candidate block.
    pub block_time: u32,
    /// Compressed public key of the candidate's miner.
    pub pubkey: &'a [u8; 33],
}

/// Answer from the election provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotaryElectionResult {
    /// Index of the miner in the elected set, if it is a notary.
    pub notary_id: Option<u32>,
    /// Chosen-notary indicator (non-zero when the miner is this height's
    /// chosen notary).
    pub special: i32,
    /// Eligibility flag.
    pub eligible: bool,
    pub standing: NotaryStanding,
    /// Notary id that mined each recent block, if any.
    pub mined_ids: [Option<u32>; NOTARY_HISTORY_LEN],
    /// Timestamp of each recent block.
    pub mined_times: [u32; NOTARY_HISTORY_LEN],
}

impl Default for NotaryElectionResult {
    fn default() -> Self {
        Self {
            notary_id: None,
            special: 0,
            eligible: false,
            standing: NotaryStanding::NonNotary,
            mined_ids: [None; NOTARY_HISTORY_LEN],
            mined_times: [0; NOTARY_HISTORY_LEN],
        }
    }
}

/// Source of notary election state.
pub trait NotaryElection {
    fn elect(&self, query: &NotaryQuery<'_>) -> NotaryElectionResult;
}

// ============================================================================
// Eras
// ============================================================================

/// Easy-mining rule in force at a given height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotaryEra {
    /// No easy-mining rule.
    PreElection,
    /// Chosen notaries or notaries in good standing.
    ElectionSpecial,
    /// Notaries in good standing.
    Special2Only,
    /// Notaries in good standing, except during the opening of each election.
    ElectionGap,
}

/// Activation heights, ascending.
const NOTARY_ERAS: [(u32, NotaryEra); 4] = [
    (0, NotaryEra::PreElection),
    (10_001, NotaryEra::ElectionSpecial),
    (80_000, NotaryEra::Special2Only),
    (108_000, NotaryEra::ElectionGap),
];

/// Era in force at `height`.
pub fn era_for_height(height: u32) -> NotaryEra {
    NOTARY_ERAS
        .iter()
        .rev()
        .find(|(activation, _)| height >= *activation)
        .map_or(NotaryEra::PreElection, |(_, era)| *era)
}

/// Whether the era rule grants easy mining. `None` when the era rule does
/// not apply and the height exceptions decide.
fn era_flag(height: u32, special: i32, standing: NotaryStanding) -> Option<bool> {
    let special2 = standing.value();
    match era_for_height(height) {
        NotaryEra::ElectionSpecial if special != 0 || special2 > 0 => Some(true),
        NotaryEra::Special2Only if special2 > 0 => Some(true),
        NotaryEra::ElectionGap if special2 > 0 => Some(
            height > UNBOUNDED_GAP_HEIGHT
                || height % ELECTION_GAP > ELECTION_GAP_GRACE
                || height % ELECTION_GAP == 0,
        ),
        _ => None,
    }
}

/// Easy-mining flag for a notary miner, before any gap override.
pub fn easy_mining_flag(
    height: u32,
    special: i32,
    standing: NotaryStanding,
    eligible: bool,
) -> bool {
    if let Some(flag) = era_flag(height, special, standing) {
        return flag;
    }
    if height == LEGACY_EASY_HEIGHT {
        return true;
    }
    if standing.value() < 0 {
        if height > STRICT_POW_HEIGHT {
            return false;
        }
        debug!(height, special, ?standing, eligible, "Notary with negative standing");
    }
    eligible
}

// ============================================================================
// Priority rotation
// ============================================================================

/// Order in which notaries may mine a second block after a gap: notaries
/// that mined recently are moved to the back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityList(Vec<u32>);

impl PriorityList {
    /// Build from recent history. Slot 0 (the candidate) is ignored; older
    /// blocks are processed first so the most recent miner ends up last.
    pub fn from_history(mined_ids: &[Option<u32>]) -> Self {
        let mut list: Vec<u32> = (0..NOTARY_SET_SIZE as u32).collect();
        for id in mined_ids.iter().skip(1).rev().flatten() {
            if let Some(pos) = list.iter().position(|n| n == id) {
                if pos + 1 < list.len() {
                    list[pos..].rotate_left(1);
                }
            }
        }
        Self(list)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn is_second_block_allowed(
        &self,
        notary_id: u32,
        block_time: u32,
        threshold: u32,
        slot_delta: u32,
    ) -> bool {
        is_second_block_allowed(notary_id, block_time, threshold, slot_delta, &self.0)
    }
}

/// Whether `notary_id` may mine a second block at `block_time`.
///
/// After `threshold`, one more priority slot opens every `slot_delta`
/// seconds; once all 64 are open every notary is allowed.
pub fn is_second_block_allowed(
    notary_id: u32,
    block_time: u32,
    threshold: u32,
    slot_delta: u32,
    priority_list: &[u32],
) -> bool {
    if block_time < threshold || slot_delta == 0 || priority_list.len() != NOTARY_SET_SIZE {
        return false;
    }
    let slot = ((block_time - threshold) / slot_delta) as usize;
    if slot >= priority_list.len() {
        return true;
    }
    priority_list[..=slot].contains(&notary_id)
}

/// Upgrade the standing of a notary mining after a gap.
///
/// Applies when the candidate is at least `max_gap` seconds after the tip
/// and the provider's history agrees with the tip time.
pub fn apply_gap_override(
    election: &NotaryElectionResult,
    notary_id: u32,
    block_time: u32,
    tip_time: u32,
    max_gap: u32,
    slot_delta: u32,
) -> NotaryStanding {
    let standing = election.standing;
    let threshold = tip_time.wrapping_add(max_gap);
    if block_time < threshold || tip_time != election.mined_times[1] {
        return standing;
    }

    let priority = PriorityList::from_history(&election.mined_ids);
    trace!(list = ?priority.as_slice(), "Second-block priority list");

    let upgraded = matches!(
        standing,
        NotaryStanding::RecentlyMined | NotaryStanding::Notary
    ) && priority.is_second_block_allowed(notary_id, block_time, threshold, slot_delta);

    let allowed: Vec<u32> = (0..NOTARY_SET_SIZE as u32)
        .filter(|&id| priority.is_second_block_allowed(id, block_time, threshold, slot_delta))
        .collect();
    trace!(?allowed, "Notaries allowed a second block");

    if upgraded {
        debug!(notary_id, block_time, tip_time, "Second block allowed after gap");
        NotaryStanding::GapPriority
    } else {
        standing
    }
}
