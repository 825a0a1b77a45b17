//! Ancestor snapshots for retargeting.
//!
//! The retarget rules look back over at most 64 ancestors. Rather than
//! walking a shared block index while it may be mutated, callers take an
//! owned snapshot once (`AncestorWindow::capture`) and hand it to the
//! pure retarget functions.

use crate::error::{ConsensusError, ConsensusResult};
use crate::uint::U256;

/// Maximum number of ancestors a window holds.
pub const ANCESTOR_WINDOW_CAPACITY: usize = 64;

/// Number of blocks in a median-time-past sample.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// What the chain index knows about a connected block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedHeader {
    pub height: u32,
    pub time: u32,
    pub bits: u32,
    /// Median of the last `MEDIAN_TIME_SPAN` block times ending at this block.
    pub median_time_past: i64,
    /// Cumulative work up to and including this block.
    pub chain_work: U256,
}

/// Read access to the active chain.
pub trait ChainIndex {
    /// The block at `height` on the active chain, if connected.
    fn header_at(&self, height: u32) -> Option<IndexedHeader>;
}

/// Up to 64 consecutive ancestors, newest first.
///
/// Invariant: heights are strictly contiguous and descending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncestorWindow {
    entries: Vec<IndexedHeader>,
}

impl AncestorWindow {
    /// A window with no tip (the next block is genesis).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from entries ordered newest first.
    pub fn from_entries(entries: Vec<IndexedHeader>) -> ConsensusResult<Self> {
        if entries.len() > ANCESTOR_WINDOW_CAPACITY {
            return Err(ConsensusError::InvalidAncestry(format!(
                "{} entries exceed capacity {}",
                entries.len(),
                ANCESTOR_WINDOW_CAPACITY
            )));
        }
        for pair in entries.windows(2) {
            if pair[0].height == 0 || pair[1].height != pair[0].height - 1 {
                return Err(ConsensusError::InvalidAncestry(format!(
                    "height {} does not follow {}",
                    pair[1].height, pair[0].height
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Snapshot the tip at `tip_height` and its ancestors from `index`.
    pub fn capture<C: ChainIndex + ?Sized>(index: &C, tip_height: u32) -> ConsensusResult<Self> {
        let count = (tip_height as usize + 1).min(ANCESTOR_WINDOW_CAPACITY);
        let mut entries = Vec::with_capacity(count);
        for depth in 0..count as u32 {
            let height = tip_height - depth;
            let header = index
                .header_at(height)
                .ok_or(ConsensusError::HeightOutOfRange {
                    required: height,
                    available: height + 1,
                })?;
            entries.push(header);
        }
        Self::from_entries(entries)
    }

    pub fn tip(&self) -> Option<&IndexedHeader> {
        self.entries.first()
    }

    /// Ancestor `depth` blocks behind the tip (0 is the tip).
    pub fn get(&self, depth: usize) -> Option<&IndexedHeader> {
        self.entries.get(depth)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedHeader> {
        self.entries.iter()
    }

    /// True when the chain continues below the oldest captured entry.
    pub fn extends_beyond(&self) -> bool {
        self.entries.last().is_some_and(|oldest| oldest.height > 0)
    }

    /// Ancestor `depth` blocks behind the tip.
    ///
    /// `Ok(None)` when the chain is too short for that ancestor to exist;
    /// `HeightOutOfRange` when it exists but was not captured.
    pub fn ancestor(&self, depth: usize) -> ConsensusResult<Option<&IndexedHeader>> {
        let Some(tip) = self.tip() else {
            return Ok(None);
        };
        if depth > tip.height as usize {
            return Ok(None);
        }
        match self.entries.get(depth) {
            Some(entry) => Ok(Some(entry)),
            None => Err(ConsensusError::HeightOutOfRange {
                required: tip.height - depth as u32,
                available: self.entries.last().map_or(tip.height, |e| e.height),
            }),
        }
    }
}

/// Median of a set of block times, the upper median for even counts.
pub fn median_time_past(times: &[u32]) -> i64 {
    if times.is_empty() {
        return 0;
    }
    let mut sorted = times.to_vec();
    sorted.sort_unstable();
    sorted[sorted.len() / 2] as i64
}
