//! Test harness for integration tests.
//!
//! Provides an in-memory chain index and a scripted notary election so
//! that retargeting and validation can be driven end to end.

use kmd_consensus::notary::NOTARY_HISTORY_LEN;
use kmd_consensus::{
    median_time_past, AncestorWindow, ChainIndex, ChainTip, ChainWork, ConsensusResult,
    IndexedHeader, NotaryElection, NotaryElectionResult, NotaryQuery, NotaryStanding,
    ValidationContext, MEDIAN_TIME_SPAN,
};
use std::collections::HashMap;
use std::sync::Once;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`. Safe to call from every
/// test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(true)
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Active chain held in memory, genesis first.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChain {
    headers: Vec<IndexedHeader>,
    work: ChainWork,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a block, deriving its median time past and chain work.
    pub fn push(&mut self, time: u32, bits: u32) -> &IndexedHeader {
        let height = self.headers.len() as u32;
        let mut times: Vec<u32> = self
            .headers
            .iter()
            .rev()
            .take(MEDIAN_TIME_SPAN - 1)
            .map(|h| h.time)
            .collect();
        times.push(time);

        self.work.add_block(bits);
        self.headers.push(IndexedHeader {
            height,
            time,
            bits,
            median_time_past: median_time_past(&times),
            chain_work: self.work.total().clone(),
        });
        &self.headers[height as usize]
    }

    pub fn height(&self) -> Option<u32> {
        self.headers.last().map(|h| h.height)
    }

    pub fn tip(&self) -> Option<&IndexedHeader> {
        self.headers.last()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Snapshot of the tip and up to 63 ancestors.
    pub fn window(&self) -> ConsensusResult<AncestorWindow> {
        match self.height() {
            Some(height) => AncestorWindow::capture(self, height),
            None => Ok(AncestorWindow::empty()),
        }
    }

    /// Validation context for a block on top of the tip.
    pub fn context(&self) -> ValidationContext {
        let tip = self
            .tip()
            .map(|h| ChainTip {
                height: h.height,
                time: h.time,
            })
            .unwrap_or_default();
        ValidationContext::new(tip)
    }
}

impl ChainIndex for InMemoryChain {
    fn header_at(&self, height: u32) -> Option<IndexedHeader> {
        self.headers.get(height as usize).cloned()
    }
}

/// Notary election answering from a fixed script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedElection {
    notaries: HashMap<[u8; 33], u32>,
    standing: NotaryStanding,
    special: i32,
    eligible: bool,
    mined_ids: Vec<Option<u32>>,
    mined_times: Vec<u32>,
}

impl ScriptedElection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pubkey` as notary `id`.
    pub fn with_notary(mut self, pubkey: [u8; 33], id: u32) -> Self {
        self.notaries.insert(pubkey, id);
        self
    }

    pub fn with_standing(mut self, standing: NotaryStanding) -> Self {
        self.standing = standing;
        self
    }

    pub fn with_special(mut self, special: i32) -> Self {
        self.special = special;
        self
    }

    pub fn with_eligible(mut self, eligible: bool) -> Self {
        self.eligible = eligible;
        self
    }

    /// Recent miners, most recent first (slot 1 is the tip).
    pub fn with_history(mut self, mined_ids: Vec<Option<u32>>, mined_times: Vec<u32>) -> Self {
        self.mined_ids = mined_ids;
        self.mined_times = mined_times;
        self
    }
}

impl NotaryElection for ScriptedElection {
    fn elect(&self, query: &NotaryQuery<'_>) -> NotaryElectionResult {
        let Some(&id) = self.notaries.get(query.pubkey) else {
            return NotaryElectionResult::default();
        };

        let mut result = NotaryElectionResult {
            notary_id: Some(id),
            special: self.special,
            eligible: self.eligible,
            standing: self.standing,
            ..Default::default()
        };
        for (slot, mined) in self.mined_ids.iter().take(NOTARY_HISTORY_LEN).enumerate() {
            result.mined_ids[slot] = *mined;
        }
        for (slot, time) in self.mined_times.iter().take(NOTARY_HISTORY_LEN).enumerate() {
            result.mined_times[slot] = *time;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_derives_median_time_and_work() {
        let mut chain = InMemoryChain::new();
        for h in 0..20u32 {
            chain.push(1_000 + h * 60, 0x200f_0f0f);
        }
        let tip = chain.tip().unwrap();
        assert_eq!(tip.height, 19);
        // Median of the last 11 times is 5 blocks back.
        assert_eq!(tip.median_time_past, (1_000 + 14 * 60) as i64);
        assert_eq!(tip.chain_work, kmd_consensus::U256::from(20u64 * 17));
    }

    #[test]
    fn test_window_of_empty_chain() {
        let chain = InMemoryChain::new();
        assert!(chain.window().unwrap().is_empty());
        assert_eq!(chain.context().tip, ChainTip::default());
    }

    #[test]
    fn test_scripted_election_unknown_pubkey() {
        let election = ScriptedElection::new().with_notary([1; 33], 3);
        let query = NotaryQuery {
            height: 100_000,
            tip_time: 0,
            block_time: 0,
            pubkey: &[2; 33],
        };
        assert_eq!(election.elect(&query).notary_id, None);
        let query = NotaryQuery {
            pubkey: &[1; 33],
            ..query
        };
        assert_eq!(election.elect(&query).notary_id, Some(3));
    }
}
