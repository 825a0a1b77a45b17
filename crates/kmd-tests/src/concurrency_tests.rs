//! Retargeting and validation from many threads over shared chain state.

use crate::generators::*;
use crate::harness::{InMemoryChain, ScriptedElection};
use kmd_consensus::params::MINDIFF_NBITS;
use kmd_consensus::{
    decode_compact, get_next_work_required, AdaptivePowMode, AncestorWindow, ConsensusParams,
    ProofOfWorkValidator,
};
use std::sync::{Arc, RwLock};
use std::thread;

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_snapshot_types_are_send_sync() {
    assert_send_sync::<AncestorWindow>();
    assert_send_sync::<ConsensusParams>();
    assert_send_sync::<InMemoryChain>();
}

#[test]
fn test_parallel_retargets_agree() {
    let params = Arc::new(ConsensusParams {
        adaptive_pow: AdaptivePowMode::Trigger,
        ..ConsensusParams::asset_chain("ADAPT")
    });
    let mut solvetimes = vec![60u32; 120];
    solvetimes[110] = 2;
    solvetimes[115] = 500;
    let chain = Arc::new(chain_with_solvetimes(&solvetimes, STEADY_BITS));
    let tip_time = chain.tip().unwrap().time;

    let expected = get_next_work_required(&chain.window().unwrap(), Some(tip_time + 90), &params)
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let chain = Arc::clone(&chain);
            let params = Arc::clone(&params);
            thread::spawn(move || {
                let window = chain.window().unwrap();
                get_next_work_required(&window, Some(tip_time + 90), &params).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn test_snapshot_unaffected_by_later_blocks() {
    let params = ConsensusParams::kmd_mainnet();
    let chain = Arc::new(RwLock::new(steady_chain(100, 60, STEADY_BITS)));

    let snapshot = chain.read().unwrap().window().unwrap();
    let before = get_next_work_required(&snapshot, None, &params).unwrap();

    let writer = {
        let chain = Arc::clone(&chain);
        thread::spawn(move || {
            let mut chain = chain.write().unwrap();
            let mut time = chain.tip().unwrap().time;
            for _ in 0..50 {
                time += 10;
                chain.push(time, STEADY_BITS);
            }
        })
    };
    writer.join().unwrap();

    assert_eq!(get_next_work_required(&snapshot, None, &params).unwrap(), before);
    let after = get_next_work_required(&chain.read().unwrap().window().unwrap(), None, &params)
        .unwrap();
    assert!(decode_compact(after).target < decode_compact(before).target);
}

#[test]
fn test_parallel_validation() {
    let params = ConsensusParams::asset_chain("TEST");
    let chain = steady_chain(40, 60, MINDIFF_NBITS);
    let election = ScriptedElection::new();
    let target = decode_compact(MINDIFF_NBITS).target;
    let headers: Vec<_> = (0..4u32)
        .map(|i| grind_header(test_header(2_000_000_000 + i, MINDIFF_NBITS), &target, i % 2 == 0))
        .collect();

    thread::scope(|scope| {
        for (i, header) in headers.iter().enumerate() {
            let (params, chain, election) = (&params, &chain, &election);
            scope.spawn(move || {
                let validator = ProofOfWorkValidator::new(params, election);
                let result =
                    validator.check_proof_of_work(header, &notary_pubkey(1), 0, &chain.context());
                assert_eq!(result.is_ok(), i % 2 == 0);
            });
        }
    });
}
