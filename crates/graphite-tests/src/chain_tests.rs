//! Chainstate scenarios: fork re-selection, persistence, replay failures.

use crate::harness::*;
use graphite_chain::{ChainState, SubmitOutcome, ValidationPolicy};
use graphite_storage::BlockStore;
use tempfile::TempDir;

#[test]
fn test_two_children_then_reopen() {
    let key = keypair();
    let dir = TempDir::new().unwrap();
    let genesis = test_genesis(&key);

    let tip = {
        let store = BlockStore::open(dir.path()).unwrap();
        let mut state =
            ChainState::open(genesis.clone(), ValidationPolicy::relaxed(), Some(store)).unwrap();
        let g = state.genesis_hash();
        extend_chain(&mut state, g, 0, T0, 2, &key);
        assert_eq!(state.tip().height, 2);
        state.tip()
    };

    let store = BlockStore::open(dir.path()).unwrap();
    let reopened = ChainState::open(genesis, ValidationPolicy::relaxed(), Some(store)).unwrap();
    assert_eq!(reopened.tip().height, 2);
    assert_eq!(reopened.tip().hash, tip.hash);
}

#[test]
fn test_fork_reselection_across_restart() {
    let key = keypair();
    let dir = TempDir::new().unwrap();
    let genesis = test_genesis(&key);

    let b_tip = {
        let store = BlockStore::open(dir.path()).unwrap();
        let mut state =
            ChainState::open(genesis.clone(), ValidationPolicy::relaxed(), Some(store)).unwrap();
        let g = state.genesis_hash();

        // Chain A: 2 blocks; chain B: 3 blocks.
        extend_chain(&mut state, g, 0, T0, 2, &key);
        let b_tip = extend_chain(&mut state, g, 0, T0 + 100, 3, &key);

        assert_eq!(state.tip().height, 3);
        assert_eq!(state.tip().hash, b_tip);
        b_tip
    };

    // Both branches persist; the reopened chainstate picks the same winner.
    let store = BlockStore::open(dir.path()).unwrap();
    let reopened = ChainState::open(genesis, ValidationPolicy::relaxed(), Some(store)).unwrap();
    assert_eq!(reopened.tip().height, 3);
    assert_eq!(reopened.tip().hash, b_tip);
}

#[test]
fn test_late_arriving_longer_fork_wins() {
    let key = keypair();
    let mut state = memory_chain(&key);
    let g = state.genesis_hash();

    let a_tip = extend_chain(&mut state, g, 0, T0, 2, &key);
    assert_eq!(state.tip().hash, a_tip);

    let b_tip = extend_chain(&mut state, g, 0, T0 + 500, 3, &key);
    assert_eq!(state.tip().height, 3);
    assert_eq!(state.tip().hash, b_tip);

    // The losing branch stays queryable.
    assert!(state.contains(&a_tip));
    assert!(state.get_block(&a_tip).is_some());
}

#[test]
fn test_replay_rejects_corrupted_block_file() {
    let key = keypair();
    let dir = TempDir::new().unwrap();
    let genesis = test_genesis(&key);

    let child_hash = {
        let store = BlockStore::open(dir.path()).unwrap();
        let mut state =
            ChainState::open(genesis.clone(), ValidationPolicy::relaxed(), Some(store)).unwrap();
        let g = state.genesis_hash();
        extend_chain(&mut state, g, 0, T0, 1, &key)
    };

    // Truncate the child's file on disk.
    let path = dir
        .path()
        .join("blocks")
        .join(format!("{}.blk", hex::encode(child_hash)));
    std::fs::write(&path, b"garbage").unwrap();

    let store = BlockStore::open(dir.path()).unwrap();
    let result = ChainState::open(genesis, ValidationPolicy::relaxed(), Some(store));
    assert!(result.is_err(), "startup must abort on a corrupt block");
}

#[test]
fn test_orphan_then_parent_connects() {
    let key = keypair();
    let mut state = memory_chain(&key);
    let g = state.genesis_hash();

    let c1 = build_block(g, 1, T0 + 1, Vec::new(), &key);
    let c2 = build_block(c1.hash(), 2, T0 + 2, Vec::new(), &key);

    // Child before parent: orphaned with the parent named.
    match state.submit_block(c2.clone()) {
        SubmitOutcome::Orphan { parent_hash } => assert_eq!(parent_hash, c1.hash()),
        other => panic!("expected orphan, got {:?}", other),
    }

    assert!(matches!(
        state.submit_block(c1),
        SubmitOutcome::Accepted { .. }
    ));
    // Resubmission of the former orphan now connects.
    assert!(matches!(
        state.submit_block(c2),
        SubmitOutcome::Accepted { became_best: true, .. }
    ));
    assert_eq!(state.tip().height, 2);
}
