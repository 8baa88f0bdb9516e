//! S5: header verification accepts a block sealed by the correct round-robin leader and
//! rejects one sealed by anyone else, driven through `Engine::verify_header` /
//! `Engine::is_my_turn` rather than the header_verifier free functions directly.

mod common;

use alloy_primitives::U256;
use reth_consensus_hotstuff::test_support::{InMemoryPersistence, MockChain, TestSigner};
use reth_consensus_hotstuff::{
    sign_digest, BlockInfo, Engine, EngineConfig, EngineError, NoPenalties, QuorumCert,
    EMPTY_UNCLE_HASH,
};
use std::sync::Arc;

fn build_engine() -> (Arc<Engine>, Vec<common::Masternode>, reth_consensus_hotstuff::XdcHeader) {
    let config = EngineConfig::new(0).with_mine_period(0).with_epoch(900);
    let keys = common::masternodes(3);
    let addrs = common::addresses(&keys);

    let chain = Arc::new(MockChain::new());
    let switch = common::switch_header(&config, &addrs);
    let switch_hash = switch.hash_slow();
    chain.insert(switch_hash, switch.clone());

    let signer = Arc::new(TestSigner::new(1));
    let persistence = Arc::new(InMemoryPersistence::default());
    let (engine, _receiver) = Engine::new(config, chain, signer, persistence, Arc::new(NoPenalties));
    engine.initialize(switch_hash, addrs).unwrap();

    (engine, keys, switch)
}

fn sealed_candidate(
    switch: &reth_consensus_hotstuff::XdcHeader,
    leader: &common::Masternode,
) -> reth_consensus_hotstuff::XdcHeader {
    let genesis_qc = QuorumCert::new(BlockInfo::new(switch.hash_slow(), 0, 0), 0);
    let mut candidate = common::v2_header(switch, 1, Some(&genesis_qc), None);
    candidate.uncle_hash = EMPTY_UNCLE_HASH;
    candidate.difficulty = U256::from(1);
    candidate.timestamp = 100;
    candidate.coinbase = leader.address;
    let sig_hash = candidate.hash_slow();
    candidate.validator = sign_digest(&sig_hash, &leader.secret_key).unwrap().into();
    candidate
}

#[tokio::test]
async fn header_sealed_by_the_selected_leader_verifies() {
    let (engine, keys, switch) = build_engine();
    // round 1 mod epoch(900) mod 3 masternodes selects keys[1].
    let candidate = sealed_candidate(&switch, &keys[1]);

    let result = engine.verify_header(&candidate, &switch, 1_000);
    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn header_sealed_by_the_wrong_leader_is_rejected() {
    let (engine, keys, switch) = build_engine();
    let candidate = sealed_candidate(&switch, &keys[0]);

    let err = engine.verify_header(&candidate, &switch, 1_000).unwrap_err();
    assert!(matches!(err, EngineError::ErrNotItsTurn { .. }));
}

#[tokio::test]
async fn is_my_turn_reports_true_only_for_the_selected_leader() {
    let (engine, keys, switch) = build_engine();
    let _ = &keys;

    // The engine's own signing identity is keys[0] (seed 1); round 1 selects keys[1], so
    // this engine instance is not the leader for round 1.
    assert!(!engine.is_my_turn(&switch, 1).unwrap());
}
