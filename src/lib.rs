//! HotStuff-family BFT consensus engine for permissioned PoS chains.
//!
//! Implements a leader-based, round-driven consensus core: masternodes vote on
//! proposed blocks, votes aggregate into quorum certificates, stalled rounds aggregate
//! timeouts into timeout certificates, and a three-chain rule commits blocks once a QC
//! chain of three consecutive rounds forms. Epoch rotation and masternode-set changes
//! are resolved from the chain itself rather than carried as separate state.
//!
//! ## Architecture
//!
//! - [`Engine`] - owns round state, the vote/timeout pools, and the message handlers
//! - [`EngineConfig`] - epoch/gap/timing/threshold parameters for a deployment
//! - [`EngineState`] - the mutable round-based state machine (`processQC`, `processTC`,
//!   the three-chain commit rule, the voting rule)
//! - [`SnapshotStore`] / [`EpochIndex`] - masternode-set resolution at gap blocks and
//!   epoch-switch blocks respectively
//! - [`ForensicsProcessor`] - conflicting-QC detection

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

extern crate alloc;

mod broadcast;
mod certificate;
mod chain;
mod codec;
mod config;
mod engine;
mod epoch;
mod errors;
mod forensics;
mod header_types;
mod header_verifier;
mod pool;
mod proposer;
mod signature;
mod snapshot;
mod state;
mod timer;
mod types;
mod v1_bridge;

pub use broadcast::{Broadcaster, OutboundMessage};
pub use certificate::{verify_qc, verify_tc};
pub use chain::{ChainReader, NoSigner, Signer};
pub use codec::{decode_extra_fields_v2, encode_extra_fields_v2, timeout_sig_hash, vote_sig_hash};
pub use config::{apothem_config, mainnet_config, EngineConfig};
pub use engine::{Engine, EngineStatus};
pub use epoch::{decode_validator_list, encode_validator_list, EpochIndex};
pub use errors::{EngineError, EngineResult};
pub use forensics::{ForensicProof, ForensicsProcessor};
pub use header_types::XdcHeader;
pub use header_verifier::{NoPenalties, PenaltyHook, EMPTY_UNCLE_HASH};
pub use proposer::{is_leader, select_leader};
pub use signature::{
    common_signers, recover_signer, recover_unique_signers, sign_digest, unique_signatures,
    verify_signature,
};
pub use snapshot::{Snapshot, SnapshotPersistence, SnapshotStore};
pub use state::{is_extending_from_ancestor, qc_triple, EngineState, ProcessQcOutcome};
pub use types::{
    BlockInfo, EpochSwitchInfo, ExtraFieldsV2, QuorumCert, Round, Signature, SyncInfo, Timeout,
    TimeoutCert, TimeoutForSign, Vote, VoteForSign,
};
pub use v1_bridge::V1ExtraData;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    pub use crate::chain::test_support::{MockChain, TestSigner};
    pub use crate::snapshot::test_support::InMemoryPersistence;
}

/// True if `block_number` falls exactly on an epoch boundary.
pub fn is_epoch_switch(block_number: u64, epoch: u64) -> bool {
    block_number % epoch == 0
}

/// Zero-based epoch index containing `block_number`.
pub fn epoch_number(block_number: u64, epoch: u64) -> u64 {
    block_number / epoch
}

/// First block number of epoch `epoch_index`.
pub fn epoch_start_block(epoch_index: u64, epoch: u64) -> u64 {
    epoch_index * epoch
}

/// Gap block number for the epoch switching at `epoch_switch_number`, saturating at
/// zero for epochs shorter than the configured gap (only possible in test configs).
pub fn calculate_gap_number(epoch_switch_number: u64, gap: u64) -> u64 {
    epoch_switch_number.saturating_sub(gap)
}
