//! Core BFT message and certificate types shared by every component.

use alloc::string::String;
use alloc::vec::Vec;
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Consensus round number. Strictly increases along any valid chain.
pub type Round = u64;

/// A 65-byte recoverable ECDSA signature (r ‖ s ‖ v).
pub type Signature = Vec<u8>;

/// Identifies a block by hash, consensus round and chain position at once.
///
/// Certificates and votes always carry a `BlockInfo` rather than a bare hash so that
/// verifiers can check round/number coherence without a chain lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct BlockInfo {
    pub hash: B256,
    pub round: Round,
    pub number: u64,
}

impl BlockInfo {
    pub fn new(hash: B256, round: Round, number: u64) -> Self {
        Self { hash, round, number }
    }
}

/// Aggregate proof that at least a threshold fraction of the epoch's masternodes voted
/// for `proposed_block_info`.
///
/// `gap_number` anchors the certificate to the snapshot used to resolve signer identity:
/// verifiers must resolve masternodes at this exact gap number, not at the current head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCert {
    pub proposed_block_info: BlockInfo,
    pub signatures: Vec<Signature>,
    pub gap_number: u64,
}

impl QuorumCert {
    pub fn new(proposed_block_info: BlockInfo, gap_number: u64) -> Self {
        Self { proposed_block_info, signatures: Vec::new(), gap_number }
    }

    pub fn add_signature(&mut self, signature: Signature) {
        self.signatures.push(signature);
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }
}

/// Aggregate proof that at least a threshold fraction of the epoch's masternodes gave up
/// on `round` without reaching a QC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutCert {
    pub round: Round,
    pub signatures: Vec<Signature>,
    pub gap_number: u64,
}

impl TimeoutCert {
    pub fn new(round: Round, gap_number: u64) -> Self {
        Self { round, signatures: Vec::new(), gap_number }
    }

    pub fn add_signature(&mut self, signature: Signature) {
        self.signatures.push(signature);
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }
}

/// Broadcast after a node times out (or periodically) to let lagging peers catch up
/// without replaying every vote and timeout individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInfo {
    pub highest_quorum_cert: QuorumCert,
    pub highest_timeout_cert: TimeoutCert,
}

/// Wire message sent by a node that has voted for a proposed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proposed_block_info: BlockInfo,
    pub signature: Signature,
    pub gap_number: u64,
    #[serde(skip)]
    signer: Option<Address>,
}

impl Vote {
    pub fn new(proposed_block_info: BlockInfo, signature: Signature, gap_number: u64) -> Self {
        Self { proposed_block_info, signature, gap_number, signer: None }
    }

    pub fn set_signer(&mut self, signer: Address) {
        self.signer = Some(signer);
    }

    pub fn signer(&self) -> Option<Address> {
        self.signer
    }

    /// Pool key grouping votes for the same proposed block. Matches the shape used by
    /// the timeout pool key (`round:gapNumber`) plus enough of the block identity that
    /// two different proposals at the same round never collide in the pool.
    pub fn pool_key(&self) -> String {
        alloc::format!(
            "{}:{}:{}:{:?}",
            self.proposed_block_info.round,
            self.gap_number,
            self.proposed_block_info.number,
            self.proposed_block_info.hash
        )
    }
}

/// Wire message sent by a node that gave up waiting on the current round's proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeout {
    pub round: Round,
    pub signature: Signature,
    pub gap_number: u64,
    #[serde(skip)]
    signer: Option<Address>,
}

impl Timeout {
    pub fn new(round: Round, signature: Signature, gap_number: u64) -> Self {
        Self { round, signature, gap_number, signer: None }
    }

    pub fn set_signer(&mut self, signer: Address) {
        self.signer = Some(signer);
    }

    pub fn signer(&self) -> Option<Address> {
        self.signer
    }

    pub fn pool_key(&self) -> String {
        alloc::format!("{}:{}", self.round, self.gap_number)
    }
}

/// The exact payload that gets hashed and signed to produce a vote signature. Kept
/// separate from [`Vote`] because the signature itself is not part of what it signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteForSign {
    pub proposed_block_info: BlockInfo,
    pub gap_number: u64,
}

/// The exact payload that gets hashed and signed to produce a timeout signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutForSign {
    pub round: Round,
    pub gap_number: u64,
}

/// Parsed consensus metadata carried in a v2 header's opaque extra-data field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraFieldsV2 {
    pub round: Round,
    /// `None` only for the last v1 block / genesis v2 block, which has no parent QC.
    pub quorum_cert: Option<QuorumCert>,
}

impl ExtraFieldsV2 {
    pub fn new(round: Round, quorum_cert: Option<QuorumCert>) -> Self {
        Self { round, quorum_cert }
    }
}

/// Masternode set and boundary metadata for one epoch, cached by the epoch-switch
/// block's hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSwitchInfo {
    pub masternodes: Vec<Address>,
    pub epoch_switch_block_info: BlockInfo,
    pub epoch_switch_parent_block_info: Option<BlockInfo>,
}

impl EpochSwitchInfo {
    pub fn masternodes_len(&self) -> usize {
        self.masternodes.len()
    }
}
