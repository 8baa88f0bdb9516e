//! Error taxonomy for the consensus engine.
//!
//! Every public entry point returns `Result<T, EngineError>`. Handlers never panic;
//! background tasks (forensics, broadcaster) log their own failures since nothing else
//! observes them.

use alloc::string::String;
use reth_consensus::ConsensusError;

/// Errors produced by the round-based BFT engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    // --- decoding errors ---
    #[error("extra data too short")]
    ExtraDataTooShort,

    #[error("invalid extra data format")]
    InvalidExtraData,

    #[error("not a v2 block, version byte: {0}")]
    NotV2Block(u8),

    #[error("invalid signature format")]
    InvalidSignatureFormat,

    // --- round mismatch ---
    #[error("incoming message round {incoming} too far from current round {current}")]
    IncomingMessageRoundTooFarFromCurrentRound { incoming: u64, current: u64 },

    #[error("incoming message round {incoming} not equal to current round {current}")]
    IncomingMessageRoundNotEqualCurrentRound { incoming: u64, current: u64 },

    #[error("round {round} is not greater than parent QC round {parent_round}")]
    RoundNotGreaterThanParentQc { round: u64, parent_round: u64 },

    // --- signature / authorization failures ---
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("insufficient signatures: have {have}, need {need}")]
    InsufficientSignatures { have: usize, need: usize },

    #[error("invalid QC signatures: {0}")]
    InvalidQcSignatures(String),

    #[error("invalid TC signatures: {0}")]
    InvalidTcSignatures(String),

    #[error("invalid quorum certificate")]
    InvalidQc,

    #[error("invalid timeout certificate")]
    InvalidTc,

    #[error("missing quorum certificate")]
    MissingQc,

    #[error("missing timeout certificate")]
    MissingTc,

    #[error("signer {0:?} is not a masternode")]
    SignerNotMasternode(alloy_primitives::Address),

    #[error("header leader mismatch: expected {expected:?}, got {actual:?}")]
    ErrNotItsTurn { expected: alloy_primitives::Address, actual: alloy_primitives::Address },

    #[error("coinbase does not match recovered validator signer")]
    ErrCoinbaseAndValidatorMismatch,

    #[error("validators field does not match the computed masternode set")]
    ErrValidatorsNotLegit,

    #[error("penalties field does not match the computed penalty set")]
    ErrPenaltiesNotLegit,

    #[error("validators or penalties present on a non-epoch-switch header")]
    ErrInvalidFieldInNonEpochSwitch,

    // --- chain lookup failures ---
    #[error("unknown block")]
    UnknownBlock,

    #[error("unknown ancestor")]
    UnknownAncestor,

    #[error("ancestor walk exceeded bound of {bound} blocks")]
    AncestorWalkExceeded { bound: u64 },

    #[error("failed to get header by number: {0}")]
    GetHeaderByNumberFailed(u64),

    #[error("failed to get header by hash")]
    GetHeaderByHashFailed,

    #[error("snapshot not found for hash")]
    SnapshotNotFound,

    #[error("epoch switch info not found")]
    EpochSwitchInfoNotFound,

    // --- state machine rejections ---
    #[error("already mined this round")]
    ErrAlreadyMined,

    #[error("invalid round")]
    ErrRoundInvalid,

    #[error("invalid timestamp")]
    ErrInvalidTimestamp,

    #[error("block is in the future")]
    FutureBlock,

    #[error("non-zero mix digest")]
    InvalidMixDigest,

    #[error("non-empty uncle hash")]
    InvalidUncleHash,

    #[error("invalid difficulty, expected 1")]
    InvalidDifficulty,

    #[error("invalid nonce")]
    InvalidNonce,

    #[error("voting rule rejected proposal at round {round}")]
    VotingRuleRejected { round: u64 },

    #[error("block does not extend from locked quorum certificate")]
    ErrInvalidVotingChain,

    #[error("empty masternode list")]
    EmptyMasternodeList,

    // --- internal invariants ---
    #[error("gap number mismatch")]
    GapNumberMismatch,

    #[error("block info mismatch")]
    BlockInfoMismatch,

    #[error("engine not initialized")]
    EngineNotInitialized,

    #[error("{0}")]
    Custom(String),
}

impl From<EngineError> for ConsensusError {
    fn from(err: EngineError) -> Self {
        ConsensusError::Custom(alloc::sync::Arc::new(err))
    }
}

impl From<EngineError> for reth_errors::RethError {
    fn from(err: EngineError) -> Self {
        reth_errors::RethError::Consensus(err.into())
    }
}

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_consensus_error() {
        let err = EngineError::InvalidQc;
        let consensus_err: ConsensusError = err.into();
        assert!(matches!(consensus_err, ConsensusError::Custom(_)));
    }

    #[test]
    fn display_messages_are_non_empty() {
        let err = EngineError::InsufficientSignatures { have: 1, need: 2 };
        assert_eq!(err.to_string(), "insufficient signatures: have 1, need 2");
    }
}
