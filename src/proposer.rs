//! Leader (proposer) selection.
//!
//! Leader rotation uses `round mod Epoch mod |masternodes|`, not the simpler
//! `round mod |masternodes|`: the extra `mod Epoch` resets the index to `[0, Epoch)` at
//! every epoch boundary before it is taken modulo the (possibly different-sized) new
//! masternode list, which keeps rotation stable across epoch boundaries that resize the
//! validator set.

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::types::Round;
use alloy_primitives::Address;

/// The masternode expected to lead `round`, given the epoch length from `config`.
pub fn select_leader(round: Round, masternodes: &[Address], config: &EngineConfig) -> EngineResult<Address> {
    if masternodes.is_empty() {
        return Err(EngineError::EmptyMasternodeList);
    }
    let index = ((round % config.epoch) as usize) % masternodes.len();
    Ok(masternodes[index])
}

/// Whether `candidate` is the expected leader of `round`.
pub fn is_leader(round: Round, candidate: Address, masternodes: &[Address], config: &EngineConfig) -> EngineResult<bool> {
    Ok(select_leader(round, masternodes, config)? == candidate)
}
