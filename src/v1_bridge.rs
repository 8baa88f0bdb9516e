//! Legacy (v1) header extra-data parsing.
//!
//! The engine does not run v1 consensus, but it must be able to parse the extra-data of
//! the *last* v1 block, since that block is treated as the genesis epoch-switch for the
//! v2 chain (see `epoch.rs`). Extra-data there has the legacy Clique-family shape:
//! `vanity (32) ‖ validator addresses (20 * N) ‖ seal (65)`.

use crate::errors::{EngineError, EngineResult};
use alloy_primitives::Address;

pub const EXTRA_VANITY: usize = 32;
pub const EXTRA_SEAL: usize = 65;

/// Parsed legacy extra-data, as found on the last v1 block before the v2 switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V1ExtraData {
    pub vanity: [u8; EXTRA_VANITY],
    pub validators: Vec<Address>,
    pub seal: [u8; EXTRA_SEAL],
}

impl V1ExtraData {
    /// Parse `data`, expecting an embedded validator list iff `is_checkpoint`.
    pub fn parse(data: &[u8], is_checkpoint: bool) -> EngineResult<Self> {
        if data.len() < EXTRA_VANITY + EXTRA_SEAL {
            return Err(EngineError::ExtraDataTooShort);
        }

        let mut vanity = [0u8; EXTRA_VANITY];
        vanity.copy_from_slice(&data[0..EXTRA_VANITY]);

        let mut seal = [0u8; EXTRA_SEAL];
        seal.copy_from_slice(&data[data.len() - EXTRA_SEAL..]);

        let validators = if is_checkpoint {
            let body = &data[EXTRA_VANITY..data.len() - EXTRA_SEAL];
            if body.len() % 20 != 0 {
                return Err(EngineError::InvalidExtraData);
            }
            body.chunks_exact(20).map(Address::from_slice).collect()
        } else {
            if data.len() != EXTRA_VANITY + EXTRA_SEAL {
                return Err(EngineError::InvalidExtraData);
            }
            Vec::new()
        };

        Ok(Self { vanity, validators, seal })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(EXTRA_VANITY + self.validators.len() * 20 + EXTRA_SEAL);
        out.extend_from_slice(&self.vanity);
        for validator in &self.validators {
            out.extend_from_slice(validator.as_slice());
        }
        out.extend_from_slice(&self.seal);
        out
    }
}
