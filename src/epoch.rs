//! Epoch-switch index: resolves the masternode set governing any block by walking
//! parents until an epoch-switch header is found, with an LRU cache keyed by block hash
//! to keep the walk off the hot path for most lookups.

use crate::chain::ChainReader;
use crate::codec::decode_extra_fields_v2;
use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::header_types::XdcHeader;
use crate::types::{BlockInfo, EpochSwitchInfo};
use crate::v1_bridge::V1ExtraData;
use alloy_primitives::{Address, B256};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

const EPOCH_CACHE_CAPACITY: usize = 256;

/// Decode a flat list of 20-byte addresses (no vanity, no seal) as stored in a v2
/// epoch-switch header's `validators` field.
pub fn decode_validator_list(bytes: &[u8]) -> EngineResult<Vec<Address>> {
    if bytes.len() % 20 != 0 {
        return Err(EngineError::ErrValidatorsNotLegit);
    }
    Ok(bytes.chunks_exact(20).map(Address::from_slice).collect())
}

pub fn encode_validator_list(validators: &[Address]) -> Vec<u8> {
    let mut out = Vec::with_capacity(validators.len() * 20);
    for v in validators {
        out.extend_from_slice(v.as_slice());
    }
    out
}

pub struct EpochIndex {
    cache: Mutex<LruCache<B256, Arc<EpochSwitchInfo>>>,
}

impl EpochIndex {
    pub fn new() -> Self {
        Self { cache: Mutex::new(LruCache::new(NonZeroUsize::new(EPOCH_CACHE_CAPACITY).unwrap())) }
    }

    /// Resolve the epoch-switch record governing the block at `hash`.
    pub fn get_epoch_switch_info(
        &self,
        chain: &dyn ChainReader,
        config: &EngineConfig,
        hash: B256,
    ) -> EngineResult<Arc<EpochSwitchInfo>> {
        if let Some(info) = self.cache.lock().get(&hash) {
            return Ok(info.clone());
        }

        let header = chain.header_by_hash(hash).ok_or(EngineError::UnknownBlock)?;
        let info = self.resolve(chain, config, &header)?;
        self.cache.lock().put(hash, info.clone());
        Ok(info)
    }

    fn resolve(
        &self,
        chain: &dyn ChainReader,
        config: &EngineConfig,
        header: &XdcHeader,
    ) -> EngineResult<Arc<EpochSwitchInfo>> {
        let header_hash = header.hash_slow();

        // The last v1 block bridges the two engines: it is always treated as an
        // epoch-switch block, with masternodes parsed from the legacy checkpoint
        // extra-data layout.
        if header.number == config.switch_block {
            let parsed = V1ExtraData::parse(&header.extra_data, true)?;
            return Ok(Arc::new(EpochSwitchInfo {
                masternodes: parsed.validators,
                epoch_switch_block_info: BlockInfo::new(header_hash, 0, header.number),
                epoch_switch_parent_block_info: None,
            }));
        }

        let (round, parent_qc) = decode_extra_fields_v2(&header.extra_data)?;

        // The v2 block immediately following the v1->v2 switch is also a bridge point:
        // its QC targets the switch block itself.
        let parent_is_switch_block =
            parent_qc.as_ref().map(|qc| qc.proposed_block_info.number == config.switch_block).unwrap_or(true);

        let is_epoch_switch = parent_is_switch_block
            || parent_qc
                .as_ref()
                .map(|qc| qc.proposed_block_info.round < round - (round % config.epoch))
                .unwrap_or(true);

        if is_epoch_switch {
            let masternodes = decode_validator_list(&header.validators)?;
            let epoch_switch_parent_block_info =
                parent_qc.as_ref().map(|qc| qc.proposed_block_info.clone());
            return Ok(Arc::new(EpochSwitchInfo {
                masternodes,
                epoch_switch_block_info: BlockInfo::new(header_hash, round, header.number),
                epoch_switch_parent_block_info,
            }));
        }

        let parent_hash = header.parent_hash;
        if let Some(info) = self.cache.lock().get(&parent_hash) {
            return Ok(info.clone());
        }
        let parent_header = chain.header_by_hash(parent_hash).ok_or(EngineError::UnknownAncestor)?;
        let info = self.resolve(chain, config, &parent_header)?;
        self.cache.lock().put(parent_hash, info.clone());
        Ok(info)
    }
}

impl Default for EpochIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::test_support::MockChain;
    use crate::codec::encode_extra_fields_v2;
    use crate::types::QuorumCert;

    fn v1_switch_header(config: &EngineConfig, validators: &[Address]) -> XdcHeader {
        let mut extra = vec![0u8; 32];
        extra.extend(encode_validator_list(validators));
        extra.extend_from_slice(&[0u8; 65]);
        XdcHeader { number: config.switch_block, extra_data: extra.into(), ..Default::default() }
    }

    #[test]
    fn resolves_v1_switch_block_as_epoch_switch() {
        let config = EngineConfig::new(100);
        let chain = MockChain::new();
        let validators = vec![Address::with_last_byte(1), Address::with_last_byte(2)];
        let header = v1_switch_header(&config, &validators);
        let hash = header.hash_slow();
        chain.insert(hash, header);

        let index = EpochIndex::new();
        let info = index.get_epoch_switch_info(&chain, &config, hash).unwrap();
        assert_eq!(info.masternodes, validators);
    }

    #[test]
    fn non_switch_header_recurses_to_parent() {
        let config = EngineConfig::new(100);
        let chain = MockChain::new();
        let validators = vec![Address::with_last_byte(1), Address::with_last_byte(2)];
        let switch_header = v1_switch_header(&config, &validators);
        let switch_hash = switch_header.hash_slow();
        chain.insert(switch_hash, switch_header);

        let genesis_qc = QuorumCert::new(BlockInfo::new(switch_hash, 0, config.switch_block), 0);
        let extra = encode_extra_fields_v2(1, Some(&genesis_qc));
        let block1 = XdcHeader {
            number: config.switch_block + 1,
            parent_hash: switch_hash,
            extra_data: extra.clone().into(),
            ..Default::default()
        };
        let block1_hash = block1.hash_slow();
        chain.insert(block1_hash, block1);

        let qc2 = QuorumCert::new(BlockInfo::new(block1_hash, 1, config.switch_block + 1), 0);
        let extra2 = encode_extra_fields_v2(2, Some(&qc2));
        let block2 = XdcHeader {
            number: config.switch_block + 2,
            parent_hash: block1_hash,
            extra_data: extra2.into(),
            ..Default::default()
        };
        let block2_hash = block2.hash_slow();
        chain.insert(block2_hash, block2);

        let index = EpochIndex::new();
        let info = index.get_epoch_switch_info(&chain, &config, block2_hash).unwrap();
        assert_eq!(info.masternodes, validators);
        assert_eq!(info.epoch_switch_block_info.hash, block1_hash);
    }
}
