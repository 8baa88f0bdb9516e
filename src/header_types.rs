//! Consensus-relevant block header shape.
//!
//! Chain storage, state root computation, and transaction/receipt tries are out of
//! scope for this crate; this type carries only the fields the consensus engine reads
//! or writes. It always RLP-encodes the 15 standard Ethereum header fields followed by
//! the three XDC-specific fields (`validators`, `validator`, `penalties`), matching the
//! wire shape produced by XDC full nodes. [`XdcHeader::hash_slow`] hashes only the
//! first 15 fields so hashes stay compatible with peers that index headers the
//! Ethereum way.

use alloy_primitives::{Address, Bloom, Bytes, B256, B64, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

#[derive(Debug, Clone, PartialEq, Eq, Default, RlpEncodable, RlpDecodable)]
pub struct XdcHeader {
    pub parent_hash: B256,
    pub uncle_hash: B256,
    pub coinbase: Address,
    pub state_root: B256,
    pub transactions_root: B256,
    pub receipts_root: B256,
    pub logs_bloom: Bloom,
    pub difficulty: U256,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Bytes,
    pub mix_hash: B256,
    pub nonce: B64,
    /// Empty except on epoch-switch headers, where it holds the new masternode set.
    pub validators: Bytes,
    /// 65-byte seal signature from the block's leader, empty only pre-seal.
    pub validator: Bytes,
    /// Empty except on epoch-switch headers.
    pub penalties: Bytes,
}

impl XdcHeader {
    /// Hash over the 15 standard Ethereum header fields only, excluding the XDC
    /// extension fields. This is the hash peers index headers by and the hash embedded
    /// in `BlockInfo`.
    pub fn hash_slow(&self) -> B256 {
        #[derive(RlpEncodable)]
        struct StandardFields<'a> {
            parent_hash: &'a B256,
            uncle_hash: &'a B256,
            coinbase: &'a Address,
            state_root: &'a B256,
            transactions_root: &'a B256,
            receipts_root: &'a B256,
            logs_bloom: &'a Bloom,
            difficulty: &'a U256,
            number: u64,
            gas_limit: u64,
            gas_used: u64,
            timestamp: u64,
            extra_data: &'a Bytes,
            mix_hash: &'a B256,
            nonce: &'a B64,
        }

        let standard = StandardFields {
            parent_hash: &self.parent_hash,
            uncle_hash: &self.uncle_hash,
            coinbase: &self.coinbase,
            state_root: &self.state_root,
            transactions_root: &self.transactions_root,
            receipts_root: &self.receipts_root,
            logs_bloom: &self.logs_bloom,
            difficulty: &self.difficulty,
            number: self.number,
            gas_limit: self.gas_limit,
            gas_used: self.gas_used,
            timestamp: self.timestamp,
            extra_data: &self.extra_data,
            mix_hash: &self.mix_hash,
            nonce: &self.nonce,
        };
        alloy_primitives::keccak256(alloy_rlp::encode(&standard))
    }

    pub fn is_epoch_switch_number(&self, epoch: u64) -> bool {
        self.number % epoch == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_slow_ignores_xdc_extension_fields() {
        let mut a = XdcHeader { number: 5, ..Default::default() };
        let b = a.clone();
        a.validators = Bytes::from_static(&[1, 2, 3]);
        assert_eq!(a.hash_slow(), b.hash_slow());
    }

    #[test]
    fn hash_slow_is_sensitive_to_standard_fields() {
        let a = XdcHeader { number: 5, ..Default::default() };
        let b = XdcHeader { number: 6, ..Default::default() };
        assert_ne!(a.hash_slow(), b.hash_slow());
    }
}
