//! Shared fixtures for black-box scenario tests: masternode keypairs, header builders,
//! and certificate builders, built entirely against the crate's public API.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use reth_consensus_hotstuff::{
    encode_extra_fields_v2, sign_digest, timeout_sig_hash, vote_sig_hash, BlockInfo, EngineConfig,
    QuorumCert, Round, TimeoutCert, TimeoutForSign, VoteForSign, XdcHeader,
};

pub struct Masternode {
    pub secret_key: secp256k1::SecretKey,
    pub address: Address,
}

pub fn masternodes(count: u8) -> Vec<Masternode> {
    (1..=count)
        .map(|seed| {
            let secp = secp256k1::Secp256k1::new();
            let secret_key = secp256k1::SecretKey::from_slice(&[seed; 32]).unwrap();
            let public_key = secp256k1::PublicKey::from_secret_key(&secp, &secret_key);
            let uncompressed = public_key.serialize_uncompressed();
            let address = Address::from_slice(&keccak256(&uncompressed[1..])[12..]);
            Masternode { secret_key, address }
        })
        .collect()
}

pub fn addresses(masternodes: &[Masternode]) -> Vec<Address> {
    masternodes.iter().map(|m| m.address).collect()
}

fn flat_addresses(addrs: &[Address]) -> Vec<u8> {
    addrs.iter().flat_map(|a| a.as_slice().to_vec()).collect()
}

/// A legacy-format checkpoint header at `config.switch_block`: 32 bytes vanity, the flat
/// masternode list, 65 bytes seal. `EpochIndex` treats this as the epoch-switch record
/// bridging the v1 and v2 engines.
pub fn switch_header(config: &EngineConfig, masternodes: &[Address]) -> XdcHeader {
    let mut extra = vec![0u8; 32];
    extra.extend(flat_addresses(masternodes));
    extra.extend_from_slice(&[0u8; 65]);
    XdcHeader { number: config.switch_block, extra_data: Bytes::from(extra), ..Default::default() }
}

/// Build a v2 header as a child of `parent`, optionally re-asserting the masternode set
/// in `validators` (required on the bridge block, per `EpochIndex::resolve`).
pub fn v2_header(
    parent: &XdcHeader,
    round: Round,
    parent_qc: Option<&QuorumCert>,
    masternodes_for_validators: Option<&[Address]>,
) -> XdcHeader {
    let extra = encode_extra_fields_v2(round, parent_qc);
    let validators = masternodes_for_validators
        .map(|addrs| Bytes::from(flat_addresses(addrs)))
        .unwrap_or_default();
    XdcHeader {
        number: parent.number + 1,
        parent_hash: parent.hash_slow(),
        extra_data: Bytes::from(extra),
        validators,
        difficulty: U256::from(1),
        ..Default::default()
    }
}

/// Collect threshold-satisfying signatures from `signers` over a vote digest and build
/// the resulting QC.
pub fn build_qc(block_info: BlockInfo, gap_number: u64, signers: &[&Masternode]) -> QuorumCert {
    let digest = vote_sig_hash(&VoteForSign { proposed_block_info: block_info.clone(), gap_number });
    let mut qc = QuorumCert::new(block_info, gap_number);
    for signer in signers {
        let sig = sign_digest(&digest, &signer.secret_key).unwrap();
        qc.add_signature(sig.to_vec());
    }
    qc
}

/// Collect threshold-satisfying signatures from `signers` over a timeout digest and
/// build the resulting TC.
pub fn build_tc(round: Round, gap_number: u64, signers: &[&Masternode]) -> TimeoutCert {
    let digest = timeout_sig_hash(&TimeoutForSign { round, gap_number });
    let mut tc = TimeoutCert::new(round, gap_number);
    for signer in signers {
        let sig = sign_digest(&digest, &signer.secret_key).unwrap();
        tc.add_signature(sig.to_vec());
    }
    tc
}

pub fn genesis_qc(switch_block_hash: B256, switch_block: u64) -> QuorumCert {
    QuorumCert::new(BlockInfo::new(switch_block_hash, 0, switch_block), 0)
}
