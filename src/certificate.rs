//! Certificate verification: checks a QC or TC carries enough distinct masternode
//! signatures over the correct digest.
//!
//! Threshold comparisons use integer arithmetic throughout (`count * 1000 >= N * 667`)
//! rather than a floating-point ratio, so acceptance is bit-for-bit identical across
//! platforms and compiler versions. See [`EngineConfig::meets_threshold`].

use crate::codec::{timeout_sig_hash, vote_sig_hash};
use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::signature::{recover_unique_signers, unique_signatures};
use crate::types::{QuorumCert, TimeoutCert, TimeoutForSign, VoteForSign};
use alloy_primitives::Address;
use tracing::warn;

/// Verify `qc` carries enough distinct signatures from `masternodes` over its proposed
/// block info. The genesis QC (round 0) is exempt, since it has no predecessor to have
/// been voted on.
pub fn verify_qc(qc: &QuorumCert, masternodes: &[Address], config: &EngineConfig) -> EngineResult<()> {
    if masternodes.is_empty() {
        return Err(EngineError::EmptyMasternodeList);
    }
    if qc.proposed_block_info.round == 0 {
        return Ok(());
    }

    let (unique, duplicates) = unique_signatures(&qc.signatures);
    if !duplicates.is_empty() {
        warn!(
            count = duplicates.len(),
            block = qc.proposed_block_info.number,
            "duplicate signatures in QC"
        );
    }

    let min_signatures = config.min_signatures(masternodes.len());
    if unique.len() < min_signatures {
        return Err(EngineError::InsufficientSignatures { have: unique.len(), need: min_signatures });
    }

    let sig_hash = vote_sig_hash(&VoteForSign {
        proposed_block_info: qc.proposed_block_info.clone(),
        gap_number: qc.gap_number,
    });

    let (valid_sigs, _dups, signers) = recover_unique_signers(&sig_hash, &unique)?;
    let valid_count = signers.iter().filter(|addr| masternodes.contains(addr)).count();

    if valid_count != valid_sigs.len() {
        return Err(EngineError::InvalidQcSignatures("signature from non-masternode".into()));
    }
    if !config.meets_threshold(valid_count, masternodes.len()) {
        return Err(EngineError::InsufficientSignatures { have: valid_count, need: min_signatures });
    }
    Ok(())
}

/// Verify `tc` carries enough distinct signatures from `masternodes` over its round.
/// Callers must resolve `masternodes` via the gap-number-indexed snapshot store, not
/// via the epoch-switch index, since a TC may be produced before the canonical chain
/// has advanced far enough for epoch-switch resolution to succeed.
pub fn verify_tc(tc: &TimeoutCert, masternodes: &[Address], config: &EngineConfig) -> EngineResult<()> {
    if masternodes.is_empty() {
        return Err(EngineError::EmptyMasternodeList);
    }

    let (unique, duplicates) = unique_signatures(&tc.signatures);
    if !duplicates.is_empty() {
        warn!(count = duplicates.len(), round = tc.round, "duplicate signatures in TC");
    }

    let min_signatures = config.min_signatures(masternodes.len());
    if unique.len() < min_signatures {
        return Err(EngineError::InsufficientSignatures { have: unique.len(), need: min_signatures });
    }

    let sig_hash = timeout_sig_hash(&TimeoutForSign { round: tc.round, gap_number: tc.gap_number });
    let (valid_sigs, _dups, signers) = recover_unique_signers(&sig_hash, &unique)?;
    let valid_count = signers.iter().filter(|addr| masternodes.contains(addr)).count();

    if valid_count != valid_sigs.len() {
        return Err(EngineError::InvalidTcSignatures("signature from non-masternode".into()));
    }
    if !config.meets_threshold(valid_count, masternodes.len()) {
        return Err(EngineError::InsufficientSignatures { have: valid_count, need: min_signatures });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::sign_digest;
    use crate::types::BlockInfo;
    use alloy_primitives::B256;

    fn masternode(seed: u8) -> (secp256k1::SecretKey, Address) {
        let secp = secp256k1::Secp256k1::new();
        let sk = secp256k1::SecretKey::from_slice(&[seed; 32]).unwrap();
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);
        let bytes = pk.serialize_uncompressed();
        let hash = alloy_primitives::keccak256(&bytes[1..]);
        (sk, Address::from_slice(&hash[12..]))
    }

    #[test]
    fn verify_qc_accepts_three_of_three_signatures() {
        let config = EngineConfig::default();
        let keys: Vec<_> = (1..=3u8).map(masternode).collect();
        let masternodes: Vec<Address> = keys.iter().map(|(_, addr)| *addr).collect();

        let block_info = BlockInfo::new(B256::with_last_byte(9), 5, 15);
        let mut qc = QuorumCert::new(block_info.clone(), 0);
        let hash = vote_sig_hash(&VoteForSign { proposed_block_info: block_info, gap_number: 0 });
        for (sk, _) in &keys {
            qc.add_signature(sign_digest(&hash, sk).unwrap());
        }

        assert!(verify_qc(&qc, &masternodes, &config).is_ok());
    }

    #[test]
    fn verify_qc_rejects_two_of_three_signatures() {
        // Matches S1: with 3 masternodes, two votes are insufficient under the
        // integer-threshold rule (2 * 1000 < 3 * 667).
        let config = EngineConfig::default();
        let keys: Vec<_> = (1..=3u8).map(masternode).collect();
        let masternodes: Vec<Address> = keys.iter().map(|(_, addr)| *addr).collect();

        let block_info = BlockInfo::new(B256::with_last_byte(9), 5, 15);
        let mut qc = QuorumCert::new(block_info.clone(), 0);
        let hash = vote_sig_hash(&VoteForSign { proposed_block_info: block_info, gap_number: 0 });
        for (sk, _) in keys.iter().take(2) {
            qc.add_signature(sign_digest(&hash, sk).unwrap());
        }

        assert!(matches!(
            verify_qc(&qc, &masternodes, &config).unwrap_err(),
            EngineError::InsufficientSignatures { have: 2, .. }
        ));
    }

    #[test]
    fn verify_qc_rejects_non_masternode_signer() {
        let config = EngineConfig::default();
        let keys: Vec<_> = (1..=3u8).map(masternode).collect();
        let masternodes: Vec<Address> = keys.iter().take(2).map(|(_, addr)| *addr).collect();

        let block_info = BlockInfo::new(B256::with_last_byte(9), 5, 15);
        let mut qc = QuorumCert::new(block_info.clone(), 0);
        let hash = vote_sig_hash(&VoteForSign { proposed_block_info: block_info, gap_number: 0 });
        for (sk, _) in &keys {
            qc.add_signature(sign_digest(&hash, sk).unwrap());
        }

        assert!(matches!(
            verify_qc(&qc, &masternodes, &config).unwrap_err(),
            EngineError::InvalidQcSignatures(_)
        ));
    }

    #[test]
    fn verify_qc_round_zero_is_exempt() {
        let config = EngineConfig::default();
        let block_info = BlockInfo::new(B256::with_last_byte(1), 0, 0);
        let qc = QuorumCert::new(block_info, 0);
        let masternodes = vec![Address::with_last_byte(1)];
        assert!(verify_qc(&qc, &masternodes, &config).is_ok());
    }

    #[test]
    fn verify_tc_accepts_threshold_signatures() {
        let config = EngineConfig::default();
        let keys: Vec<_> = (1..=3u8).map(masternode).collect();
        let masternodes: Vec<Address> = keys.iter().map(|(_, addr)| *addr).collect();

        let mut tc = TimeoutCert::new(1, 450);
        let hash = timeout_sig_hash(&TimeoutForSign { round: 1, gap_number: 450 });
        for (sk, _) in &keys {
            tc.add_signature(sign_digest(&hash, sk).unwrap());
        }

        assert!(verify_tc(&tc, &masternodes, &config).is_ok());
    }
}
