//! Conflicting-QC forensics.
//!
//! Runs off the critical path: `Engine::process_qc` spawns this check against an
//! immutable copy of the newly formed three-chain triple, never touching engine state
//! directly. Detects two quorum certificates at the same round certifying different
//! blocks — which can only happen if enough masternodes equivocated — and reports the
//! signers common to both as attackers.

use crate::codec::vote_sig_hash;
use crate::signature::{common_signers, recover_unique_signers};
use crate::types::{QuorumCert, VoteForSign};
use alloy_primitives::Address;
use parking_lot::Mutex;
use tracing::warn;

/// Evidence that a set of masternodes signed two conflicting quorum certificates.
#[derive(Debug, Clone)]
pub struct ForensicProof {
    pub attackers: Vec<Address>,
    pub qc_a: QuorumCert,
    pub qc_b: QuorumCert,
}

/// Recover the unique signers of a QC, ignoring recovery failures (a malformed
/// signature cannot be evidence of equivocation by a real masternode).
fn signers_of(qc: &QuorumCert) -> Vec<Address> {
    let hash = vote_sig_hash(&VoteForSign {
        proposed_block_info: qc.proposed_block_info.clone(),
        gap_number: qc.gap_number,
    });
    recover_unique_signers(&hash, &qc.signatures).map(|(_, _, signers)| signers).unwrap_or_default()
}

/// Tracks the most recent three-chain triple of committed/observed QCs per chain tip
/// and flags conflicts against newly observed triples.
pub struct ForensicsProcessor {
    last_triple: Mutex<Option<[QuorumCert; 3]>>,
}

impl ForensicsProcessor {
    pub fn new() -> Self {
        Self { last_triple: Mutex::new(None) }
    }

    /// Compare `new_triple` (grandparent, parent, current QC, oldest first) against the
    /// last triple seen. Returns forensic evidence if a conflict is found; otherwise
    /// records `new_triple` as the new baseline.
    pub fn check(&self, new_triple: [QuorumCert; 3]) -> Option<ForensicProof> {
        let mut guard = self.last_triple.lock();

        if let Some(old_triple) = guard.as_ref() {
            let same_chain = old_triple.iter().any(|old| {
                new_triple.iter().any(|new| {
                    new.proposed_block_info.round == old.proposed_block_info.round
                        && new.proposed_block_info.hash == old.proposed_block_info.hash
                })
            });

            if !same_chain {
                for new_qc in &new_triple {
                    for old_qc in old_triple.iter() {
                        if new_qc.proposed_block_info.round == old_qc.proposed_block_info.round
                            && new_qc.proposed_block_info.hash != old_qc.proposed_block_info.hash
                        {
                            let attackers = common_signers(&signers_of(new_qc), &signers_of(old_qc));
                            if !attackers.is_empty() {
                                let proof = ForensicProof {
                                    attackers,
                                    qc_a: new_qc.clone(),
                                    qc_b: old_qc.clone(),
                                };
                                warn!(
                                    round = new_qc.proposed_block_info.round,
                                    attackers = proof.attackers.len(),
                                    "conflicting quorum certificates detected"
                                );
                                *guard = Some(new_triple);
                                return Some(proof);
                            }
                        }
                    }
                }
            }
        }

        *guard = Some(new_triple);
        None
    }
}

impl Default for ForensicsProcessor {
    fn default() -> Self {
        Self::new()
    }
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

    fn qc_signed_by(round: u64, hash_byte: u8, keys: &[secp256k1::SecretKey]) -> QuorumCert {
        let block_info = BlockInfo::new(B256::with_last_byte(hash_byte), round, round);
        let mut qc = QuorumCert::new(block_info.clone(), 0);
        let sig_hash = vote_sig_hash(&VoteForSign { proposed_block_info: block_info, gap_number: 0 });
        for key in keys {
            qc.add_signature(sign_digest(&sig_hash, key).unwrap());
        }
        qc
    }

    #[test]
    fn detects_three_common_signers_across_conflicting_round() {
        // Matches S6: two QCs at the same round for different blocks, signed by an
        // overlapping set of three masternodes, are reported with exactly those three
        // addresses as attackers.
        let keys: Vec<_> = (1..=3u8).map(|s| masternode(s).0).collect();

        let triple_a =
            [qc_signed_by(3, 13, &keys), qc_signed_by(4, 14, &keys), qc_signed_by(5, 15, &keys)];
        let triple_b =
            [qc_signed_by(3, 23, &keys), qc_signed_by(4, 24, &keys), qc_signed_by(5, 25, &keys)];

        let processor = ForensicsProcessor::new();
        assert!(processor.check(triple_a).is_none());
        let proof = processor.check(triple_b).expect("conflict must be detected");
        assert_eq!(proof.attackers.len(), 3);
    }

    #[test]
    fn same_chain_triples_never_conflict() {
        let keys: Vec<_> = (1..=3u8).map(|s| masternode(s).0).collect();
        let triple = [qc_signed_by(3, 13, &keys), qc_signed_by(4, 14, &keys), qc_signed_by(5, 15, &keys)];

        let processor = ForensicsProcessor::new();
        assert!(processor.check(triple.clone()).is_none());
        assert!(processor.check(triple).is_none());
    }
}
