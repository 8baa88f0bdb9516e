//! Signature primitives: recovery, local signing, and parallel batch recovery.

use crate::errors::{EngineError, EngineResult};
use alloy_primitives::{keccak256, Address, Signature as AlloySignature, B256};
use rayon::prelude::*;
use std::collections::HashSet;

/// Recover the signer address from a 65-byte recoverable ECDSA signature over `hash`.
///
/// Accepts both legacy (27/28) and EIP-155 (`chain_id*2+35/36`) `v` encodings, since
/// `alloy_primitives::Signature::try_from` normalizes either into a recovery id.
pub fn recover_signer(hash: &B256, signature: &[u8]) -> EngineResult<Address> {
    if signature.len() != 65 {
        return Err(EngineError::InvalidSignatureFormat);
    }
    let sig = AlloySignature::try_from(signature).map_err(|_| EngineError::InvalidSignatureFormat)?;
    sig.recover_address_from_prehash(hash).map_err(|_| EngineError::SignatureVerificationFailed)
}

/// Sign `hash` with a raw secp256k1 private key, producing a 65-byte `r ‖ s ‖ v`
/// signature. Used by tests and by any embedder that wants a default signing function
/// rather than bringing its own keystore.
pub fn sign_digest(hash: &B256, private_key: &secp256k1::SecretKey) -> EngineResult<Vec<u8>> {
    use secp256k1::{Message, Secp256k1};

    let secp = Secp256k1::new();
    let message =
        Message::from_digest_slice(hash.as_slice()).map_err(|_| EngineError::InvalidSignatureFormat)?;
    let (recovery_id, compact) =
        secp.sign_ecdsa_recoverable(&message, private_key).serialize_compact();

    let mut out = Vec::with_capacity(65);
    out.extend_from_slice(&compact);
    out.push(recovery_id.to_i32() as u8 + 27);
    Ok(out)
}

/// Check whether `signature` over `hash` was produced by one of `masternodes`.
/// Returns the recovered signer regardless of membership so callers can log it.
pub fn verify_signature(
    hash: &B256,
    signature: &[u8],
    masternodes: &[Address],
) -> EngineResult<(bool, Address)> {
    if masternodes.is_empty() {
        return Err(EngineError::EmptyMasternodeList);
    }
    let signer = recover_signer(hash, signature)?;
    Ok((masternodes.contains(&signer), signer))
}

/// Split `signatures` into (unique, duplicates) by raw byte content.
pub fn unique_signatures(signatures: &[Vec<u8>]) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut duplicates = Vec::new();
    for sig in signatures {
        if seen.insert(keccak256(sig)) {
            unique.push(sig.clone());
        } else {
            duplicates.push(sig.clone());
        }
    }
    (unique, duplicates)
}

/// Recover signers for every signature in parallel, deduplicating by recovered address
/// (not by raw signature bytes — two distinct byte encodings of the same signature
/// must not count twice toward a threshold).
///
/// Returns `(unique_signatures, duplicate_signatures, unique_signers)` in the same
/// relative order signatures were first seen.
pub fn recover_unique_signers(
    hash: &B256,
    signatures: &[Vec<u8>],
) -> EngineResult<(Vec<Vec<u8>>, Vec<Vec<u8>>, Vec<Address>)> {
    if signatures.is_empty() {
        return Ok((Vec::new(), Vec::new(), Vec::new()));
    }

    let recovered: Vec<EngineResult<(Vec<u8>, Address)>> = signatures
        .par_iter()
        .map(|sig| recover_signer(hash, sig).map(|addr| (sig.clone(), addr)))
        .collect();

    let mut seen = HashSet::new();
    let mut unique_sigs = Vec::new();
    let mut duplicate_sigs = Vec::new();
    let mut unique_signers = Vec::new();

    for entry in recovered {
        let (sig, addr) = entry?;
        if seen.insert(addr) {
            unique_sigs.push(sig);
            unique_signers.push(addr);
        } else {
            duplicate_sigs.push(sig);
        }
    }

    Ok((unique_sigs, duplicate_sigs, unique_signers))
}

/// Addresses that appear as a recovered signer in both signature sets.
pub fn common_signers(a: &[Address], b: &[Address]) -> Vec<Address> {
    let set_b: HashSet<&Address> = b.iter().collect();
    a.iter().filter(|addr| set_b.contains(addr)).copied().collect()
}
