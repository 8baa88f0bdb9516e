//! RLP encoding for wire structures and header extra-data.
//!
//! Signature hashes are computed over the RLP encoding of the "for-sign" payload
//! structures, not over the wire message itself, so that adding fields to [`Vote`] or
//! [`Timeout`] (e.g. a signer cache) never changes what gets signed.

use crate::errors::{EngineError, EngineResult};
use crate::types::{
    BlockInfo, QuorumCert, Round, TimeoutCert, TimeoutForSign, VoteForSign,
};
use alloy_primitives::{keccak256, B256};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};

/// Version byte prefixed to every v2 extra-data encoding.
pub const EXTRA_V2_VERSION: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct BlockInfoRlp {
    hash: B256,
    round: u64,
    number: u64,
}

impl From<&BlockInfo> for BlockInfoRlp {
    fn from(info: &BlockInfo) -> Self {
        Self { hash: info.hash, round: info.round, number: info.number }
    }
}

impl From<BlockInfoRlp> for BlockInfo {
    fn from(rlp: BlockInfoRlp) -> Self {
        Self { hash: rlp.hash, round: rlp.round, number: rlp.number }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct QuorumCertRlp {
    proposed_block_info: BlockInfoRlp,
    signatures: Vec<Vec<u8>>,
    gap_number: u64,
}

impl From<&QuorumCert> for QuorumCertRlp {
    fn from(qc: &QuorumCert) -> Self {
        Self {
            proposed_block_info: (&qc.proposed_block_info).into(),
            signatures: qc.signatures.clone(),
            gap_number: qc.gap_number,
        }
    }
}

impl From<QuorumCertRlp> for QuorumCert {
    fn from(rlp: QuorumCertRlp) -> Self {
        Self {
            proposed_block_info: rlp.proposed_block_info.into(),
            signatures: rlp.signatures,
            gap_number: rlp.gap_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct TimeoutCertRlp {
    round: u64,
    signatures: Vec<Vec<u8>>,
    gap_number: u64,
}

impl From<&TimeoutCert> for TimeoutCertRlp {
    fn from(tc: &TimeoutCert) -> Self {
        Self { round: tc.round, signatures: tc.signatures.clone(), gap_number: tc.gap_number }
    }
}

impl From<TimeoutCertRlp> for TimeoutCert {
    fn from(rlp: TimeoutCertRlp) -> Self {
        Self { round: rlp.round, signatures: rlp.signatures, gap_number: rlp.gap_number }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct VoteForSignRlp {
    proposed_block_info: BlockInfoRlp,
    gap_number: u64,
}

impl From<&VoteForSign> for VoteForSignRlp {
    fn from(v: &VoteForSign) -> Self {
        Self { proposed_block_info: (&v.proposed_block_info).into(), gap_number: v.gap_number }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct TimeoutForSignRlp {
    round: u64,
    gap_number: u64,
}

impl From<&TimeoutForSign> for TimeoutForSignRlp {
    fn from(t: &TimeoutForSign) -> Self {
        Self { round: t.round, gap_number: t.gap_number }
    }
}

/// Digest signed by a vote: `keccak256(rlp(VoteForSign))`.
pub fn vote_sig_hash(vote: &VoteForSign) -> B256 {
    let rlp: VoteForSignRlp = vote.into();
    keccak256(alloy_rlp::encode(&rlp))
}

/// Digest signed by a timeout: `keccak256(rlp(TimeoutForSign))`.
pub fn timeout_sig_hash(timeout: &TimeoutForSign) -> B256 {
    let rlp: TimeoutForSignRlp = timeout.into();
    keccak256(alloy_rlp::encode(&rlp))
}

#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[rlp(trailing)]
struct ExtraFieldsV2Rlp {
    round: u64,
    quorum_cert: Option<QuorumCertRlp>,
}

/// Encode `(round, parent_qc)` into a version-prefixed header extra-data payload.
/// `parent_qc` is `None` only for the last v1 block / first v2 block.
pub fn encode_extra_fields_v2(round: Round, quorum_cert: Option<&QuorumCert>) -> Vec<u8> {
    let fields = ExtraFieldsV2Rlp { round, quorum_cert: quorum_cert.map(Into::into) };
    let encoded = alloy_rlp::encode(&fields);
    let mut out = Vec::with_capacity(1 + encoded.len());
    out.push(EXTRA_V2_VERSION);
    out.extend_from_slice(&encoded);
    out
}

/// Decode a version-prefixed header extra-data payload into `(round, parent_qc)`.
pub fn decode_extra_fields_v2(bytes: &[u8]) -> EngineResult<(Round, Option<QuorumCert>)> {
    let (version, rest) = bytes.split_first().ok_or(EngineError::ExtraDataTooShort)?;
    if *version < EXTRA_V2_VERSION {
        return Err(EngineError::NotV2Block(*version));
    }
    let fields = ExtraFieldsV2Rlp::decode(&mut &rest[..])
        .map_err(|_| EngineError::InvalidExtraData)?;
    Ok((fields.round, fields.quorum_cert.map(Into::into)))
}
