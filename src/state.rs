//! Round-based BFT state machine: `processQC`, `processTC`, `setNewRound`, the
//! three-chain commit rule, and the HotStuff voting-rule predicate.
//!
//! State only ever mutates through the methods on [`EngineState`], which the owning
//! [`crate::Engine`] calls while holding its single write lock (§5). Every method here
//! is synchronous and takes `&mut self` rather than the lock itself, so tests can drive
//! the state machine directly without spinning up the full engine.

use crate::chain::ChainReader;
use crate::codec::decode_extra_fields_v2;
use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::types::{BlockInfo, QuorumCert, Round, TimeoutCert};
use tracing::debug;

/// Outcome of feeding a QC through [`EngineState::process_qc`].
#[derive(Debug, Clone, Default)]
pub struct ProcessQcOutcome {
    /// Set if the three-chain rule newly committed a block.
    pub committed: Option<BlockInfo>,
    /// Set if this QC advanced the round counter.
    pub new_round: Option<Round>,
}

/// Mutable round-based consensus state. Mirrors the "Engine state" block of the data
/// model exactly: `current_round`, `highest_voted_round`, `highest_quorum_cert`,
/// `lock_quorum_cert`, `highest_timeout_cert`, `highest_commit_block`.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub current_round: Round,
    pub highest_voted_round: Round,
    pub highest_quorum_cert: Option<QuorumCert>,
    pub lock_quorum_cert: Option<QuorumCert>,
    pub highest_timeout_cert: Option<TimeoutCert>,
    pub highest_commit_block: Option<BlockInfo>,
}

impl EngineState {
    /// Seed state for the first v2 block: round 1, a genesis QC pointing at the switch
    /// block, no lock QC. Mirrors `Initial` in §3's lifecycle note.
    pub fn genesis(genesis_qc: QuorumCert) -> Self {
        Self {
            current_round: 1,
            highest_voted_round: 0,
            highest_quorum_cert: Some(genesis_qc),
            lock_quorum_cert: None,
            highest_timeout_cert: None,
            highest_commit_block: None,
        }
    }

    fn highest_qc_round(&self) -> Round {
        self.highest_quorum_cert.as_ref().map(|qc| qc.proposed_block_info.round).unwrap_or(0)
    }

    fn highest_tc_round(&self) -> Round {
        self.highest_timeout_cert.as_ref().map(|tc| tc.round).unwrap_or(0)
    }

    /// §4.6 `processQC`: adopt `qc` as the new high QC if it is newer, derive the lock
    /// QC from its target block's embedded parent QC, attempt a three-chain commit, and
    /// advance the round if `qc` certifies at or beyond the current round.
    pub fn process_qc(
        &mut self,
        chain: &dyn ChainReader,
        config: &EngineConfig,
        qc: &QuorumCert,
    ) -> EngineResult<ProcessQcOutcome> {
        let mut outcome = ProcessQcOutcome::default();

        if qc.proposed_block_info.round > self.highest_qc_round() {
            self.highest_quorum_cert = Some(qc.clone());
        }

        if qc.proposed_block_info.number > config.switch_block {
            if let Some(header) = chain.header_by_hash(qc.proposed_block_info.hash) {
                if let Ok((_, Some(parent_qc))) = decode_extra_fields_v2(&header.extra_data) {
                    let replace = match &self.lock_quorum_cert {
                        None => true,
                        Some(lock) => parent_qc.proposed_block_info.round > lock.proposed_block_info.round,
                    };
                    if replace {
                        debug!(round = parent_qc.proposed_block_info.round, "lock QC advanced");
                        self.lock_quorum_cert = Some(parent_qc);
                    }
                }
            }
        }

        outcome.committed = self.commit_blocks(chain, config, qc)?;

        if qc.proposed_block_info.round >= self.current_round {
            let next = qc.proposed_block_info.round + 1;
            outcome.new_round = Some(next);
        }

        Ok(outcome)
    }

    /// §4.6 `processTC`: adopt `tc` if newer, advance the round if it certifies at or
    /// beyond the current round. Returns the new round if one was reached, so the
    /// caller (`Engine`) can apply `set_new_round` under the same lock acquisition.
    pub fn process_tc(&mut self, tc: &TimeoutCert) -> Option<Round> {
        if tc.round > self.highest_tc_round() {
            self.highest_timeout_cert = Some(tc.clone());
        }
        if tc.round >= self.current_round {
            Some(tc.round + 1)
        } else {
            None
        }
    }

    /// §4.6 `setNewRound`: the timeout pool is cleared here by the caller (`Engine`,
    /// which owns the pools); this method only updates the round counter itself. The
    /// vote pool is deliberately *not* touched — see the open-question note on
    /// `Engine::set_new_round`.
    pub fn set_new_round(&mut self, round: Round) {
        debug!(from = self.current_round, to = round, "round advanced");
        self.current_round = round;
    }

    /// §4.6.2 three-chain commit rule. `qc` certifies block `B`; if `B`'s parent `P`
    /// and grandparent `G` carry rounds `R-1` and `R-2` respectively, `G` is
    /// irrevocably committed.
    fn commit_blocks(
        &mut self,
        chain: &dyn ChainReader,
        config: &EngineConfig,
        qc: &QuorumCert,
    ) -> EngineResult<Option<BlockInfo>> {
        let block_info = &qc.proposed_block_info;
        if block_info.number <= config.switch_block + 2 {
            return Ok(None);
        }

        let header_b = match chain.header_by_hash(block_info.hash) {
            Some(h) => h,
            None => return Ok(None),
        };
        let header_p = match chain.header_by_hash(header_b.parent_hash) {
            Some(h) => h,
            None => return Ok(None),
        };
        let (p_round, _) = decode_extra_fields_v2(&header_p.extra_data)?;
        if p_round != block_info.round.saturating_sub(1) {
            return Ok(None);
        }

        let header_g = match chain.header_by_hash(header_p.parent_hash) {
            Some(h) => h,
            None => return Ok(None),
        };
        let (g_round, _) = decode_extra_fields_v2(&header_g.extra_data)?;
        if g_round != block_info.round.saturating_sub(2) {
            return Ok(None);
        }

        let grandparent_info = BlockInfo::new(header_g.hash_slow(), g_round, header_g.number);
        let should_commit = match &self.highest_commit_block {
            None => true,
            Some(current) => current.round < grandparent_info.round && current.number < grandparent_info.number,
        };

        if should_commit {
            debug!(round = grandparent_info.round, number = grandparent_info.number, "block committed");
            self.highest_commit_block = Some(grandparent_info.clone());
            Ok(Some(grandparent_info))
        } else {
            Ok(None)
        }
    }

    /// §4.6.1 HotStuff voting rule: should this node vote for `block_info` given its
    /// `parent_qc`?
    pub fn should_vote(
        &self,
        chain: &dyn ChainReader,
        block_info: &BlockInfo,
        parent_qc: &QuorumCert,
    ) -> EngineResult<bool> {
        if self.current_round <= self.highest_voted_round {
            return Ok(false);
        }
        if block_info.round != self.current_round {
            return Ok(false);
        }

        let lock = match &self.lock_quorum_cert {
            None => return Ok(true),
            Some(lock) => lock,
        };

        if parent_qc.proposed_block_info.round > lock.proposed_block_info.round {
            return Ok(true);
        }

        is_extending_from_ancestor(chain, block_info, &lock.proposed_block_info)
    }
}

/// Walk `block_info`'s ancestry back exactly `block_info.number - ancestor.number`
/// parent links and check the result matches `ancestor.hash`. The walk is naturally
/// bounded by the block-number difference, but a malformed QC could still claim a huge
/// difference, so [`MAX_ANCESTOR_WALK_BOUND`] caps it defensively (§9 open question:
/// the distilled source does not bound this; this crate does).
pub fn is_extending_from_ancestor(
    chain: &dyn ChainReader,
    block_info: &BlockInfo,
    ancestor: &BlockInfo,
) -> EngineResult<bool> {
    if block_info.number < ancestor.number {
        return Ok(false);
    }
    let diff = block_info.number - ancestor.number;
    if diff > MAX_ANCESTOR_WALK_BOUND {
        return Err(EngineError::AncestorWalkExceeded { bound: MAX_ANCESTOR_WALK_BOUND });
    }

    let mut current_hash = block_info.hash;
    for _ in 0..diff {
        let header = chain.header_by_hash(current_hash).ok_or(EngineError::UnknownAncestor)?;
        current_hash = header.parent_hash;
    }
    Ok(current_hash == ancestor.hash)
}

/// Sanity bound on ancestor walks: 2 * the default epoch length (900). Chosen to match
/// §9's "cap the walk at a sanity bound (e.g., 2·Epoch)" guidance using the crate's
/// default epoch, since this free function has no `EngineConfig` to read a deployment's
/// actual epoch length from.
const MAX_ANCESTOR_WALK_BOUND: u64 = 1_800;

/// Reconstruct the three-chain triple `[qc_for_grandparent, qc_for_parent, qc]` that a
/// newly processed `qc` implies, for forensics (§4.13). The QC for `qc`'s target block
/// `B`'s parent `P` is exactly the parent QC embedded in `B`'s own extra-data, and the QC
/// for `P`'s parent `G` is the parent QC embedded in `P`'s extra-data — no separate
/// certificate store is needed, every QC a block was formed under is carried by its
/// child. Returns `None` if any header or embedded QC along the way is unavailable,
/// which is routine (e.g. near the switch block, or for a QC that never became part of
/// the canonical chain).
pub fn qc_triple(chain: &dyn ChainReader, qc: &QuorumCert) -> Option<[QuorumCert; 3]> {
    let header_b = chain.header_by_hash(qc.proposed_block_info.hash)?;
    let (_, qc_for_p) = decode_extra_fields_v2(&header_b.extra_data).ok()?;
    let qc_for_p = qc_for_p?;

    let header_p = chain.header_by_hash(header_b.parent_hash)?;
    let (_, qc_for_g) = decode_extra_fields_v2(&header_p.extra_data).ok()?;
    let qc_for_g = qc_for_g?;

    Some([qc_for_g, qc_for_p, qc.clone()])
}
