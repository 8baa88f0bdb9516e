//! Top-level engine: wires the state machine, pools, caches, and verifiers together
//! behind the single read/write lock described in §5, and implements the four message
//! handlers (`VoteHandler`, `TimeoutHandler`, `ProposedBlockHandler`, `SyncInfoHandler`)
//! plus `sendVote`/`sendTimeout`.
//!
//! Every state-mutating entry point takes the write side of [`Engine::state`]; read-only
//! accessors take the read side and return owned snapshots, never references into state,
//! per the "shared mutable engine state" redesign note (§9).

use crate::broadcast::{Broadcaster, OutboundMessage};
use crate::certificate::{verify_qc, verify_tc};
use crate::chain::{ChainReader, Signer};
use crate::codec::{decode_extra_fields_v2, timeout_sig_hash, vote_sig_hash};
use crate::config::EngineConfig;
use crate::epoch::EpochIndex;
use crate::errors::{EngineError, EngineResult};
use crate::forensics::ForensicsProcessor;
use crate::header_verifier::{self, PenaltyHook};
use crate::pool::Pool;
use crate::signature::recover_signer;
use crate::snapshot::{Snapshot, SnapshotPersistence, SnapshotStore};
use crate::state::{self, EngineState};
use crate::timer::CountdownTimer;
use crate::types::{
    BlockInfo, QuorumCert, Round, SyncInfo, Timeout, TimeoutCert, TimeoutForSign, Vote,
    VoteForSign,
};
use alloy_primitives::Address;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Read-only, owned snapshot of [`EngineState`] for external callers (tests, RPC).
/// Never a reference into live state, so holding one never blocks a writer.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub current_round: Round,
    pub highest_voted_round: Round,
    pub highest_quorum_cert: Option<QuorumCert>,
    pub lock_quorum_cert: Option<QuorumCert>,
    pub highest_timeout_cert: Option<TimeoutCert>,
    pub highest_commit_block: Option<BlockInfo>,
}

impl From<&EngineState> for EngineStatus {
    fn from(state: &EngineState) -> Self {
        Self {
            current_round: state.current_round,
            highest_voted_round: state.highest_voted_round,
            highest_quorum_cert: state.highest_quorum_cert.clone(),
            lock_quorum_cert: state.lock_quorum_cert.clone(),
            highest_timeout_cert: state.highest_timeout_cert.clone(),
            highest_commit_block: state.highest_commit_block.clone(),
        }
    }
}

/// The round-based BFT consensus engine. Construct once per node with [`Engine::new`];
/// share it via `Arc` across the network handler, the mining loop, and the countdown
/// timer task.
pub struct Engine {
    config: EngineConfig,
    chain: Arc<dyn ChainReader>,
    signer: Arc<dyn Signer>,
    penalty_hook: Arc<dyn PenaltyHook>,
    state: RwLock<EngineState>,
    vote_pool: Mutex<Pool<Vote>>,
    timeout_pool: Mutex<Pool<Timeout>>,
    snapshot_store: SnapshotStore,
    epoch_index: EpochIndex,
    forensics: ForensicsProcessor,
    broadcaster: Broadcaster,
    timer: Arc<CountdownTimer>,
    timeout_streak: AtomicU64,
    highest_self_mined_round: AtomicU64,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        chain: Arc<dyn ChainReader>,
        signer: Arc<dyn Signer>,
        persistence: Arc<dyn SnapshotPersistence>,
        penalty_hook: Arc<dyn PenaltyHook>,
    ) -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<OutboundMessage>) {
        let (broadcaster, receiver) = Broadcaster::channel();
        let timer = Arc::new(CountdownTimer::new(Duration::from_secs(config.timeout_worker_duration)));
        let engine = Arc::new(Self {
            config,
            chain,
            signer,
            penalty_hook,
            state: RwLock::new(EngineState::default()),
            vote_pool: Mutex::new(Pool::new()),
            timeout_pool: Mutex::new(Pool::new()),
            snapshot_store: SnapshotStore::new(persistence),
            epoch_index: EpochIndex::new(),
            forensics: ForensicsProcessor::new(),
            broadcaster,
            timer,
            timeout_streak: AtomicU64::new(0),
            highest_self_mined_round: AtomicU64::new(0),
        });
        (engine, receiver)
    }

    /// §3 lifecycle: seed state on first exposure to a v2-height header. Builds a
    /// genesis QC pointing at the switch block and stores the initial snapshot so the
    /// very first v2 proposal has a masternode set to evaluate against.
    pub fn initialize(&self, switch_block_hash: alloy_primitives::B256, initial_masternodes: Vec<Address>) -> EngineResult<()> {
        let genesis_qc = QuorumCert::new(BlockInfo::new(switch_block_hash, 0, self.config.switch_block), 0);
        self.snapshot_store.store(Snapshot::new(self.config.switch_block, switch_block_hash, initial_masternodes))?;
        *self.state.write() = EngineState::genesis(genesis_qc);
        debug!(switch_block = self.config.switch_block, "engine initialized");
        Ok(())
    }

    pub fn current_round(&self) -> Round {
        self.state.read().current_round
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus::from(&*self.state.read())
    }

    pub fn spawn_timer(self: &Arc<Self>) -> tokio::sync::mpsc::UnboundedReceiver<()> {
        self.timer.spawn()
    }

    fn masternodes_for_block(&self, block_hash: alloy_primitives::B256) -> EngineResult<Vec<Address>> {
        Ok(self
            .epoch_index
            .get_epoch_switch_info(self.chain.as_ref(), &self.config, block_hash)?
            .masternodes
            .clone())
    }

    fn masternodes_for_gap(&self, gap_number: u64) -> EngineResult<Vec<Address>> {
        Ok(self
            .snapshot_store
            .get_snapshot(self.chain.as_ref(), &self.config, gap_number, true)?
            .next_epoch_candidates
            .clone())
    }

    /// Apply a newly formed or received QC to state, run the three-chain commit rule,
    /// advance the round if warranted, and kick off a detached forensics check.
    fn apply_qc(self: &Arc<Self>, qc: &QuorumCert) -> EngineResult<()> {
        let outcome = {
            let mut state = self.state.write();
            state.process_qc(self.chain.as_ref(), &self.config, qc)?
        };

        if let Some(round) = outcome.new_round {
            self.set_new_round(round);
        }
        if let Some(committed) = &outcome.committed {
            debug!(round = committed.round, number = committed.number, "three-chain commit");
        }

        if let Some(triple) = state::qc_triple(self.chain.as_ref(), qc) {
            if let Some(proof) = self.forensics.check(triple) {
                warn!(attackers = proof.attackers.len(), "forensics: conflicting QCs detected");
            }
        }
        Ok(())
    }

    /// §4.5 step 6: a QC's `proposedBlockInfo` must agree with the header it names —
    /// same number, same round as decoded from that header's own extra-data. The
    /// genesis QC (round 0) has no v2 header to check against and is exempt.
    fn verify_qc_header_coherence(&self, qc: &QuorumCert) -> EngineResult<()> {
        if qc.proposed_block_info.round == 0 {
            return Ok(());
        }
        let header = self.chain.header_by_hash(qc.proposed_block_info.hash).ok_or(EngineError::UnknownAncestor)?;
        let (header_round, _) = decode_extra_fields_v2(&header.extra_data)?;
        if header.number != qc.proposed_block_info.number || header_round != qc.proposed_block_info.round {
            return Err(EngineError::BlockInfoMismatch);
        }
        Ok(())
    }

    fn apply_tc(&self, tc: &TimeoutCert) {
        let new_round = self.state.write().process_tc(tc);
        if let Some(round) = new_round {
            self.set_new_round(round);
        }
    }

    /// §4.6 `setNewRound`: bump the round, reset the countdown timer, clear the timeout
    /// pool. The vote pool is deliberately left untouched (§9 open question): votes for
    /// the round that just ended may still combine into that round's QC.
    fn set_new_round(&self, round: Round) {
        self.state.write().set_new_round(round);
        self.timer.reset(Duration::from_secs(self.config.timeout_worker_duration));
        self.timeout_pool.lock().clear();
    }

    /// §4.4 hygiene sweep, intended to run off a periodic tick (§5).
    pub fn run_pool_hygiene(&self) {
        let current_round = self.current_round();
        self.vote_pool.lock().evict_stale(current_round, self.config.pool_hygiene_round);
        self.timeout_pool.lock().evict_stale(current_round, self.config.pool_hygiene_round);
    }

    // ---- §4.7 vote path ----

    /// Accepts votes for the current round or the one just finished: stragglers may
    /// still be voting for `current_round - 1` by the time this node has already
    /// advanced, and their vote can still complete that round's QC.
    pub fn vote_handler(self: &Arc<Self>, vote: Vote) -> EngineResult<()> {
        let current_round = self.current_round();
        if vote.proposed_block_info.round != current_round
            && vote.proposed_block_info.round != current_round.saturating_sub(1)
        {
            return Err(EngineError::IncomingMessageRoundTooFarFromCurrentRound {
                incoming: vote.proposed_block_info.round,
                current: current_round,
            });
        }

        let key = vote.pool_key();
        let (pool_size, bucket) = self.vote_pool.lock().add(key.clone(), vote.clone());
        trace!(round = vote.proposed_block_info.round, pool_size, "vote pooled");

        let masternodes = self.masternodes_for_block(vote.proposed_block_info.hash)?;
        let min_signatures = self.config.min_signatures(masternodes.len());
        if pool_size < min_signatures {
            return Ok(());
        }

        if self.chain.header_by_hash(vote.proposed_block_info.hash).is_none() {
            return Ok(());
        }
        let mut qc = QuorumCert::new(vote.proposed_block_info.clone(), vote.gap_number);
        self.verify_qc_header_coherence(&qc)?;

        let sig_hash = vote_sig_hash(&VoteForSign {
            proposed_block_info: vote.proposed_block_info.clone(),
            gap_number: vote.gap_number,
        });

        let mut seen = std::collections::HashSet::new();
        for pooled in &bucket {
            match recover_signer(&sig_hash, &pooled.signature) {
                Ok(signer) if masternodes.contains(&signer) && seen.insert(signer) => {
                    qc.add_signature(pooled.signature.clone());
                }
                Ok(_) => {}
                Err(_) => warn!("dropping vote with unrecoverable signature"),
            }
        }

        if qc.signature_count() < min_signatures {
            return Ok(());
        }

        self.apply_qc(&qc)?;
        self.vote_pool.lock().clear_by_key(&key);
        Ok(())
    }

    /// §4.7 `sendVote`: sign `(block_info, gap_number)`, record the vote, feed it back
    /// through the local pool, and broadcast it.
    pub fn send_vote(self: &Arc<Self>, block_info: BlockInfo) -> EngineResult<()> {
        let epoch_info = self.epoch_index.get_epoch_switch_info(self.chain.as_ref(), &self.config, block_info.hash)?;
        let gap_number = self.config.gap_number_for(epoch_info.epoch_switch_block_info.number);

        let digest = vote_sig_hash(&VoteForSign { proposed_block_info: block_info.clone(), gap_number });
        let signature = self.signer.sign(&digest)?.to_vec();

        self.state.write().highest_voted_round = self.current_round();

        let mut vote = Vote::new(block_info, signature, gap_number);
        vote.set_signer(self.signer.address());

        self.vote_handler(vote.clone())?;
        self.broadcaster.send(OutboundMessage::Vote(vote));
        Ok(())
    }

    // ---- §4.8 timeout path ----

    pub fn timeout_handler(self: &Arc<Self>, timeout: Timeout) -> EngineResult<()> {
        let current_round = self.current_round();
        if timeout.round != current_round {
            return Err(EngineError::IncomingMessageRoundNotEqualCurrentRound {
                incoming: timeout.round,
                current: current_round,
            });
        }

        let key = timeout.pool_key();
        let (pool_size, bucket) = self.timeout_pool.lock().add(key.clone(), timeout.clone());
        trace!(round = timeout.round, pool_size, "timeout pooled");

        let masternodes = self.masternodes_for_gap(timeout.gap_number)?;
        let min_signatures = self.config.min_signatures(masternodes.len());
        if pool_size < min_signatures {
            return Ok(());
        }

        let sig_hash = timeout_sig_hash(&TimeoutForSign { round: timeout.round, gap_number: timeout.gap_number });
        let mut tc = TimeoutCert::new(timeout.round, timeout.gap_number);
        let mut seen = std::collections::HashSet::new();
        for pooled in &bucket {
            match recover_signer(&sig_hash, &pooled.signature) {
                Ok(signer) if masternodes.contains(&signer) && seen.insert(signer) => {
                    tc.add_signature(pooled.signature.clone());
                }
                Ok(_) => {}
                Err(_) => warn!("dropping timeout with unrecoverable signature"),
            }
        }

        if tc.signature_count() < min_signatures {
            return Ok(());
        }

        self.apply_tc(&tc);
        self.timeout_pool.lock().clear_by_key(&key);

        let sync_info = self.build_sync_info();
        self.broadcaster.send(OutboundMessage::SyncInfo(sync_info));
        Ok(())
    }

    /// §4.8 `sendTimeout`: sign `(current_round, gap_number)` off the current chain
    /// head's epoch, feed it back locally, broadcast, and every
    /// `timeout_sync_threshold` consecutive timeouts additionally broadcast a SyncInfo.
    pub fn send_timeout(self: &Arc<Self>) -> EngineResult<()> {
        let head = self.chain.current_header();
        let head_hash = head.hash_slow();
        let epoch_info = self.epoch_index.get_epoch_switch_info(self.chain.as_ref(), &self.config, head_hash)?;
        let gap_number = self.config.gap_number_for(epoch_info.epoch_switch_block_info.number);

        let round = self.current_round();
        let digest = timeout_sig_hash(&TimeoutForSign { round, gap_number });
        let signature = self.signer.sign(&digest)?.to_vec();

        let mut timeout = Timeout::new(round, signature, gap_number);
        timeout.set_signer(self.signer.address());

        self.timeout_handler(timeout.clone())?;
        self.broadcaster.send(OutboundMessage::Timeout(timeout));

        let streak = self.timeout_streak.fetch_add(1, Ordering::SeqCst) + 1;
        if streak % self.config.timeout_sync_threshold == 0 {
            self.broadcaster.send(OutboundMessage::SyncInfo(self.build_sync_info()));
        }
        Ok(())
    }

    /// Driven by the countdown timer task on expiry (§5).
    pub fn on_countdown_timeout(self: &Arc<Self>) -> EngineResult<()> {
        self.send_timeout()
    }

    fn build_sync_info(&self) -> SyncInfo {
        let state = self.state.read();
        SyncInfo {
            highest_quorum_cert: state.highest_quorum_cert.clone().unwrap_or_else(|| {
                QuorumCert::new(BlockInfo::new(alloy_primitives::B256::ZERO, 0, 0), 0)
            }),
            highest_timeout_cert: state.highest_timeout_cert.clone().unwrap_or_else(|| TimeoutCert::new(0, 0)),
        }
    }

    // ---- §4.9 proposed-block path ----

    pub fn proposed_block_handler(self: &Arc<Self>, header: crate::header_types::XdcHeader) -> EngineResult<()> {
        let (round, parent_qc) = decode_extra_fields_v2(&header.extra_data)?;
        let parent_qc = parent_qc.ok_or(EngineError::MissingQc)?;

        let masternodes = self.masternodes_for_block(parent_qc.proposed_block_info.hash)?;
        verify_qc(&parent_qc, &masternodes, &self.config)?;
        self.verify_qc_header_coherence(&parent_qc)?;
        self.apply_qc(&parent_qc)?;

        let block_info = BlockInfo::new(header.hash_slow(), round, header.number);
        let should_vote = self.state.read().should_vote(self.chain.as_ref(), &block_info, &parent_qc)?;
        if should_vote {
            self.send_vote(block_info)?;
        }
        Ok(())
    }

    // ---- §4.10 sync-info path ----

    pub fn sync_info_handler(self: &Arc<Self>, sync_info: SyncInfo) -> EngineResult<()> {
        let qc_masternodes = self.masternodes_for_block(sync_info.highest_quorum_cert.proposed_block_info.hash)?;
        verify_qc(&sync_info.highest_quorum_cert, &qc_masternodes, &self.config)?;
        self.verify_qc_header_coherence(&sync_info.highest_quorum_cert)?;

        let tc_masternodes = self.masternodes_for_gap(sync_info.highest_timeout_cert.gap_number)?;
        verify_tc(&sync_info.highest_timeout_cert, &tc_masternodes, &self.config)?;

        self.apply_qc(&sync_info.highest_quorum_cert)?;
        self.apply_tc(&sync_info.highest_timeout_cert);
        Ok(())
    }

    // ---- header verification / leader selection ----

    pub fn verify_header(
        &self,
        header: &crate::header_types::XdcHeader,
        parent: &crate::header_types::XdcHeader,
        now: u64,
    ) -> EngineResult<()> {
        header_verifier::verify_header(
            self.chain.as_ref(),
            &self.epoch_index,
            &self.config,
            self.penalty_hook.as_ref(),
            header,
            parent,
            now,
        )
    }

    pub fn is_my_turn(&self, parent: &crate::header_types::XdcHeader, round: Round) -> EngineResult<bool> {
        header_verifier::is_my_turn(
            self.chain.as_ref(),
            &self.epoch_index,
            &self.config,
            parent,
            round,
            self.highest_self_mined_round.load(Ordering::SeqCst),
            self.signer.address(),
        )
    }

    pub fn record_self_mined(&self, round: Round) {
        self.highest_self_mined_round.fetch_max(round, Ordering::SeqCst);
    }
}
