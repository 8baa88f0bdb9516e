//! Engine configuration.
//!
//! Deserializable with `serde` so it can be embedded as a sub-object of the embedding
//! node's chain-config JSON, mirroring how the teacher embeds `V2Config` inside
//! `XDPoSConfig`. The engine owns only the slice of configuration it actually consumes;
//! loading the surrounding JSON document is the embedder's job.

use serde::{Deserialize, Serialize};

/// Denominator used for integer certificate-threshold arithmetic (see
/// [`EngineConfig::cert_threshold_numerator`]).
pub const CERT_THRESHOLD_DENOMINATOR: u64 = 1000;

/// Configuration consumed by the BFT engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Blocks per epoch.
    pub epoch: u64,

    /// Offset from the epoch boundary at which the next epoch's candidate snapshot is
    /// captured: `gap_block = epoch_start - gap`.
    pub gap: u64,

    /// Target inter-block time, in seconds.
    pub period: u64,

    /// Minimum inter-block time enforced by header verification, in seconds.
    pub mine_period: u64,

    /// Certificate acceptance threshold numerator over [`CERT_THRESHOLD_DENOMINATOR`].
    /// A value of 667 means "at least 66.7% of masternodes". Integer arithmetic is used
    /// throughout certificate verification so acceptance is bit-for-bit identical
    /// across platforms; see the threshold check in `certificate.rs`.
    pub cert_threshold_numerator: u64,

    /// Countdown before a round timeout fires, in seconds.
    pub timeout_worker_duration: u64,

    /// Number of consecutive timeouts that trigger an extra SyncInfo broadcast.
    pub timeout_sync_threshold: u64,

    /// Block number at which this engine takes over from the legacy v1 engine.
    pub switch_block: u64,

    /// Rounds below `current_round - pool_hygiene_round` are evicted from the vote and
    /// timeout pools by the periodic hygiene sweep.
    pub pool_hygiene_round: u64,

    /// Test-only bypass of header verification.
    #[serde(default)]
    pub skip_v2_validation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            epoch: 900,
            gap: 450,
            period: 2,
            mine_period: 2,
            cert_threshold_numerator: 667,
            timeout_worker_duration: 10,
            timeout_sync_threshold: 3,
            switch_block: 0,
            pool_hygiene_round: 10,
            skip_v2_validation: false,
        }
    }
}

impl EngineConfig {
    pub fn new(switch_block: u64) -> Self {
        Self { switch_block, ..Default::default() }
    }

    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn with_gap(mut self, gap: u64) -> Self {
        self.gap = gap;
        self
    }

    pub fn with_period(mut self, period: u64) -> Self {
        self.period = period;
        self
    }

    pub fn with_mine_period(mut self, mine_period: u64) -> Self {
        self.mine_period = mine_period;
        self
    }

    pub fn with_cert_threshold_numerator(mut self, numerator: u64) -> Self {
        self.cert_threshold_numerator = numerator;
        self
    }

    pub fn with_timeout_worker_duration(mut self, duration: u64) -> Self {
        self.timeout_worker_duration = duration;
        self
    }

    pub fn with_timeout_sync_threshold(mut self, threshold: u64) -> Self {
        self.timeout_sync_threshold = threshold;
        self
    }

    pub fn with_skip_v2_validation(mut self, skip: bool) -> Self {
        self.skip_v2_validation = skip;
        self
    }

    /// Minimum signature count required out of `masternode_count` masternodes, computed
    /// with integer arithmetic: the smallest `count` such that
    /// `count * DENOMINATOR >= masternode_count * numerator`.
    pub fn min_signatures(&self, masternode_count: usize) -> usize {
        let masternode_count = masternode_count as u64;
        let numerator = masternode_count.saturating_mul(self.cert_threshold_numerator);
        let mut count = numerator / CERT_THRESHOLD_DENOMINATOR;
        if count * CERT_THRESHOLD_DENOMINATOR < numerator {
            count += 1;
        }
        count as usize
    }

    /// Number of unique valid signatures required to satisfy the threshold.
    pub fn meets_threshold(&self, signature_count: usize, masternode_count: usize) -> bool {
        (signature_count as u64) * CERT_THRESHOLD_DENOMINATOR
            >= (masternode_count as u64) * self.cert_threshold_numerator
    }

    /// The gap block number for the epoch containing `number`.
    pub fn gap_number_for(&self, number: u64) -> u64 {
        let epoch_start = number - (number % self.epoch);
        epoch_start.saturating_sub(self.gap)
    }

    pub fn is_gap_block(&self, number: u64) -> bool {
        number % self.epoch == self.epoch.saturating_sub(self.gap)
    }

    pub fn is_epoch_switch_number(&self, number: u64) -> bool {
        number % self.epoch == 0
    }
}

/// Configuration for the production mainnet deployment this engine was built for.
pub fn mainnet_config() -> EngineConfig {
    EngineConfig::new(80_370_000)
}

/// Configuration for the public test network deployment.
pub fn apothem_config() -> EngineConfig {
    EngineConfig::new(56_828_700)
}
