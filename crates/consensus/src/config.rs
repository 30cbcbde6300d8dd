//! Consensus configuration.

use std::time::Duration;

/// Tunable parameters of the consensus core.
///
/// The defaults match the reference deployment; tests shrink the timers.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base duration of one reduction step (and of the generation window).
    pub step_duration: Duration,

    /// Base deadline for score collection.
    pub selection_deadline: Duration,

    /// Step ceiling; exceeding it stalls the round until external sync.
    pub max_steps: u8,

    /// Committee size cap for reduction (and selection eligibility).
    pub committee_size_reduction: usize,

    /// Committee size cap for agreement.
    pub committee_size_agreement: usize,

    /// Fraction of committee slots needed for quorum (applied with ceiling).
    pub quorum_fraction: f64,

    /// Most bids included in one blind-bid proof.
    pub bid_subset_cap: usize,

    /// Cap on the per-round timeout multiplier.
    pub max_timeout_multiplier: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            step_duration: Duration::from_secs(5),
            selection_deadline: Duration::from_secs(20),
            max_steps: 213,
            committee_size_reduction: 50,
            committee_size_agreement: 64,
            quorum_fraction: 0.75,
            bid_subset_cap: 10,
            max_timeout_multiplier: 8,
        }
    }
}

impl Config {
    /// The step duration scaled by the current round multiplier.
    pub fn scaled_step_duration(&self, multiplier: u32) -> Duration {
        self.step_duration * multiplier
    }

    /// The selection deadline scaled by the current round multiplier.
    pub fn scaled_selection_deadline(&self, multiplier: u32) -> Duration {
        self.selection_deadline * multiplier
    }
}
