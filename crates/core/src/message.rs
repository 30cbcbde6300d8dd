//! Bus message types.

use nocturne_messages::{ConsensusMessage, Topic};
use nocturne_types::{AsyncState, BidList, BlsPublicKey, Hash, ProvisionerSet, Seed};
use std::sync::Arc;

/// A new-round notification from the Chain.
///
/// Carries everything the consensus needs to run the round: the tip it
/// extends, the seed to generate against, and the staking state. The
/// provisioner set and bid list are shared read-only for the whole round.
#[derive(Debug, Clone)]
pub struct RoundUpdate {
    /// The round to run (tip height + 1).
    pub round: u64,
    /// Hash of the chain tip.
    pub tip_hash: Hash,
    /// Seed for this round's score generation.
    pub seed: Seed,
    /// Provisioners staked as of the tip.
    pub provisioners: Arc<ProvisionerSet>,
    /// Bid commitments as of the tip.
    pub bid_list: Arc<BidList>,
}

/// Committee members that contributed no vote in a reduction step.
///
/// Published for reputation accounting; the sink is outside the core.
#[derive(Debug, Clone)]
pub struct AbsenteeReport {
    /// Round the step belongs to.
    pub round: u64,
    /// The reduction step.
    pub step: u8,
    /// BLS keys of the members that stayed silent.
    pub absentees: Vec<BlsPublicKey>,
}

/// Everything that can be published on the event bus.
#[derive(Debug, Clone)]
pub enum Message {
    /// A decoded wire message from a peer (or our own loopback).
    Wire(ConsensusMessage),
    /// Chain announced a new tip.
    RoundUpdate(RoundUpdate),
    /// The sequencer restarted the round at a later step.
    Regeneration(AsyncState),
    /// Absentee report for one reduction step.
    Absentees(AbsenteeReport),
}

impl Message {
    /// The topic this message is published under.
    pub fn topic(&self) -> Topic {
        match self {
            Message::Wire(msg) => msg.topic(),
            Message::RoundUpdate(_) => Topic::RoundUpdate,
            Message::Regeneration(_) => Topic::Regeneration,
            Message::Absentees(_) => Topic::Absentees,
        }
    }

    /// The round the message pertains to.
    pub fn round(&self) -> u64 {
        match self {
            Message::Wire(msg) => msg.header.round,
            Message::RoundUpdate(ru) => ru.round,
            Message::Regeneration(state) => state.round,
            Message::Absentees(report) => report.round,
        }
    }
}
