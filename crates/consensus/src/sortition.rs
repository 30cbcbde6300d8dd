//! Deterministic cryptographic sortition.
//!
//! Maps (round, step, provisioner set) to a voting committee of at most
//! `max_size` slots. Slot `i` is won by the first provisioner, walking the
//! canonical (BLS key) ordering, whose cumulative active stake exceeds
//!
//! ```text
//! score_i = LE64(SHA3-256(round_LE8 || step || i)[..8]) mod W
//! ```
//!
//! so a provisioner with stake `s` wins each slot with probability `s / W`.
//! Identical inputs yield byte-identical committees on every node.

use nocturne_types::{BlsPublicKey, ProvisionerSet};
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from committee extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SortitionError {
    /// No active provisioners, or zero total stake.
    #[error("no committee can be extracted: no active stake")]
    NoCommittee,
}

/// The number of weighted slots required for quorum.
pub fn quorum(committee_slots: usize, fraction: f64) -> usize {
    (committee_slots as f64 * fraction).ceil() as usize
}

/// A committee for one (round, step): a multiset of provisioner keys.
///
/// The same provisioner may win several slots; that count is its vote
/// weight. Members are held in canonical key order, which fixes the bitset
/// slot assignment carried in step votes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingCommittee {
    members: Vec<(BlsPublicKey, usize)>,
    total_slots: usize,
}

impl VotingCommittee {
    /// Assemble a committee from explicit member weights.
    ///
    /// Zero-weight entries are dropped; members are re-ordered canonically.
    /// Sortition extraction is the normal path; this exists for harnesses
    /// that need exact weight control.
    pub fn from_members(members: impl IntoIterator<Item = (BlsPublicKey, usize)>) -> Self {
        let mut won: BTreeMap<BlsPublicKey, usize> = BTreeMap::new();
        for (key, weight) in members {
            if weight > 0 {
                *won.entry(key).or_insert(0) += weight;
            }
        }
        let total_slots = won.values().sum();
        Self {
            members: won.into_iter().collect(),
            total_slots,
        }
    }

    /// Number of distinct members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if the committee has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Total weighted slots (the committee size used for quorum).
    pub fn total_slots(&self) -> usize {
        self.total_slots
    }

    /// Whether `key` won at least one slot.
    pub fn is_member(&self, key: &BlsPublicKey) -> bool {
        self.index_of(key).is_some()
    }

    /// The vote weight of `key` (0 for non-members).
    pub fn weight(&self, key: &BlsPublicKey) -> usize {
        self.index_of(key).map_or(0, |i| self.members[i].1)
    }

    /// The bitset slot of `key` in canonical order.
    pub fn index_of(&self, key: &BlsPublicKey) -> Option<usize> {
        self.members
            .binary_search_by(|(member, _)| member.cmp(key))
            .ok()
    }

    /// The member at a bitset slot.
    pub fn member_at(&self, index: usize) -> Option<&BlsPublicKey> {
        self.members.get(index).map(|(key, _)| key)
    }

    /// Members with weights, in canonical order.
    pub fn members(&self) -> impl Iterator<Item = (&BlsPublicKey, usize)> {
        self.members.iter().map(|(key, weight)| (key, *weight))
    }
}

/// Extract the committee for (round, step).
///
/// The slot count is `min(active provisioners, max_size)`. Fails when no
/// stake is active at `round`.
pub fn deterministic_committee(
    round: u64,
    step: u8,
    provisioners: &ProvisionerSet,
    max_size: usize,
) -> Result<VotingCommittee, SortitionError> {
    let total_weight = provisioners.total_weight(round);
    let active = provisioners.active_count(round);
    if total_weight == 0 || active == 0 {
        return Err(SortitionError::NoCommittee);
    }

    let slots = active.min(max_size);
    let mut won: BTreeMap<BlsPublicKey, usize> = BTreeMap::new();

    for slot in 0..slots {
        let score = slot_score(round, step, slot as u8) % total_weight;

        let mut cumulative = 0u64;
        for provisioner in provisioners.active_at(round) {
            cumulative += provisioner.stake;
            if cumulative > score {
                *won.entry(provisioner.bls_public_key).or_insert(0) += 1;
                break;
            }
        }
    }

    Ok(VotingCommittee {
        members: won.into_iter().collect(),
        total_slots: slots,
    })
}

fn slot_score(round: u64, step: u8, slot: u8) -> u64 {
    let mut hasher = Sha3_256::new();
    hasher.update(round.to_le_bytes());
    hasher.update([step]);
    hasher.update([slot]);
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}
