//! Reduction step voting.
//!
//! One [`ReductionStep`] collects the binary votes of a single step. Votes
//! are weighted by sortition slots; a hash reaching ⌈0.75·committee⌉
//! weighted votes fixes the step's outcome and yields a [`StepVotes`]
//! aggregate. Votes for losing hashes are pruned from the aggregate.

use crate::error::ConsensusError;
use crate::sortition::{quorum, VotingCommittee};
use nocturne_messages::ReductionPayload;
use nocturne_types::{
    reduction_vote_message, BlsAggregate, BlsPublicKey, BlsSignature, EdPublicKey, Hash,
    ProvisionerSet, SignerBitfield, StepVotes,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// How a reduction step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A hash accumulated quorum.
    Quorum(StepVotes),
    /// The timer fired first; the step yields the empty hash.
    Timeout,
}

impl StepOutcome {
    /// The hash this outcome stands for.
    pub fn block_hash(&self) -> Hash {
        match self {
            StepOutcome::Quorum(votes) => votes.block_hash,
            StepOutcome::Timeout => Hash::EMPTY,
        }
    }
}

/// Vote accumulator for one (round, step).
pub struct ReductionStep {
    round: u64,
    step: u8,
    committee: Arc<VotingCommittee>,
    provisioners: Arc<ProvisionerSet>,
    quorum_fraction: f64,
    /// Envelope-level duplicate guard.
    voters_ed: HashSet<EdPublicKey>,
    /// Committee members whose vote was counted (for absentee detection).
    voters_bls: HashSet<BlsPublicKey>,
    /// Weighted tally per hash.
    counts: HashMap<Hash, usize>,
    /// Raw votes per hash, kept until the winner is known.
    votes: HashMap<Hash, Vec<(BlsPublicKey, BlsSignature)>>,
    outcome: Option<StepOutcome>,
}

impl ReductionStep {
    /// Start a step over its sortition committee.
    pub fn new(
        round: u64,
        step: u8,
        committee: Arc<VotingCommittee>,
        provisioners: Arc<ProvisionerSet>,
        quorum_fraction: f64,
    ) -> Self {
        Self {
            round,
            step,
            committee,
            provisioners,
            quorum_fraction,
            voters_ed: HashSet::new(),
            voters_bls: HashSet::new(),
            counts: HashMap::new(),
            votes: HashMap::new(),
            outcome: None,
        }
    }

    /// The step index.
    pub fn step(&self) -> u8 {
        self.step
    }

    /// The weighted quorum threshold for this committee.
    pub fn quorum(&self) -> usize {
        quorum(self.committee.total_slots(), self.quorum_fraction)
    }

    /// The step's outcome, once fixed.
    pub fn outcome(&self) -> Option<&StepOutcome> {
        self.outcome.as_ref()
    }

    /// Process one reduction vote.
    ///
    /// On quorum the outcome is fixed and the built [`StepVotes`] returned;
    /// later votes are stale. The quorum check is monotonic: once a hash
    /// wins, no further message can change the outcome.
    #[instrument(skip(self, payload), fields(round = self.round, step = self.step, voter = ?payload.signer))]
    pub fn process_vote(
        &mut self,
        sender: &EdPublicKey,
        payload: &ReductionPayload,
    ) -> Result<Option<StepVotes>, ConsensusError> {
        if self.outcome.is_some() {
            return Err(ConsensusError::AlreadyDecided);
        }

        // One vote per envelope signer per step.
        if self.voters_ed.contains(sender) {
            return Err(ConsensusError::DuplicateVote);
        }

        // The envelope signer must be a provisioner, and the vote's BLS key
        // must be that provisioner's: a relayed third-party signature does
        // not count for the relayer.
        let provisioner = self
            .provisioners
            .get_by_ed_key(sender)
            .ok_or(ConsensusError::UnknownProvisioner)?;
        if provisioner.bls_public_key != payload.signer {
            return Err(ConsensusError::KeyMismatch);
        }

        let weight = self.committee.weight(&payload.signer);
        if weight == 0 {
            return Err(ConsensusError::NotCommitteeMember {
                round: self.round,
                step: self.step,
            });
        }

        let message = reduction_vote_message(self.round, self.step, &payload.block_hash);
        payload.signer.verify(&message, &payload.signature)?;

        self.voters_ed.insert(*sender);
        self.voters_bls.insert(payload.signer);
        self.votes
            .entry(payload.block_hash)
            .or_default()
            .push((payload.signer, payload.signature));

        let tally = self.counts.entry(payload.block_hash).or_insert(0);
        *tally += weight;
        let tally = *tally;

        trace!(
            block_hash = ?payload.block_hash,
            tally,
            quorum = self.quorum(),
            "vote counted"
        );

        if tally >= self.quorum() {
            let step_votes = self.build_step_votes(payload.block_hash)?;
            debug!(
                block_hash = ?payload.block_hash,
                weight = step_votes.weight(),
                "reduction step reached quorum"
            );
            self.outcome = Some(StepOutcome::Quorum(step_votes.clone()));
            return Ok(Some(step_votes));
        }

        Ok(None)
    }

    /// Fix the outcome as a timeout. Later votes are stale.
    pub fn on_timeout(&mut self) {
        if self.outcome.is_none() {
            debug!(round = self.round, step = self.step, "reduction step timed out");
            self.outcome = Some(StepOutcome::Timeout);
        }
    }

    /// Committee members whose vote never arrived.
    pub fn absentees(&self) -> Vec<BlsPublicKey> {
        self.committee
            .members()
            .filter(|(key, _)| !self.voters_bls.contains(key))
            .map(|(key, _)| *key)
            .collect()
    }

    /// Aggregate the votes for `winner`, pruning all others.
    fn build_step_votes(&mut self, winner: Hash) -> Result<StepVotes, ConsensusError> {
        let winners = self.votes.remove(&winner).unwrap_or_default();
        // Votes for losing hashes do not survive the step.
        self.votes.clear();

        let mut bitset = SignerBitfield::new(self.committee.total_slots().max(self.committee.len()));
        let mut aggregate = BlsAggregate::new();
        for (key, signature) in &winners {
            aggregate.add(signature)?;
            if let Some(index) = self.committee.index_of(key) {
                bitset.set(index);
            }
        }

        let agg_signature = aggregate
            .signature()
            .ok_or(nocturne_types::SignatureError::Aggregation)?;

        Ok(StepVotes {
            block_hash: winner,
            step: self.step,
            agg_signature,
            bitset,
        })
    }
}

impl std::fmt::Debug for ReductionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReductionStep")
            .field("round", &self.round)
            .field("step", &self.step)
            .field("committee_slots", &self.committee.total_slots())
            .field("votes", &self.voters_ed.len())
            .field("decided", &self.outcome.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nocturne_types::{BlsKeyPair, ConsensusKeys, Provisioner};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct Fixture {
        keys: Vec<ConsensusKeys>,
        provisioners: Arc<ProvisionerSet>,
        committee: Arc<VotingCommittee>,
    }

    fn fixture(n: usize) -> Fixture {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let keys: Vec<ConsensusKeys> = (0..n).map(|_| ConsensusKeys::generate(&mut rng)).collect();
        let provisioners: Arc<ProvisionerSet> = Arc::new(
            keys.iter()
                .map(|k| Provisioner {
                    bls_public_key: k.bls.public_key(),
                    ed_public_key: k.ed.public_key(),
                    stake: 1_000,
                    start_round: 0,
                    end_round: u64::MAX,
                })
                .collect(),
        );
        // One slot per member keeps the weight arithmetic exact.
        let committee = Arc::new(VotingCommittee::from_members(
            keys.iter().map(|k| (k.bls.public_key(), 1)),
        ));
        Fixture {
            keys,
            provisioners,
            committee,
        }
    }

    fn vote(keys: &ConsensusKeys, round: u64, step: u8, hash: Hash) -> ReductionPayload {
        let message = reduction_vote_message(round, step, &hash);
        ReductionPayload {
            block_hash: hash,
            signature: keys.bls.sign(&message),
            signer: keys.bls.public_key(),
        }
    }

    #[test]
    fn quorum_fixes_the_outcome() {
        let f = fixture(4);
        let mut step = ReductionStep::new(
            1,
            2,
            Arc::clone(&f.committee),
            Arc::clone(&f.provisioners),
            0.75,
        );
        let hash = Hash::digest(b"winner");
        assert_eq!(step.quorum(), 3);

        let mut result = None;
        for keys in &f.keys[..3] {
            result = step
                .process_vote(&keys.ed.public_key(), &vote(keys, 1, 2, hash))
                .unwrap();
        }

        let step_votes = result.expect("third vote reaches quorum");
        assert_eq!(step_votes.block_hash, hash);
        assert_eq!(step_votes.weight(), 3);
        assert!(matches!(step.outcome(), Some(StepOutcome::Quorum(_))));

        // The aggregate verifies against the bitset's members.
        let signers: Vec<BlsPublicKey> = step_votes
            .bitset
            .iter_set()
            .filter_map(|i| f.committee.member_at(i).copied())
            .collect();
        let message = reduction_vote_message(1, 2, &hash);
        assert!(step_votes
            .agg_signature
            .verify_aggregate(&message, &signers)
            .is_ok());
    }

    #[test]
    fn outcome_is_monotonic_after_quorum() {
        let f = fixture(4);
        let mut step = ReductionStep::new(
            1,
            2,
            Arc::clone(&f.committee),
            Arc::clone(&f.provisioners),
            0.75,
        );
        let winner = Hash::digest(b"winner");
        for keys in &f.keys[..3] {
            step.process_vote(&keys.ed.public_key(), &vote(keys, 1, 2, winner))
                .unwrap();
        }

        // A late vote for a different hash is stale and changes nothing.
        let late = &f.keys[3];
        let err = step
            .process_vote(
                &late.ed.public_key(),
                &vote(late, 1, 2, Hash::digest(b"other")),
            )
            .unwrap_err();
        assert_eq!(err, ConsensusError::AlreadyDecided);
        assert_eq!(step.outcome().unwrap().block_hash(), winner);
    }

    #[test]
    fn duplicate_signer_counts_once() {
        let f = fixture(4);
        let mut step = ReductionStep::new(
            1,
            2,
            Arc::clone(&f.committee),
            Arc::clone(&f.provisioners),
            0.75,
        );
        let hash = Hash::digest(b"winner");
        let keys = &f.keys[0];

        step.process_vote(&keys.ed.public_key(), &vote(keys, 1, 2, hash))
            .unwrap();
        let err = step
            .process_vote(&keys.ed.public_key(), &vote(keys, 1, 2, hash))
            .unwrap_err();
        assert_eq!(err, ConsensusError::DuplicateVote);
    }

    #[test]
    fn non_member_bls_key_is_rejected() {
        let f = fixture(4);
        let mut step = ReductionStep::new(
            1,
            2,
            Arc::clone(&f.committee),
            Arc::clone(&f.provisioners),
            0.75,
        );
        let hash = Hash::digest(b"winner");

        // Valid BLS signature, but from a keypair outside the committee,
        // smuggled under a legitimate provisioner's envelope.
        let outsider = BlsKeyPair::generate(&mut ChaCha8Rng::seed_from_u64(1234));
        let message = reduction_vote_message(1, 2, &hash);
        let payload = ReductionPayload {
            block_hash: hash,
            signature: outsider.sign(&message),
            signer: outsider.public_key(),
        };

        let err = step
            .process_vote(&f.keys[0].ed.public_key(), &payload)
            .unwrap_err();
        assert_eq!(err, ConsensusError::KeyMismatch);

        // And an envelope key nobody staked is unknown outright.
        let err = step
            .process_vote(&EdPublicKey::from_bytes([0xee; 32]), &payload)
            .unwrap_err();
        assert_eq!(err, ConsensusError::UnknownProvisioner);
    }

    #[test]
    fn bad_signature_is_rejected() {
        let f = fixture(4);
        let mut step = ReductionStep::new(
            1,
            2,
            Arc::clone(&f.committee),
            Arc::clone(&f.provisioners),
            0.75,
        );
        let keys = &f.keys[0];

        // Signature over the wrong step.
        let payload = vote(keys, 1, 3, Hash::digest(b"winner"));
        let err = step
            .process_vote(&keys.ed.public_key(), &payload)
            .unwrap_err();
        assert!(matches!(err, ConsensusError::Signature(_)));
        assert!(step.absentees().contains(&keys.bls.public_key()));
    }

    #[test]
    fn timeout_yields_empty_hash_and_absentees() {
        let f = fixture(4);
        let mut step = ReductionStep::new(
            1,
            2,
            Arc::clone(&f.committee),
            Arc::clone(&f.provisioners),
            0.75,
        );
        let keys = &f.keys[0];
        step.process_vote(&keys.ed.public_key(), &vote(keys, 1, 2, Hash::digest(b"h")))
            .unwrap();

        step.on_timeout();
        assert_eq!(step.outcome().unwrap().block_hash(), Hash::EMPTY);

        let absentees = step.absentees();
        assert_eq!(absentees.len(), f.committee.len() - 1);
        assert!(!absentees.contains(&keys.bls.public_key()));
    }

    #[test]
    fn losing_votes_are_pruned_from_the_aggregate() {
        let f = fixture(4);
        let mut step = ReductionStep::new(
            1,
            2,
            Arc::clone(&f.committee),
            Arc::clone(&f.provisioners),
            0.75,
        );
        let winner = Hash::digest(b"winner");
        let loser = Hash::digest(b"loser");

        step.process_vote(&f.keys[3].ed.public_key(), &vote(&f.keys[3], 1, 2, loser))
            .unwrap();
        let mut result = None;
        for keys in &f.keys[..3] {
            result = step
                .process_vote(&keys.ed.public_key(), &vote(keys, 1, 2, winner))
                .unwrap();
        }

        let step_votes = result.unwrap();
        assert_eq!(step_votes.weight(), 3);
        let loser_index = f.committee.index_of(&f.keys[3].bls.public_key()).unwrap();
        assert!(!step_votes.bitset.is_set(loser_index));
    }
}
