//! Agreement accumulation and finalization.
//!
//! After both reduction steps land on the same non-empty hash, each witness
//! signs an agreement over the pair of step-vote aggregates and gossips it.
//! The accumulator verifies inbound agreements end to end — signer
//! eligibility, attestation signature, and both embedded quorum proofs —
//! and finalizes the round once agreement-committee quorum is reached.

use crate::committee::Extractor;
use crate::error::ConsensusError;
use crate::sortition::quorum;
use nocturne_types::{
    agreement_message, reduction_vote_message, Agreement, BlsKeyPair, BlsPublicKey, EdPublicKey,
    Hash, ProvisionerSet, StepVotes,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Build and BLS-sign an agreement for a certified hash.
pub fn sign_agreement(
    bls: &BlsKeyPair,
    round: u64,
    step: u8,
    block_hash: Hash,
    votes: [StepVotes; 2],
) -> Agreement {
    let message = agreement_message(round, step, &block_hash, &votes);
    Agreement {
        round,
        step,
        block_hash,
        votes,
        signer: bls.public_key(),
        signature: bls.sign(&message),
    }
}

/// Collects agreement attestations for one round.
///
/// Agreements may arrive tagged with different steps (peers restart at
/// different points), so tallies are grouped by (step, hash); quorum is
/// judged against the agreement committee of the attested step.
pub struct AgreementAccumulator {
    round: u64,
    provisioners: Arc<ProvisionerSet>,
    extractor: Arc<Extractor>,
    reduction_cap: usize,
    agreement_cap: usize,
    quorum_fraction: f64,
    seen: HashSet<(u8, BlsPublicKey)>,
    weights: HashMap<(u8, Hash), usize>,
    finalized: Option<Hash>,
}

impl AgreementAccumulator {
    /// An empty accumulator for `round`.
    pub fn new(
        round: u64,
        provisioners: Arc<ProvisionerSet>,
        extractor: Arc<Extractor>,
        reduction_cap: usize,
        agreement_cap: usize,
        quorum_fraction: f64,
    ) -> Self {
        Self {
            round,
            provisioners,
            extractor,
            reduction_cap,
            agreement_cap,
            quorum_fraction,
            seen: HashSet::new(),
            weights: HashMap::new(),
            finalized: None,
        }
    }

    /// The certified hash, once the round finalized.
    pub fn finalized(&self) -> Option<Hash> {
        self.finalized
    }

    /// Process one agreement attestation.
    ///
    /// Returns the certified hash when this attestation completes quorum.
    #[instrument(skip(self, agreement), fields(
        round = self.round,
        step = agreement.step,
        signer = ?agreement.signer
    ))]
    pub fn process(
        &mut self,
        sender: &EdPublicKey,
        agreement: &Agreement,
    ) -> Result<Option<Hash>, ConsensusError> {
        if self.finalized.is_some() {
            return Err(ConsensusError::AlreadyDecided);
        }
        if agreement.round != self.round {
            return Err(ConsensusError::Stale {
                round: agreement.round,
                step: agreement.step,
            });
        }
        if agreement.block_hash.is_empty() {
            return Err(ConsensusError::EmptyAgreementHash);
        }

        // Envelope sender must be the provisioner whose BLS key attests.
        let provisioner = self
            .provisioners
            .get_by_ed_key(sender)
            .ok_or(ConsensusError::UnknownProvisioner)?;
        if provisioner.bls_public_key != agreement.signer {
            return Err(ConsensusError::KeyMismatch);
        }

        // One attestation per signer per step.
        if self.seen.contains(&(agreement.step, agreement.signer)) {
            return Err(ConsensusError::DuplicateVote);
        }

        let committee = self.extractor.committee(
            self.round,
            agreement.step,
            &self.provisioners,
            self.agreement_cap,
        )?;
        let weight = committee.weight(&agreement.signer);
        if weight == 0 {
            return Err(ConsensusError::NotCommitteeMember {
                round: self.round,
                step: agreement.step,
            });
        }

        agreement
            .signer
            .verify(&agreement.signable(), &agreement.signature)?;

        for step_votes in &agreement.votes {
            self.verify_step_votes(agreement.block_hash, step_votes)?;
        }

        self.seen.insert((agreement.step, agreement.signer));
        let tally = self
            .weights
            .entry((agreement.step, agreement.block_hash))
            .or_insert(0);
        *tally += weight;
        let tally = *tally;
        let threshold = quorum(committee.total_slots(), self.quorum_fraction);

        debug!(
            block_hash = ?agreement.block_hash,
            tally,
            threshold,
            "agreement counted"
        );

        if tally >= threshold {
            info!(
                round = self.round,
                step = agreement.step,
                block_hash = ?agreement.block_hash,
                "round finalized"
            );
            self.finalized = Some(agreement.block_hash);
            return Ok(Some(agreement.block_hash));
        }

        Ok(None)
    }

    /// Check one embedded quorum proof: the bitset must cover a weighted
    /// quorum of the step's reduction committee and the aggregate must
    /// verify against exactly the set members.
    fn verify_step_votes(
        &self,
        block_hash: Hash,
        step_votes: &StepVotes,
    ) -> Result<(), ConsensusError> {
        let committee = self.extractor.committee(
            self.round,
            step_votes.step,
            &self.provisioners,
            self.reduction_cap,
        )?;

        let mut signers = Vec::with_capacity(step_votes.bitset.count());
        let mut weight = 0usize;
        for index in step_votes.bitset.iter_set() {
            let member = committee
                .member_at(index)
                .ok_or(ConsensusError::StepVotesBelowQuorum {
                    step: step_votes.step,
                })?;
            weight += committee.weight(member);
            signers.push(*member);
        }

        if weight < quorum(committee.total_slots(), self.quorum_fraction) {
            return Err(ConsensusError::StepVotesBelowQuorum {
                step: step_votes.step,
            });
        }

        let message = reduction_vote_message(self.round, step_votes.step, &block_hash);
        step_votes
            .agg_signature
            .verify_aggregate(&message, &signers)?;
        Ok(())
    }
}

impl std::fmt::Debug for AgreementAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgreementAccumulator")
            .field("round", &self.round)
            .field("attestations", &self.seen.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nocturne_types::{BlsAggregate, ConsensusKeys, Provisioner, SignerBitfield};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const ROUND: u64 = 5;
    const STEP: u8 = 3;

    struct Fixture {
        keys: Vec<ConsensusKeys>,
        provisioners: Arc<ProvisionerSet>,
        extractor: Arc<Extractor>,
    }

    fn fixture(n: usize) -> Fixture {
        let mut rng = ChaCha8Rng::seed_from_u64(41);
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
        Fixture {
            keys,
            provisioners,
            extractor: Arc::new(Extractor::new()),
        }
    }

    impl Fixture {
        fn accumulator(&self) -> AgreementAccumulator {
            AgreementAccumulator::new(
                ROUND,
                Arc::clone(&self.provisioners),
                Arc::clone(&self.extractor),
                50,
                64,
                0.75,
            )
        }

        /// Step votes where every reduction committee member signed.
        fn full_step_votes(&self, step: u8, block_hash: Hash) -> StepVotes {
            let committee = self
                .extractor
                .committee(ROUND, step, &self.provisioners, 50)
                .unwrap();
            let message = reduction_vote_message(ROUND, step, &block_hash);

            let mut bitset = SignerBitfield::new(committee.total_slots().max(committee.len()));
            let mut aggregate = BlsAggregate::new();
            for keys in &self.keys {
                let public = keys.bls.public_key();
                if let Some(index) = committee.index_of(&public) {
                    aggregate.add(&keys.bls.sign(&message)).unwrap();
                    bitset.set(index);
                }
            }
            StepVotes {
                block_hash,
                step,
                agg_signature: aggregate.signature().unwrap(),
                bitset,
            }
        }

        fn agreement_from(&self, keys: &ConsensusKeys, block_hash: Hash) -> Agreement {
            let votes = [
                self.full_step_votes(STEP - 1, block_hash),
                self.full_step_votes(STEP, block_hash),
            ];
            sign_agreement(&keys.bls, ROUND, STEP, block_hash, votes)
        }
    }

    #[test]
    fn quorum_of_attestations_finalizes() {
        let f = fixture(4);
        let mut acc = f.accumulator();
        let hash = Hash::digest(b"certified");

        let committee = f
            .extractor
            .committee(ROUND, STEP, &f.provisioners, 64)
            .unwrap();
        let threshold = quorum(committee.total_slots(), 0.75);

        let mut tally = 0usize;
        let mut finalized = None;
        for keys in &f.keys {
            let weight = committee.weight(&keys.bls.public_key());
            if weight == 0 {
                continue;
            }
            let agreement = f.agreement_from(keys, hash);
            finalized = acc.process(&keys.ed.public_key(), &agreement).unwrap();
            tally += weight;
            if tally >= threshold {
                break;
            }
            assert!(finalized.is_none(), "finalized before quorum");
        }

        assert_eq!(finalized, Some(hash));
        assert_eq!(acc.finalized(), Some(hash));
    }

    #[test]
    fn duplicate_attestation_is_rejected() {
        let f = fixture(8);
        let mut acc = f.accumulator();
        let hash = Hash::digest(b"certified");

        let committee = f
            .extractor
            .committee(ROUND, STEP, &f.provisioners, 64)
            .unwrap();
        let member = f
            .keys
            .iter()
            .find(|k| committee.weight(&k.bls.public_key()) > 0)
            .unwrap();

        let agreement = f.agreement_from(member, hash);
        acc.process(&member.ed.public_key(), &agreement).unwrap();
        let err = acc
            .process(&member.ed.public_key(), &agreement)
            .unwrap_err();
        assert_eq!(err, ConsensusError::DuplicateVote);
    }

    #[test]
    fn below_quorum_step_votes_are_rejected() {
        let f = fixture(8);
        let mut acc = f.accumulator();
        let hash = Hash::digest(b"certified");

        let committee = f
            .extractor
            .committee(ROUND, STEP, &f.provisioners, 64)
            .unwrap();
        let member = f
            .keys
            .iter()
            .find(|k| committee.weight(&k.bls.public_key()) > 0)
            .unwrap();

        // First step votes name no signers at all: zero weight, below any
        // quorum, rejected before the aggregate is even parsed.
        let reduction_committee = f
            .extractor
            .committee(ROUND, STEP - 1, &f.provisioners, 50)
            .unwrap();
        let message = reduction_vote_message(ROUND, STEP - 1, &hash);
        let weak = StepVotes {
            block_hash: hash,
            step: STEP - 1,
            agg_signature: f.keys[0].bls.sign(&message),
            bitset: SignerBitfield::new(reduction_committee.total_slots()),
        };

        let votes = [weak, f.full_step_votes(STEP, hash)];
        let agreement = sign_agreement(&member.bls, ROUND, STEP, hash, votes);
        let err = acc.process(&member.ed.public_key(), &agreement).unwrap_err();
        assert_eq!(
            err,
            ConsensusError::StepVotesBelowQuorum { step: STEP - 1 }
        );
    }

    #[test]
    fn non_member_attestation_is_rejected() {
        let f = fixture(4);
        let mut acc = f.accumulator();
        let hash = Hash::digest(b"certified");

        // A provisioner exists but holds no agreement-committee slot only if
        // sortition skipped it; force the case with an outsider instead.
        let outsider = ConsensusKeys::generate(&mut ChaCha8Rng::seed_from_u64(77));
        let agreement = f.agreement_from(&outsider, hash);
        let err = acc
            .process(&outsider.ed.public_key(), &agreement)
            .unwrap_err();
        assert_eq!(err, ConsensusError::UnknownProvisioner);
    }

    #[test]
    fn empty_hash_agreement_is_rejected() {
        let f = fixture(4);
        let mut acc = f.accumulator();
        let member = &f.keys[0];
        let agreement = sign_agreement(
            &member.bls,
            ROUND,
            STEP,
            Hash::EMPTY,
            [StepVotes::default(), StepVotes::default()],
        );
        let err = acc.process(&member.ed.public_key(), &agreement).unwrap_err();
        assert_eq!(err, ConsensusError::EmptyAgreementHash);
    }

    #[test]
    fn wrong_round_is_stale() {
        let f = fixture(4);
        let mut acc = f.accumulator();
        let member = &f.keys[0];
        let hash = Hash::digest(b"certified");
        let mut agreement = f.agreement_from(member, hash);
        agreement.round = ROUND + 1;
        let err = acc.process(&member.ed.public_key(), &agreement).unwrap_err();
        assert!(matches!(err, ConsensusError::Stale { .. }));
    }
}
