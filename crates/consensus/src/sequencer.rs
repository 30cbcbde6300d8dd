//! The round sequencer.
//!
//! Drives one round through generation → selection → reduction ×2 →
//! agreement, restarting at a later step when reduction fails to converge
//! and stalling when the step ceiling is hit.
//!
//! ```text
//! Idle -- RoundUpdate(R) --> Generation(R, step=1)
//! Generation -- score won | timer --> Selection(R, step)
//! Selection -- decided(hash|∅) --> Reduction1(R, step+1)
//! Reduction1 -- quorum | timeout --> Reduction2(R, step+2)
//! Reduction2 -- matching quorum --> Agreement
//! Reduction2 -- empty | disagree --> Generation(R, step+2), timers ×2
//! Agreement -- finalized --> Idle
//! ```

use crate::agreement::{sign_agreement, AgreementAccumulator};
use crate::candidate::SharedCandidateStore;
use crate::committee::Extractor;
use crate::config::Config;
use crate::error::{ConsensusError, Severity};
use crate::generation::{BlindBidProver, ScoreGenerator, ScoreProposal};
use crate::reduction::{ReductionStep, StepOutcome};
use crate::selection::Selection;
use crate::sortition::VotingCommittee;
use nocturne_core::{
    AbsenteeReport, Action, Event, Message, RoundUpdate, StateMachine, TimerId,
};
use nocturne_messages::{
    AgreementPayload, CandidatePayload, ConsensusMessage, MessageHeader, Payload,
    ReductionPayload, ScorePayload,
};
use nocturne_types::{
    reduction_vote_message, AsyncState, BidList, Block, CandidateBlock, ConsensusKeys, Hash,
    ProvisionerSet, Seed, StepVotes,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Scores that can queue up while generation is still running.
const MAX_PENDING_SCORES: usize = 64;
/// Future-step votes buffered per step.
const MAX_PENDING_VOTES: usize = 256;

/// Where the sequencer currently is in the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for a round update.
    Idle,
    /// Generating our own score and candidate.
    Generation,
    /// Collecting score proposals.
    Selection,
    /// First reduction step.
    Reduction1,
    /// Second reduction step.
    Reduction2,
    /// Agreement gossiped; awaiting finalization.
    Agreement,
    /// Step ceiling hit or fatal error; awaiting external sync.
    Stalled,
}

/// The per-round consensus state machine.
pub struct Sequencer {
    keys: ConsensusKeys,
    config: Config,
    prover: Arc<dyn BlindBidProver>,
    generator: Option<ScoreGenerator>,
    extractor: Arc<Extractor>,
    candidates: SharedCandidateStore,

    phase: Phase,
    round: u64,
    /// Step the current generation/selection iteration runs at.
    gen_step: u8,
    /// Step the current phase runs at.
    step: u8,
    seed: Seed,
    tip_hash: Hash,
    provisioners: Arc<ProvisionerSet>,
    bid_list: Arc<BidList>,
    /// Timeout multiplier; doubles on failed iterations, capped, reset on
    /// finalization.
    multiplier: u32,
    /// Wall clock in milliseconds, set by the runner before each handle.
    now_ms: u64,

    own_score: Option<ScoreProposal>,
    selection: Option<Selection>,
    reduction: Option<ReductionStep>,
    first_step_votes: Option<StepVotes>,
    candidate_hash: Hash,
    agreement: Option<AgreementAccumulator>,

    pending_scores: Vec<(MessageHeader, ScorePayload)>,
    pending_votes: HashMap<u8, Vec<(MessageHeader, ReductionPayload)>>,
}

impl Sequencer {
    /// Build a sequencer.
    ///
    /// `bid_secrets` is the wallet's bid opening `(d, k)`; nodes without a
    /// bid run every phase except generation.
    pub fn new(
        keys: ConsensusKeys,
        config: Config,
        prover: Arc<dyn BlindBidProver>,
        bid_secrets: Option<([u8; 32], [u8; 32])>,
        extractor: Arc<Extractor>,
        candidates: SharedCandidateStore,
    ) -> Self {
        let generator = bid_secrets
            .map(|(d, k)| ScoreGenerator::new(d, k, config.bid_subset_cap));
        Self {
            keys,
            config,
            prover,
            generator,
            extractor,
            candidates,
            phase: Phase::Idle,
            round: 0,
            gen_step: 1,
            step: 1,
            seed: Seed::default(),
            tip_hash: Hash::EMPTY,
            provisioners: Arc::new(ProvisionerSet::new()),
            bid_list: Arc::new(BidList::new()),
            multiplier: 1,
            now_ms: 0,
            own_score: None,
            selection: None,
            reduction: None,
            first_step_votes: None,
            candidate_hash: Hash::EMPTY,
            agreement: None,
            pending_scores: Vec::new(),
            pending_votes: HashMap::new(),
        }
    }

    /// Update the wall clock. The runner calls this before each handle.
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current round.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Current step.
    pub fn step(&self) -> u8 {
        self.step
    }

    /// Current timeout multiplier.
    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Round lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    fn on_round_update(&mut self, update: RoundUpdate) -> Vec<Action> {
        if update.round <= self.round {
            trace!(
                round = update.round,
                current = self.round,
                "stale round update dropped"
            );
            return vec![];
        }

        info!(round = update.round, tip = ?update.tip_hash, "round update");

        self.round = update.round;
        self.gen_step = 1;
        self.step = 1;
        self.seed = update.seed;
        self.tip_hash = update.tip_hash;
        self.provisioners = update.provisioners;
        self.bid_list = update.bid_list;
        self.multiplier = 1;
        self.own_score = None;
        self.selection = None;
        self.reduction = None;
        self.first_step_votes = None;
        self.candidate_hash = Hash::EMPTY;
        self.pending_scores.clear();
        self.pending_votes.clear();

        self.extractor.evict_below(self.round);
        self.candidates
            .write()
            .expect("candidate store poisoned")
            .start_round(self.round);
        self.agreement = Some(AgreementAccumulator::new(
            self.round,
            Arc::clone(&self.provisioners),
            Arc::clone(&self.extractor),
            self.config.committee_size_reduction,
            self.config.committee_size_agreement,
            self.config.quorum_fraction,
        ));

        // A round with no extractable committee cannot run at all.
        if let Err(e) = self.extractor.committee(
            self.round,
            self.step,
            &self.provisioners,
            self.config.committee_size_reduction,
        ) {
            error!(round = self.round, error = %e, "no committee for round; consensus halted");
            self.phase = Phase::Stalled;
            return vec![];
        }

        self.begin_generation()
    }

    fn begin_generation(&mut self) -> Vec<Action> {
        self.phase = Phase::Generation;
        self.own_score = None;
        debug!(round = self.round, step = self.gen_step, "generation started");

        let mut actions = vec![Action::SetTimer {
            id: TimerId::Generation,
            duration: self.config.scaled_step_duration(self.multiplier),
        }];

        if let Some(generator) = &self.generator {
            match generator.generate(&*self.prover, &self.seed, &self.bid_list, self.round) {
                Ok(Some(proposal)) => {
                    debug!(round = self.round, "score generated, assembling candidate");
                    self.own_score = Some(proposal);
                    actions.push(Action::FetchMempoolTxs { round: self.round });
                }
                Ok(None) => {
                    trace!(round = self.round, "own bid not in the bid list; not generating");
                }
                Err(e) => {
                    error!(error = %e, "blind bid oracle unavailable; consensus halted");
                    self.phase = Phase::Stalled;
                    return vec![];
                }
            }
        }

        actions
    }

    fn on_mempool_fetched(&mut self, round: u64, txs: Vec<nocturne_types::Transaction>) -> Vec<Action> {
        if round != self.round || self.phase != Phase::Generation {
            trace!(round, "late mempool snapshot dropped");
            return vec![];
        }
        let Some(proposal) = self.own_score.clone() else {
            return vec![];
        };

        let block = Block::new(self.round, self.now_ms, self.tip_hash, self.seed, txs);
        let block_hash = block.hash();

        self.candidates
            .write()
            .expect("candidate store poisoned")
            .insert(CandidateBlock {
                block: block.clone(),
                score: proposal.score,
                proof: proposal.proof.clone(),
                seed: self.seed,
            });

        info!(
            round = self.round,
            step = self.gen_step,
            block_hash = ?block_hash,
            "gossiping candidate and score"
        );

        let score_msg = ConsensusMessage::sign(
            &self.keys.ed,
            self.round,
            self.gen_step,
            Payload::Score(ScorePayload {
                block_hash,
                score: proposal.score,
                proof: proposal.proof,
                seed: self.seed,
                bid_identity: proposal.bid_identity,
            }),
        );
        let candidate_msg = ConsensusMessage::sign(
            &self.keys.ed,
            self.round,
            self.gen_step,
            Payload::Candidate(CandidatePayload { block }),
        );

        // Score won locally: move straight to selection.
        let mut actions = vec![
            Action::Gossip(score_msg),
            Action::Gossip(candidate_msg),
            Action::CancelTimer {
                id: TimerId::Generation,
            },
        ];
        actions.extend(self.enter_selection());
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Selection
    // ═══════════════════════════════════════════════════════════════════════

    fn enter_selection(&mut self) -> Vec<Action> {
        let committee = match self.phase_committee(self.gen_step, self.config.committee_size_reduction)
        {
            Ok(committee) => committee,
            Err(actions) => return actions,
        };

        self.phase = Phase::Selection;
        self.step = self.gen_step;
        let mut selection = Selection::new(self.round, self.gen_step, committee);

        // Scores that arrived while we were still generating.
        for (header, payload) in self.pending_scores.drain(..) {
            if let Err(e) = selection.process_score(
                &header,
                &payload,
                &self.provisioners,
                &self.bid_list,
                &*self.prover,
            ) {
                log_rejected("selection", &e);
            }
        }
        self.selection = Some(selection);

        debug!(round = self.round, step = self.step, "selection started");
        vec![Action::SetTimer {
            id: TimerId::Selection,
            duration: self.config.scaled_selection_deadline(self.multiplier),
        }]
    }

    fn on_score(&mut self, header: MessageHeader, score: ScorePayload) -> Vec<Action> {
        if header.round != self.round {
            trace!(round = header.round, "score for another round dropped");
            return vec![];
        }
        match self.phase {
            Phase::Generation => {
                if self.pending_scores.len() < MAX_PENDING_SCORES {
                    self.pending_scores.push((header, score));
                }
            }
            Phase::Selection => {
                if let Some(selection) = &mut self.selection {
                    match selection.process_score(
                        &header,
                        &score,
                        &self.provisioners,
                        &self.bid_list,
                        &*self.prover,
                    ) {
                        Ok(()) => {
                            // Link the verified score to its candidate for
                            // later retrieval.
                            self.candidates
                                .write()
                                .expect("candidate store poisoned")
                                .attach_score(
                                    &score.block_hash,
                                    score.score,
                                    score.proof.clone(),
                                    score.seed,
                                );
                        }
                        Err(e) => log_rejected("selection", &e),
                    }
                }
            }
            _ => trace!(step = self.step, "score outside selection dropped"),
        }
        vec![]
    }

    fn on_candidate(&mut self, header: MessageHeader, candidate: CandidatePayload) -> Vec<Action> {
        if header.round != self.round {
            trace!(round = header.round, "candidate for another round dropped");
            return vec![];
        }
        let block = candidate.block;

        // The declared transaction root must match the body.
        let recomputed = Block::new(
            block.header.height,
            block.header.timestamp,
            block.header.prev_block_hash,
            block.header.seed,
            block.transactions.clone(),
        );
        if recomputed.header.tx_root != block.header.tx_root {
            warn!(block_hash = ?block.hash(), "candidate with forged tx root dropped");
            return vec![];
        }

        trace!(block_hash = ?block.hash(), "candidate stored");
        self.candidates
            .write()
            .expect("candidate store poisoned")
            .insert_block(block);
        vec![]
    }

    fn on_selection_timer(&mut self) -> Vec<Action> {
        if self.phase != Phase::Selection {
            return vec![];
        }
        let winner = self
            .selection
            .as_mut()
            .map_or(Hash::EMPTY, Selection::decide);
        self.candidate_hash = winner;
        self.enter_reduction(self.gen_step + 1)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reduction
    // ═══════════════════════════════════════════════════════════════════════

    fn enter_reduction(&mut self, step: u8) -> Vec<Action> {
        let committee = match self.phase_committee(step, self.config.committee_size_reduction) {
            Ok(committee) => committee,
            Err(actions) => return actions,
        };

        self.step = step;
        self.phase = if step == self.gen_step + 1 {
            Phase::Reduction1
        } else {
            Phase::Reduction2
        };

        debug!(
            round = self.round,
            step = self.step,
            target = ?self.candidate_hash,
            first = matches!(self.phase, Phase::Reduction1),
            "reduction step started"
        );

        self.reduction = Some(ReductionStep::new(
            self.round,
            self.step,
            Arc::clone(&committee),
            Arc::clone(&self.provisioners),
            self.config.quorum_fraction,
        ));

        let mut actions = vec![Action::SetTimer {
            id: TimerId::Reduction,
            duration: self.config.scaled_step_duration(self.multiplier),
        }];
        actions.extend(self.cast_reduction_vote(&committee, self.candidate_hash));

        // Votes that raced ahead of our own step transition.
        let buffered = self.pending_votes.remove(&self.step).unwrap_or_default();
        for (header, vote) in buffered {
            actions.extend(self.on_reduction_vote(header, vote));
        }
        actions
    }

    fn cast_reduction_vote(
        &self,
        committee: &VotingCommittee,
        target: Hash,
    ) -> Vec<Action> {
        if !committee.is_member(&self.keys.bls.public_key()) {
            trace!(round = self.round, step = self.step, "not in committee; not voting");
            return vec![];
        }
        let message = reduction_vote_message(self.round, self.step, &target);
        let payload = ReductionPayload {
            block_hash: target,
            signature: self.keys.bls.sign(&message),
            signer: self.keys.bls.public_key(),
        };
        debug!(round = self.round, step = self.step, target = ?target, "casting reduction vote");
        vec![Action::Gossip(ConsensusMessage::sign(
            &self.keys.ed,
            self.round,
            self.step,
            Payload::Reduction(payload),
        ))]
    }

    fn on_reduction_vote(
        &mut self,
        header: MessageHeader,
        vote: ReductionPayload,
    ) -> Vec<Action> {
        if header.round != self.round {
            trace!(round = header.round, "vote for another round dropped");
            return vec![];
        }

        let in_reduction = matches!(self.phase, Phase::Reduction1 | Phase::Reduction2);
        if !in_reduction || header.step != self.step {
            // Votes for steps we have not reached yet are kept for replay.
            if header.step > self.step {
                let queue = self.pending_votes.entry(header.step).or_default();
                if queue.len() < MAX_PENDING_VOTES {
                    queue.push((header, vote));
                }
            } else {
                trace!(step = header.step, "stale reduction vote dropped");
            }
            return vec![];
        }

        let Some(reduction) = &mut self.reduction else {
            return vec![];
        };
        match reduction.process_vote(&header.signer, &vote) {
            Ok(Some(step_votes)) => self.conclude_step(StepOutcome::Quorum(step_votes)),
            Ok(None) => vec![],
            Err(e) => {
                log_rejected("reduction", &e);
                vec![]
            }
        }
    }

    fn on_reduction_timer(&mut self) -> Vec<Action> {
        if !matches!(self.phase, Phase::Reduction1 | Phase::Reduction2) {
            return vec![];
        }
        if let Some(reduction) = &mut self.reduction {
            reduction.on_timeout();
        }
        self.conclude_step(StepOutcome::Timeout)
    }

    fn conclude_step(&mut self, outcome: StepOutcome) -> Vec<Action> {
        let absentees = self
            .reduction
            .as_ref()
            .map(ReductionStep::absentees)
            .unwrap_or_default();

        let mut actions = vec![
            Action::CancelTimer {
                id: TimerId::Reduction,
            },
            Action::Publish(Message::Absentees(AbsenteeReport {
                round: self.round,
                step: self.step,
                absentees,
            })),
        ];

        let hash = outcome.block_hash();
        match self.phase {
            Phase::Reduction1 => {
                self.first_step_votes = match &outcome {
                    StepOutcome::Quorum(votes) if !hash.is_empty() => Some(votes.clone()),
                    _ => None,
                };
                // An empty first step forces an empty second-step vote.
                self.candidate_hash = hash;
                actions.extend(self.enter_reduction(self.gen_step + 2));
                actions
            }
            Phase::Reduction2 => {
                let second_votes = match outcome {
                    StepOutcome::Quorum(votes) => Some(votes),
                    StepOutcome::Timeout => None,
                };
                let agreed = !hash.is_empty()
                    && self.first_step_votes.as_ref().map(|sv| sv.block_hash) == Some(hash);

                match (agreed, self.first_step_votes.take(), second_votes) {
                    (true, Some(first), Some(second)) => {
                        actions.extend(self.emit_agreement(hash, [first, second]));
                        actions
                    }
                    _ => {
                        actions.extend(self.restart_iteration());
                        actions
                    }
                }
            }
            _ => actions,
        }
    }

    fn restart_iteration(&mut self) -> Vec<Action> {
        let next_step = self.gen_step.saturating_add(2);
        if next_step > self.config.max_steps {
            warn!(
                round = self.round,
                step = self.step,
                "step ceiling reached; awaiting external sync"
            );
            self.phase = Phase::Stalled;
            return vec![
                Action::CancelTimer {
                    id: TimerId::Generation,
                },
                Action::CancelTimer {
                    id: TimerId::Selection,
                },
                Action::CancelTimer {
                    id: TimerId::Reduction,
                },
            ];
        }

        self.gen_step = next_step;
        self.step = next_step;
        self.multiplier = (self.multiplier * 2).min(self.config.max_timeout_multiplier);
        self.selection = None;
        self.reduction = None;
        self.first_step_votes = None;
        self.candidate_hash = Hash::EMPTY;
        self.pending_scores.clear();

        info!(
            round = self.round,
            step = self.gen_step,
            multiplier = self.multiplier,
            "round did not converge; regenerating"
        );

        let mut actions = vec![Action::Publish(Message::Regeneration(AsyncState {
            round: self.round,
            step: self.gen_step,
        }))];
        actions.extend(self.begin_generation());
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Agreement
    // ═══════════════════════════════════════════════════════════════════════

    fn emit_agreement(&mut self, hash: Hash, votes: [StepVotes; 2]) -> Vec<Action> {
        self.phase = Phase::Agreement;

        let committee = match self.extractor.committee(
            self.round,
            self.step,
            &self.provisioners,
            self.config.committee_size_agreement,
        ) {
            Ok(committee) => committee,
            Err(e) => {
                error!(error = %e, "agreement committee unavailable; consensus halted");
                self.phase = Phase::Stalled;
                return vec![];
            }
        };

        if !committee.is_member(&self.keys.bls.public_key()) {
            trace!(
                round = self.round,
                step = self.step,
                "not in agreement committee; awaiting peer attestations"
            );
            return vec![];
        }

        info!(
            round = self.round,
            step = self.step,
            block_hash = ?hash,
            "attesting agreement"
        );

        let agreement = sign_agreement(&self.keys.bls, self.round, self.step, hash, votes);
        vec![Action::Gossip(ConsensusMessage::sign(
            &self.keys.ed,
            self.round,
            self.step,
            Payload::Agreement(AgreementPayload { agreement }),
        ))]
    }

    fn on_agreement(&mut self, header: MessageHeader, payload: AgreementPayload) -> Vec<Action> {
        if matches!(self.phase, Phase::Idle | Phase::Stalled) {
            trace!("agreement outside an active round dropped");
            return vec![];
        }
        if header.round != self.round {
            trace!(round = header.round, "agreement for another round dropped");
            return vec![];
        }
        let Some(accumulator) = &mut self.agreement else {
            return vec![];
        };

        match accumulator.process(&header.signer, &payload.agreement) {
            Ok(Some(hash)) => self.finalize(hash),
            Ok(None) => vec![],
            Err(e) => {
                if e.severity() == Severity::Fatal {
                    error!(error = %e, "fatal error in agreement processing; consensus halted");
                    self.phase = Phase::Stalled;
                } else {
                    log_rejected("agreement", &e);
                }
                vec![]
            }
        }
    }

    fn finalize(&mut self, hash: Hash) -> Vec<Action> {
        info!(round = self.round, block_hash = ?hash, "round certified");
        self.phase = Phase::Idle;
        self.multiplier = 1;
        self.selection = None;
        self.reduction = None;
        self.first_step_votes = None;
        vec![
            Action::CancelTimer {
                id: TimerId::Generation,
            },
            Action::CancelTimer {
                id: TimerId::Selection,
            },
            Action::CancelTimer {
                id: TimerId::Reduction,
            },
            Action::AcceptBlock {
                round: self.round,
                block_hash: hash,
            },
        ]
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════

    /// Extract a committee or stall on sortition failure.
    fn phase_committee(
        &mut self,
        step: u8,
        max_size: usize,
    ) -> Result<Arc<VotingCommittee>, Vec<Action>> {
        match self
            .extractor
            .committee(self.round, step, &self.provisioners, max_size)
        {
            Ok(committee) => Ok(committee),
            Err(e) => {
                error!(round = self.round, step, error = %e, "committee extraction failed; consensus halted");
                self.phase = Phase::Stalled;
                Err(vec![])
            }
        }
    }
}

impl StateMachine for Sequencer {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        trace!(event = event.type_name(), phase = ?self.phase, "handling event");
        match event {
            Event::RoundUpdate(update) => self.on_round_update(update),
            Event::MempoolFetched { round, txs } => self.on_mempool_fetched(round, txs),
            Event::GenerationTimer => {
                if self.phase == Phase::Generation {
                    self.enter_selection()
                } else {
                    vec![]
                }
            }
            Event::ScoreReceived { header, score } => self.on_score(header, score),
            Event::CandidateReceived { header, candidate } => self.on_candidate(header, candidate),
            Event::SelectionTimer => self.on_selection_timer(),
            Event::ReductionReceived { header, vote } => self.on_reduction_vote(header, vote),
            Event::ReductionTimer => self.on_reduction_timer(),
            Event::AgreementReceived { header, agreement } => self.on_agreement(header, agreement),
            Event::Regeneration(state) => {
                // Informational; the restart already ran when this was published.
                trace!(round = state.round, step = state.step, "regeneration notice");
                vec![]
            }
        }
    }
}

fn log_rejected(context: &'static str, error: &ConsensusError) {
    match error.severity() {
        Severity::ProtocolViolation => {
            warn!(context, %error, "protocol violation; message dropped and sender reported")
        }
        Severity::Stale => trace!(context, %error, "stale message dropped"),
        Severity::Transient => debug!(context, %error, "transient failure; will retry next step"),
        Severity::Fatal => error!(context, %error, "fatal consensus error"),
    }
}
