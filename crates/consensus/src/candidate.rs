//! Candidate broker storage.

use nocturne_types::{Block, CandidateBlock, Hash, Seed};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::trace;

/// Shared handle to the per-round candidate map.
///
/// The sequencer inserts candidates as they arrive; the Chain fetches the
/// certified one through the request bus after finalization.
pub type SharedCandidateStore = Arc<RwLock<CandidateStore>>;

/// Per-round storage of candidate blocks keyed by header hash.
///
/// Blocks and their score messages travel separately, linked by the
/// candidate hash; the store joins the two sides as they land.
#[derive(Debug, Default)]
pub struct CandidateStore {
    round: u64,
    candidates: HashMap<Hash, CandidateBlock>,
}

impl CandidateStore {
    /// An empty store at round 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared empty store.
    pub fn shared() -> SharedCandidateStore {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Drop the previous round's candidates and start collecting for `round`.
    pub fn start_round(&mut self, round: u64) {
        self.round = round;
        self.candidates.clear();
        trace!(round, "candidate store reset");
    }

    /// The round being collected.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Store a full candidate (block with score attached).
    pub fn insert(&mut self, candidate: CandidateBlock) {
        self.candidates.insert(candidate.hash(), candidate);
    }

    /// Store a bare block; keeps an already-attached score if the score
    /// message arrived first.
    pub fn insert_block(&mut self, block: Block) {
        let hash = block.hash();
        self.candidates
            .entry(hash)
            .and_modify(|existing| existing.block = block.clone())
            .or_insert_with(|| CandidateBlock {
                seed: block.header.seed,
                block,
                score: [0u8; 32],
                proof: Vec::new(),
            });
    }

    /// Attach the score side of a candidate once its score message lands.
    pub fn attach_score(&mut self, hash: &Hash, score: [u8; 32], proof: Vec<u8>, seed: Seed) {
        if let Some(candidate) = self.candidates.get_mut(hash) {
            candidate.score = score;
            candidate.proof = proof;
            candidate.seed = seed;
        }
    }

    /// Fetch a candidate by hash.
    pub fn get(&self, hash: &Hash) -> Option<&CandidateBlock> {
        self.candidates.get(hash)
    }

    /// Number of candidates held for this round.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// True if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
