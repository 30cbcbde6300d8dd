//! Blind-bid score and proof generation.
//!
//! The prover is a cryptographic oracle with a fixed interface; consensus
//! derives the score values and decides eligibility, the oracle produces
//! and checks the proof bytes.
//!
//! Derived values (all SHA3-256):
//!
//! ```text
//! M = H(k)            commitment to the bid secret
//! X = H(d || k)       bid identity, must appear in the bid list
//! Y = H(d || S || k)  score, ordered as a big-endian integer
//! ```

use nocturne_types::{Bid, BidList, Hash, Seed};
use thiserror::Error;

/// Errors from the blind-bid oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProverError {
    /// The oracle could not produce a proof.
    #[error("prover failed: {0}")]
    ProofGeneration(String),
}

/// The blind-bid proving oracle.
///
/// `prove` binds `(d, k, seed, bid subset)` into an opaque proof; `verify`
/// checks a proof against the public values that travel in a score message.
pub trait BlindBidProver: Send + Sync {
    /// Produce a proof for the node's own bid.
    fn prove(
        &self,
        d: &[u8; 32],
        k: &[u8; 32],
        seed: &Seed,
        bids: &[Bid],
    ) -> Result<Vec<u8>, ProverError>;

    /// Check a peer's proof against the published score values.
    fn verify(&self, proof: &[u8], seed: &Seed, score: &[u8; 32], bid_identity: &[u8; 32])
        -> bool;
}

/// A deterministic stand-in oracle for tests and local networks.
///
/// The "proof" is a digest over the public inputs, so `verify` accepts
/// exactly what `prove` produced for the same values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockProver;

impl MockProver {
    fn transcript(seed: &Seed, score: &[u8; 32], bid_identity: &[u8; 32]) -> Vec<u8> {
        Hash::digest_all(&[b"blind-bid-proof", seed.as_bytes(), score, bid_identity])
            .as_bytes()
            .to_vec()
    }
}

impl BlindBidProver for MockProver {
    fn prove(
        &self,
        d: &[u8; 32],
        k: &[u8; 32],
        seed: &Seed,
        _bids: &[Bid],
    ) -> Result<Vec<u8>, ProverError> {
        let score = score_value(d, k, seed);
        let identity = bid_identity(d, k);
        Ok(Self::transcript(seed, &score, &identity))
    }

    fn verify(
        &self,
        proof: &[u8],
        seed: &Seed,
        score: &[u8; 32],
        bid_identity: &[u8; 32],
    ) -> bool {
        proof == Self::transcript(seed, score, bid_identity).as_slice()
    }
}

/// `M = H(k)`.
pub fn bid_commitment(k: &[u8; 32]) -> [u8; 32] {
    *Hash::digest(k).as_bytes()
}

/// `X = H(d || k)`.
pub fn bid_identity(d: &[u8; 32], k: &[u8; 32]) -> [u8; 32] {
    *Hash::digest_all(&[d, k]).as_bytes()
}

/// `Y = H(d || S || k)`.
pub fn score_value(d: &[u8; 32], k: &[u8; 32], seed: &Seed) -> [u8; 32] {
    *Hash::digest_all(&[d, seed.as_bytes(), k]).as_bytes()
}

/// A generated score ready to gossip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreProposal {
    /// The score `Y`.
    pub score: [u8; 32],
    /// Proof bytes from the oracle.
    pub proof: Vec<u8>,
    /// The bid identity `X`.
    pub bid_identity: [u8; 32],
}

/// Produces score proposals for the node's own bid.
pub struct ScoreGenerator {
    d: [u8; 32],
    k: [u8; 32],
    bid_subset_cap: usize,
}

impl ScoreGenerator {
    /// A generator over the bid opening `(d, k)`.
    pub fn new(d: [u8; 32], k: [u8; 32], bid_subset_cap: usize) -> Self {
        Self {
            d,
            k,
            bid_subset_cap,
        }
    }

    /// `X = H(d || k)` for this generator.
    pub fn bid_identity(&self) -> [u8; 32] {
        bid_identity(&self.d, &self.k)
    }

    /// `M = H(k)` for this generator.
    pub fn commitment(&self) -> [u8; 32] {
        bid_commitment(&self.k)
    }

    /// Generate a score for `seed`, or `None` when the generator's bid is
    /// absent from the bid list (or expired) at `round`.
    pub fn generate(
        &self,
        prover: &dyn BlindBidProver,
        seed: &Seed,
        bid_list: &BidList,
        round: u64,
    ) -> Result<Option<ScoreProposal>, ProverError> {
        let identity = self.bid_identity();
        if !bid_list.contains(&identity, round) {
            return Ok(None);
        }

        let subset = bid_list.subset_including(&identity, self.bid_subset_cap, round);
        let proof = prover.prove(&self.d, &self.k, seed, &subset)?;
        Ok(Some(ScoreProposal {
            score: score_value(&self.d, &self.k, seed),
            proof,
            bid_identity: identity,
        }))
    }
}

impl std::fmt::Debug for ScoreGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreGenerator")
            .field("bid_identity", &Hash::new(self.bid_identity()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid_list_with(x: [u8; 32]) -> BidList {
        let mut list = BidList::new();
        list.push(Bid {
            x: [0xaa; 32],
            end_round: u64::MAX,
        });
        list.push(Bid {
            x,
            end_round: u64::MAX,
        });
        list
    }

    #[test]
    fn generates_when_bid_is_listed() {
        let generator = ScoreGenerator::new([1; 32], [2; 32], 10);
        let list = bid_list_with(generator.bid_identity());
        let seed = Seed::default().next(1);

        let proposal = generator
            .generate(&MockProver, &seed, &list, 1)
            .unwrap()
            .expect("bid is listed");
        assert_eq!(proposal.bid_identity, generator.bid_identity());
        assert!(MockProver.verify(
            &proposal.proof,
            &seed,
            &proposal.score,
            &proposal.bid_identity
        ));
    }

    #[test]
    fn skips_when_bid_is_absent() {
        let generator = ScoreGenerator::new([1; 32], [2; 32], 10);
        let list = bid_list_with([0xbb; 32]);
        let seed = Seed::default().next(1);
        assert!(generator
            .generate(&MockProver, &seed, &list, 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn skips_when_bid_is_expired() {
        let generator = ScoreGenerator::new([1; 32], [2; 32], 10);
        let mut list = BidList::new();
        list.push(Bid {
            x: generator.bid_identity(),
            end_round: 5,
        });
        let seed = Seed::default().next(10);
        assert!(generator
            .generate(&MockProver, &seed, &list, 10)
            .unwrap()
            .is_none());
    }

    #[test]
    fn score_depends_on_seed() {
        let generator = ScoreGenerator::new([1; 32], [2; 32], 10);
        let list = bid_list_with(generator.bid_identity());
        let a = generator
            .generate(&MockProver, &Seed::default().next(1), &list, 1)
            .unwrap()
            .unwrap();
        let b = generator
            .generate(&MockProver, &Seed::default().next(2), &list, 1)
            .unwrap()
            .unwrap();
        assert_ne!(a.score, b.score);
    }

    #[test]
    fn tampered_proof_is_rejected() {
        let generator = ScoreGenerator::new([1; 32], [2; 32], 10);
        let list = bid_list_with(generator.bid_identity());
        let seed = Seed::default().next(1);
        let proposal = generator
            .generate(&MockProver, &seed, &list, 1)
            .unwrap()
            .unwrap();

        let mut bad = proposal.proof.clone();
        bad[0] ^= 1;
        assert!(!MockProver.verify(&bad, &seed, &proposal.score, &proposal.bid_identity));
    }

    #[test]
    fn derived_values_match_definitions() {
        let d = [3u8; 32];
        let k = [4u8; 32];
        let seed = Seed::default();
        assert_eq!(bid_commitment(&k), *Hash::digest(&k).as_bytes());
        assert_eq!(
            bid_identity(&d, &k),
            *Hash::digest_all(&[&d, &k]).as_bytes()
        );
        assert_eq!(
            score_value(&d, &k, &seed),
            *Hash::digest_all(&[&d, seed.as_bytes(), &k]).as_bytes()
        );
    }
}
