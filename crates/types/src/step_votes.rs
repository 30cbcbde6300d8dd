//! Quorum artifacts: step votes and agreements.

use crate::{BlsPublicKey, BlsSignature, Hash, SignerBitfield};

/// Proof that a quorum of one (round, step) committee signed one hash.
///
/// The aggregate signature covers the reduction vote message for
/// (round, step, block_hash); the bitfield names the committee slots whose
/// signatures were folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepVotes {
    /// The hash the quorum voted for.
    pub block_hash: Hash,
    /// The reduction step the votes were cast at.
    pub step: u8,
    /// Aggregated BLS signature of all counted voters.
    pub agg_signature: BlsSignature,
    /// Which committee slots signed.
    pub bitset: SignerBitfield,
}

impl StepVotes {
    /// Total vote weight represented (one per set committee slot).
    pub fn weight(&self) -> usize {
        self.bitset.count()
    }

    /// The byte form bound into agreement signatures and the wire payload:
    /// `agg_sig(48) || bitset_len(u8) || bitset`.
    pub fn to_signable_bytes(&self) -> Vec<u8> {
        let bits = self.bitset.as_bytes();
        let mut out = Vec::with_capacity(48 + 1 + bits.len());
        out.extend_from_slice(self.agg_signature.as_bytes());
        out.push(bits.len() as u8);
        out.extend_from_slice(bits);
        out
    }
}

impl Default for StepVotes {
    fn default() -> Self {
        Self {
            block_hash: Hash::EMPTY,
            step: 0,
            agg_signature: BlsSignature::from_bytes([0u8; 48]),
            bitset: SignerBitfield::default(),
        }
    }
}

/// A round-final attestation: both reduction steps reached quorum on the
/// same hash, witnessed and signed by one committee member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agreement {
    /// Round being certified.
    pub round: u64,
    /// Step the second reduction concluded at.
    pub step: u8,
    /// The certified block hash.
    pub block_hash: Hash,
    /// Step votes for the first and second reduction step.
    pub votes: [StepVotes; 2],
    /// BLS key of the attesting member.
    pub signer: BlsPublicKey,
    /// Signature over [`crate::agreement_message`].
    pub signature: BlsSignature,
}

impl Agreement {
    /// The message `signature` must verify against.
    pub fn signable(&self) -> Vec<u8> {
        crate::agreement_message(self.round, self.step, &self.block_hash, &self.votes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signable_bytes_layout() {
        let mut bitset = SignerBitfield::new(16);
        bitset.set(3);
        let sv = StepVotes {
            block_hash: Hash::digest(b"h"),
            step: 4,
            agg_signature: BlsSignature::from_bytes([7u8; 48]),
            bitset,
        };
        let bytes = sv.to_signable_bytes();
        assert_eq!(bytes.len(), 48 + 1 + 2);
        assert_eq!(&bytes[..48], &[7u8; 48]);
        assert_eq!(bytes[48], 2);
    }

    #[test]
    fn weight_counts_set_slots() {
        let mut bitset = SignerBitfield::new(8);
        bitset.set(0);
        bitset.set(5);
        let sv = StepVotes {
            bitset,
            ..StepVotes::default()
        };
        assert_eq!(sv.weight(), 2);
    }
}
