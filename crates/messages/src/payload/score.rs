//! Score payload.

use crate::{write_varint, CodecError, Reader};
use nocturne_types::{Hash, Seed};

/// Upper bound on blind-bid proof size.
const MAX_PROOF_SIZE: usize = 1 << 16;

/// A blind-bid score proposal:
/// `block_hash(32) || score_Y(32) || varint(len) proof || seed(33) || bid_identity(32)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScorePayload {
    /// Hash of the candidate block this score backs.
    pub block_hash: Hash,
    /// The score `Y`, compared as a big-endian integer.
    pub score: [u8; 32],
    /// Opaque proof bytes from the blind-bid oracle.
    pub proof: Vec<u8>,
    /// Seed the score was generated against.
    pub seed: Seed,
    /// The prover's bid identity `X = H(d || k)`.
    pub bid_identity: [u8; 32],
}

impl ScorePayload {
    /// Append the payload bytes.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.block_hash.as_bytes());
        out.extend_from_slice(&self.score);
        write_varint(out, self.proof.len() as u64);
        out.extend_from_slice(&self.proof);
        out.extend_from_slice(self.seed.as_bytes());
        out.extend_from_slice(&self.bid_identity);
    }

    /// Decode the payload bytes.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let block_hash = Hash::new(r.array()?);
        let score = r.array()?;
        let proof_len = r.length(MAX_PROOF_SIZE)?;
        let proof = r.take(proof_len)?.to_vec();
        let seed = Seed::new(r.array()?);
        let bid_identity = r.array()?;
        Ok(Self {
            block_hash,
            score,
            proof,
            seed,
            bid_identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScorePayload {
        ScorePayload {
            block_hash: Hash::digest(b"candidate"),
            score: [0x80; 32],
            proof: vec![1, 2, 3, 4, 5],
            seed: Seed::default().next(4),
            bid_identity: [9; 32],
        }
    }

    #[test]
    fn round_trip() {
        let payload = sample();
        let mut bytes = Vec::new();
        payload.encode(&mut bytes);

        let mut r = Reader::new(&bytes);
        let decoded = ScorePayload::decode(&mut r).unwrap();
        r.expect_end().unwrap();
        assert_eq!(decoded, payload);

        // Re-encoding reproduces the exact bytes.
        let mut again = Vec::new();
        decoded.encode(&mut again);
        assert_eq!(again, bytes);
    }

    #[test]
    fn oversized_proof_is_rejected() {
        let mut bytes = Vec::new();
        let payload = sample();
        bytes.extend_from_slice(payload.block_hash.as_bytes());
        bytes.extend_from_slice(&payload.score);
        write_varint(&mut bytes, (MAX_PROOF_SIZE + 1) as u64);
        let mut r = Reader::new(&bytes);
        assert!(matches!(
            ScorePayload::decode(&mut r),
            Err(CodecError::LengthOutOfBounds(..))
        ));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let payload = sample();
        let mut bytes = Vec::new();
        payload.encode(&mut bytes);
        bytes.truncate(bytes.len() - 1);
        let mut r = Reader::new(&bytes);
        assert!(matches!(
            ScorePayload::decode(&mut r),
            Err(CodecError::UnexpectedEof(_))
        ));
    }
}
