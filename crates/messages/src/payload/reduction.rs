//! Reduction payload.

use crate::{CodecError, Reader};
use nocturne_types::{BlsPublicKey, BlsSignature, Hash};

/// A reduction step vote: `block_hash(32) || bls_sig(48) || bls_pubkey(96)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionPayload {
    /// The hash being voted for (`Hash::EMPTY` for the fallback).
    pub block_hash: Hash,
    /// BLS signature over the reduction vote message.
    pub signature: BlsSignature,
    /// The voter's BLS key.
    pub signer: BlsPublicKey,
}

impl ReductionPayload {
    /// Append the payload bytes.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.block_hash.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(self.signer.as_bytes());
    }

    /// Decode the payload bytes.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            block_hash: Hash::new(r.array()?),
            signature: BlsSignature::from_bytes(r.array()?),
            signer: BlsPublicKey::from_bytes(r.array()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let payload = ReductionPayload {
            block_hash: Hash::digest(b"winner"),
            signature: BlsSignature::from_bytes([3; 48]),
            signer: BlsPublicKey::from_bytes([5; 96]),
        };
        let mut bytes = Vec::new();
        payload.encode(&mut bytes);
        assert_eq!(bytes.len(), 32 + 48 + 96);

        let mut r = Reader::new(&bytes);
        let decoded = ReductionPayload::decode(&mut r).unwrap();
        r.expect_end().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn fallback_vote_round_trip() {
        let payload = ReductionPayload {
            block_hash: Hash::EMPTY,
            signature: BlsSignature::from_bytes([0; 48]),
            signer: BlsPublicKey::from_bytes([1; 96]),
        };
        let mut bytes = Vec::new();
        payload.encode(&mut bytes);
        let decoded = ReductionPayload::decode(&mut Reader::new(&bytes)).unwrap();
        assert!(decoded.block_hash.is_empty());
    }
}
