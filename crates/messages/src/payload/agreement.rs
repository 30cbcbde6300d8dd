//! Agreement payload.

use crate::{CodecError, Reader};
use nocturne_types::{
    Agreement, BlsPublicKey, BlsSignature, Hash, SignerBitfield, StepVotes,
};

/// A round-final attestation:
/// `block_hash(32) || step_votes_1 || step_votes_2 || bls_sig(48) || bls_pubkey(96)`
/// where each `step_votes` is `agg_sig(48) || bitset_len(u8) || bitset`.
///
/// Round and step are not repeated in the payload; they come from the
/// envelope, so decoding threads them through to rebuild the [`Agreement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementPayload {
    /// The reconstructed agreement.
    pub agreement: Agreement,
}

impl AgreementPayload {
    /// Append the payload bytes.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let a = &self.agreement;
        out.extend_from_slice(a.block_hash.as_bytes());
        for sv in &a.votes {
            out.extend_from_slice(&sv.to_signable_bytes());
        }
        out.extend_from_slice(a.signature.as_bytes());
        out.extend_from_slice(a.signer.as_bytes());
    }

    /// Decode the payload bytes, rebuilding envelope-carried fields.
    ///
    /// The first step votes belong to the reduction step before the one the
    /// agreement was emitted at.
    pub fn decode(round: u64, step: u8, r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let block_hash = Hash::new(r.array()?);
        let first = decode_step_votes(block_hash, step.saturating_sub(1), r)?;
        let second = decode_step_votes(block_hash, step, r)?;
        let signature = BlsSignature::from_bytes(r.array()?);
        let signer = BlsPublicKey::from_bytes(r.array()?);
        Ok(Self {
            agreement: Agreement {
                round,
                step,
                block_hash,
                votes: [first, second],
                signer,
                signature,
            },
        })
    }
}

fn decode_step_votes(
    block_hash: Hash,
    step: u8,
    r: &mut Reader<'_>,
) -> Result<StepVotes, CodecError> {
    let agg_signature = BlsSignature::from_bytes(r.array()?);
    let bitset_len = r.u8()? as usize;
    let bitset = SignerBitfield::from_bytes(r.take(bitset_len)?.to_vec());
    Ok(StepVotes {
        block_hash,
        step,
        agg_signature,
        bitset,
    })
}
