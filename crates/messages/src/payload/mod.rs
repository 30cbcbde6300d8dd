//! Per-topic wire payloads.

mod agreement;
mod candidate;
mod reduction;
mod score;

pub use agreement::AgreementPayload;
pub use candidate::CandidatePayload;
pub use reduction::ReductionPayload;
pub use score::ScorePayload;

use crate::{CodecError, Reader, Topic};

/// A decoded wire payload, tagged by topic.
///
/// Handlers select by exhaustive match; there is no dynamic dispatch over
/// payload types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Blind-bid score proposal.
    Score(ScorePayload),
    /// Full candidate block.
    Candidate(CandidatePayload),
    /// Reduction step vote.
    Reduction(ReductionPayload),
    /// Round-final agreement attestation.
    Agreement(AgreementPayload),
}

impl Payload {
    /// The topic this payload travels under.
    pub fn topic(&self) -> Topic {
        match self {
            Payload::Score(_) => Topic::Score,
            Payload::Candidate(_) => Topic::Candidate,
            Payload::Reduction(_) => Topic::Reduction,
            Payload::Agreement(_) => Topic::Agreement,
        }
    }

    /// Append the payload bytes.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Payload::Score(p) => p.encode(out),
            Payload::Candidate(p) => p.encode(out),
            Payload::Reduction(p) => p.encode(out),
            Payload::Agreement(p) => p.encode(out),
        }
    }

    /// The payload bytes as a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    /// Decode the payload for `topic`. Agreement payloads reconstruct their
    /// round and step from the envelope, so both are threaded through.
    pub fn decode(
        topic: Topic,
        round: u64,
        step: u8,
        r: &mut Reader<'_>,
    ) -> Result<Self, CodecError> {
        match topic {
            Topic::Score => Ok(Payload::Score(ScorePayload::decode(r)?)),
            Topic::Candidate => Ok(Payload::Candidate(CandidatePayload::decode(r)?)),
            Topic::Reduction => Ok(Payload::Reduction(ReductionPayload::decode(r)?)),
            Topic::Agreement => Ok(Payload::Agreement(AgreementPayload::decode(round, step, r)?)),
            other => Err(CodecError::UnknownTopic(other.as_byte())),
        }
    }
}
