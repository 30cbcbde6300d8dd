//! The common message envelope.

use crate::{CodecError, Payload, Reader, Topic};
use nocturne_types::{EdKeyPair, EdPublicKey, EdSignature, SignatureError};

/// Envelope fields shared by every consensus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Round the message belongs to.
    pub round: u64,
    /// Step the message belongs to.
    pub step: u8,
    /// The sender's Edwards key.
    pub signer: EdPublicKey,
}

/// A complete consensus message: envelope plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusMessage {
    /// Envelope fields.
    pub header: MessageHeader,
    /// Envelope signature over `topic || round || step || payload`.
    pub signature: EdSignature,
    /// The topic-tagged payload.
    pub payload: Payload,
}

impl ConsensusMessage {
    /// Build and sign a message.
    pub fn sign(keys: &EdKeyPair, round: u64, step: u8, payload: Payload) -> Self {
        let signable = signable_bytes(payload.topic(), round, step, &payload.to_bytes());
        let signature = keys.sign(&signable);
        Self {
            header: MessageHeader {
                round,
                step,
                signer: keys.public_key(),
            },
            signature,
            payload,
        }
    }

    /// The topic this message travels under.
    pub fn topic(&self) -> Topic {
        self.payload.topic()
    }

    /// Verify the envelope signature against the embedded signer key.
    pub fn verify_signature(&self) -> Result<(), SignatureError> {
        let signable = signable_bytes(
            self.topic(),
            self.header.round,
            self.header.step,
            &self.payload.to_bytes(),
        );
        self.header.signer.verify(&signable, &self.signature)
    }

    /// Serialize the full message for the wire.
    pub fn marshal(&self, magic: u32) -> Vec<u8> {
        let payload_bytes = self.payload.to_bytes();
        let mut out = Vec::with_capacity(4 + 1 + 8 + 1 + 32 + 64 + payload_bytes.len());
        out.extend_from_slice(&magic.to_le_bytes());
        out.push(self.topic().as_byte());
        out.extend_from_slice(&self.header.round.to_le_bytes());
        out.push(self.header.step);
        out.extend_from_slice(self.header.signer.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&payload_bytes);
        out
    }

    /// Parse a wire buffer. The envelope signature is *not* checked here;
    /// callers verify after deciding the message is otherwise relevant.
    pub fn unmarshal(bytes: &[u8], magic: u32) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let got_magic = r.u32_le()?;
        if got_magic != magic {
            return Err(CodecError::MagicMismatch {
                expected: magic,
                got: got_magic,
            });
        }
        let topic = Topic::from_wire_tag(r.u8()?)?;
        let round = r.u64_le()?;
        let step = r.u8()?;
        let signer = EdPublicKey::from_bytes(r.array()?);
        let signature = EdSignature::from_bytes(r.array()?);
        let payload = Payload::decode(topic, round, step, &mut r)?;
        r.expect_end()?;
        Ok(Self {
            header: MessageHeader {
                round,
                step,
                signer,
            },
            signature,
            payload,
        })
    }
}

fn signable_bytes(topic: Topic, round: u64, step: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 8 + 1 + payload.len());
    out.push(topic.as_byte());
    out.extend_from_slice(&round.to_le_bytes());
    out.push(step);
    out.extend_from_slice(payload);
    out
}
