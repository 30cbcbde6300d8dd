//! Message topics.

use crate::CodecError;

/// All topics routed over the event bus.
///
/// The four wire topics carry the tag byte from the envelope; the remaining
/// topics are in-process only and never leave the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Topic {
    /// Chain announced a new tip; consensus moves to the next round.
    RoundUpdate = 0x01,
    /// The sequencer restarted the round at a later step.
    Regeneration = 0x02,
    /// Committee members that did not vote in a reduction step.
    Absentees = 0x03,

    /// Blind-bid score proposal.
    Score = 0x10,
    /// Full candidate block.
    Candidate = 0x11,
    /// Reduction step vote.
    Reduction = 0x12,
    /// Round-final agreement attestation.
    Agreement = 0x13,
}

impl Topic {
    /// The tag byte.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether this topic crosses the wire.
    pub fn is_wire(self) -> bool {
        matches!(
            self,
            Topic::Score | Topic::Candidate | Topic::Reduction | Topic::Agreement
        )
    }

    /// Parse a wire tag byte.
    pub fn from_wire_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0x10 => Ok(Topic::Score),
            0x11 => Ok(Topic::Candidate),
            0x12 => Ok(Topic::Reduction),
            0x13 => Ok(Topic::Agreement),
            other => Err(CodecError::UnknownTopic(other)),
        }
    }

    /// Topic name for logs.
    pub fn name(self) -> &'static str {
        match self {
            Topic::RoundUpdate => "RoundUpdate",
            Topic::Regeneration => "Regeneration",
            Topic::Absentees => "Absentees",
            Topic::Score => "Score",
            Topic::Candidate => "Candidate",
            Topic::Reduction => "Reduction",
            Topic::Agreement => "Agreement",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_round_trip() {
        for topic in [Topic::Score, Topic::Candidate, Topic::Reduction, Topic::Agreement] {
            assert_eq!(Topic::from_wire_tag(topic.as_byte()).unwrap(), topic);
            assert!(topic.is_wire());
        }
    }

    #[test]
    fn internal_topics_are_not_wire_tags() {
        assert!(!Topic::RoundUpdate.is_wire());
        assert!(matches!(
            Topic::from_wire_tag(Topic::RoundUpdate.as_byte()),
            Err(CodecError::UnknownTopic(0x01))
        ));
    }
}
