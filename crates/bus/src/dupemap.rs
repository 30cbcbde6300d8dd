//! Round-scoped duplicate filter.

use nocturne_messages::Topic;
use sha3::{Digest, Sha3_256};
use std::collections::HashSet;

/// Drops byte-identical payloads within a round.
///
/// Keyed by the first 8 bytes of `SHA3-256(topic || payload)`; the filter is
/// cleared whenever the round advances, so a payload legitimately
/// re-gossiped in a later round passes again.
#[derive(Debug, Default)]
pub struct DupeMap {
    round: u64,
    seen: HashSet<u64>,
}

impl DupeMap {
    /// An empty filter at round 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the filter if `round` moved past the current one.
    pub fn update_round(&mut self, round: u64) {
        if round > self.round {
            self.round = round;
            self.seen.clear();
        }
    }

    /// Whether this payload is seen for the first time this round. Marks it
    /// as seen as a side effect.
    pub fn can_forward(&mut self, topic: Topic, payload: &[u8]) -> bool {
        self.seen.insert(key(topic, payload))
    }

    /// Number of distinct payloads seen this round.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True if nothing has been seen this round.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

fn key(topic: Topic, payload: &[u8]) -> u64 {
    let mut hasher = Sha3_256::new();
    hasher.update([topic.as_byte()]);
    hasher.update(payload);
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}
