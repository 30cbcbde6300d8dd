//! Committee cache.

use crate::sortition::{deterministic_committee, SortitionError, VotingCommittee};
use nocturne_types::ProvisionerSet;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::trace;

/// Memoizes voting committees by (round, step, size cap).
///
/// The cap is part of the key because reduction and agreement draw
/// different-sized committees from the same (round, step). Entries outlive
/// the step but not the round: on round advance everything below
/// `round - 1` is evicted. Readers never block readers.
#[derive(Debug, Default)]
pub struct Extractor {
    committees: RwLock<HashMap<(u64, u8, usize), Arc<VotingCommittee>>>,
}

impl Extractor {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The committee for (round, step), computing and caching it on first
    /// request.
    pub fn committee(
        &self,
        round: u64,
        step: u8,
        provisioners: &ProvisionerSet,
        max_size: usize,
    ) -> Result<Arc<VotingCommittee>, SortitionError> {
        if let Some(found) = self
            .committees
            .read()
            .expect("committee cache poisoned")
            .get(&(round, step, max_size))
        {
            return Ok(Arc::clone(found));
        }

        let committee = Arc::new(deterministic_committee(round, step, provisioners, max_size)?);
        let mut cache = self.committees.write().expect("committee cache poisoned");
        let entry = cache
            .entry((round, step, max_size))
            .or_insert_with(|| Arc::clone(&committee));
        Ok(Arc::clone(entry))
    }

    /// Evict everything below `current_round - 1`.
    pub fn evict_below(&self, current_round: u64) {
        let cutoff = current_round.saturating_sub(1);
        let mut cache = self.committees.write().expect("committee cache poisoned");
        let before = cache.len();
        cache.retain(|(round, _, _), _| *round >= cutoff);
        trace!(
            current_round,
            evicted = before - cache.len(),
            "committee cache pruned"
        );
    }

    /// Number of cached committees.
    pub fn len(&self) -> usize {
        self.committees
            .read()
            .expect("committee cache poisoned")
            .len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nocturne_types::{BlsPublicKey, EdPublicKey, Provisioner};

    fn provisioners() -> ProvisionerSet {
        (1..=4u8)
            .map(|tag| Provisioner {
                bls_public_key: BlsPublicKey::from_bytes([tag; 96]),
                ed_public_key: EdPublicKey::from_bytes([tag; 32]),
                stake: 100 * tag as u64,
                start_round: 0,
                end_round: u64::MAX,
            })
            .collect()
    }

    #[test]
    fn caches_per_round_and_step() {
        let extractor = Extractor::new();
        let set = provisioners();
        let a = extractor.committee(1, 1, &set, 50).unwrap();
        let b = extractor.committee(1, 1, &set, 50).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(extractor.len(), 1);

        extractor.committee(1, 2, &set, 50).unwrap();
        assert_eq!(extractor.len(), 2);
    }

    #[test]
    fn eviction_keeps_previous_round() {
        let extractor = Extractor::new();
        let set = provisioners();
        for round in 1..=4u64 {
            extractor.committee(round, 1, &set, 50).unwrap();
        }
        extractor.evict_below(4);
        // Rounds 3 and 4 survive.
        assert_eq!(extractor.len(), 2);
    }

    #[test]
    fn different_caps_do_not_collide() {
        let extractor = Extractor::new();
        let set = provisioners();
        let reduction = extractor.committee(1, 3, &set, 2).unwrap();
        let agreement = extractor.committee(1, 3, &set, 3).unwrap();
        assert_eq!(reduction.total_slots(), 2);
        assert_eq!(agreement.total_slots(), 3);
        assert_eq!(extractor.len(), 2);
    }

    #[test]
    fn sortition_failure_is_propagated() {
        let extractor = Extractor::new();
        let empty = ProvisionerSet::new();
        assert_eq!(
            extractor.committee(1, 1, &empty, 50).unwrap_err(),
            SortitionError::NoCommittee
        );
        assert!(extractor.is_empty());
    }
}
