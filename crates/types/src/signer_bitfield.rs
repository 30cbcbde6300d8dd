//! Compact committee membership bitset.

/// Marks which committee slots contributed to an aggregated signature.
///
/// Bit `i` corresponds to the i-th member of the committee's canonical
/// ordering. Carried on the wire inside step votes, so the byte layout
/// (little bit-endian within each byte, length in whole bytes) is fixed.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct SignerBitfield {
    bits: Vec<u8>,
    len: usize,
}

impl SignerBitfield {
    /// A bitfield covering `len` committee slots, all unset.
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![0u8; len.div_ceil(8)],
            len,
        }
    }

    /// Reconstruct from wire bytes. The slot count is rounded up to whole
    /// bytes on the wire, so `len` is recovered as `bytes.len() * 8`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len() * 8;
        Self { bits: bytes, len }
    }

    /// Number of addressable slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no slots are addressable.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the bit for slot `index`. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize) {
        if index < self.len {
            self.bits[index / 8] |= 1 << (index % 8);
        }
    }

    /// Whether slot `index` is set.
    pub fn is_set(&self, index: usize) -> bool {
        index < self.len && (self.bits[index / 8] >> (index % 8)) & 1 == 1
    }

    /// Number of set slots.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Iterator over set slot indices.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|i| self.is_set(*i))
    }
}

impl std::fmt::Debug for SignerBitfield {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignerBitfield({}/{})", self.count(), self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_count() {
        let mut bf = SignerBitfield::new(10);
        assert_eq!(bf.count(), 0);
        bf.set(0);
        bf.set(7);
        bf.set(9);
        assert_eq!(bf.count(), 3);
        assert!(bf.is_set(0));
        assert!(bf.is_set(7));
        assert!(bf.is_set(9));
        assert!(!bf.is_set(1));
    }

    #[test]
    fn out_of_range_is_ignored() {
        let mut bf = SignerBitfield::new(4);
        bf.set(12);
        assert_eq!(bf.count(), 0);
        assert!(!bf.is_set(12));
    }

    #[test]
    fn double_set_counts_once() {
        let mut bf = SignerBitfield::new(8);
        bf.set(3);
        bf.set(3);
        assert_eq!(bf.count(), 1);
    }

    #[test]
    fn wire_round_trip() {
        let mut bf = SignerBitfield::new(16);
        bf.set(1);
        bf.set(8);
        bf.set(15);
        let restored = SignerBitfield::from_bytes(bf.as_bytes().to_vec());
        assert_eq!(restored.count(), 3);
        assert!(restored.is_set(1));
        assert!(restored.is_set(8));
        assert!(restored.is_set(15));
    }

    #[test]
    fn iter_set_yields_indices_in_order() {
        let mut bf = SignerBitfield::new(12);
        bf.set(11);
        bf.set(2);
        bf.set(5);
        let set: Vec<usize> = bf.iter_set().collect();
        assert_eq!(set, vec![2, 5, 11]);
    }
}
