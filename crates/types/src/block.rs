//! Blocks and block candidates.

use crate::{Hash, Seed};

/// Current block format version.
pub const BLOCK_VERSION: u8 = 0;

/// An opaque consensus-side transaction.
///
/// Transaction validation semantics live outside the core; consensus only
/// needs stable hashing and byte-exact serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Serialized transaction payload.
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Wrap payload bytes.
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// SHA3-256 of the payload.
    pub fn hash(&self) -> Hash {
        Hash::digest(&self.payload)
    }
}

/// A block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Format version.
    pub version: u8,
    /// Block height; equals the round that decided it.
    pub height: u64,
    /// Proposer-set timestamp, milliseconds since the epoch.
    pub timestamp: u64,
    /// Hash of the previous block.
    pub prev_block_hash: Hash,
    /// Seed for this round's score generation.
    pub seed: Seed,
    /// Digest over the ordered transaction hashes.
    pub tx_root: Hash,
}

impl BlockHeader {
    /// The identifying hash, stable under re-serialization.
    pub fn hash(&self) -> Hash {
        Hash::digest_all(&[
            &[self.version],
            &self.height.to_be_bytes(),
            &self.timestamp.to_be_bytes(),
            self.prev_block_hash.as_bytes(),
            self.seed.as_bytes(),
            self.tx_root.as_bytes(),
        ])
    }
}

/// A full block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// The header.
    pub header: BlockHeader,
    /// Ordered transactions.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Build a block, computing the transaction root.
    pub fn new(
        height: u64,
        timestamp: u64,
        prev_block_hash: Hash,
        seed: Seed,
        transactions: Vec<Transaction>,
    ) -> Self {
        let tx_root = tx_root(&transactions);
        Self {
            header: BlockHeader {
                version: BLOCK_VERSION,
                height,
                timestamp,
                prev_block_hash,
                seed,
                tx_root,
            },
            transactions,
        }
    }

    /// The genesis block: height 0, zero hashes, default seed.
    pub fn genesis() -> Self {
        Block::new(0, 0, Hash::EMPTY, Seed::default(), Vec::new())
    }

    /// The identifying hash (the header hash).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}

/// Digest over the ordered transaction hashes.
pub(crate) fn tx_root(transactions: &[Transaction]) -> Hash {
    let hashes: Vec<Hash> = transactions.iter().map(Transaction::hash).collect();
    let parts: Vec<&[u8]> = hashes.iter().map(|h| h.as_bytes() as &[u8]).collect();
    Hash::digest_all(&parts)
}

/// A proposed block with its winning score and blind-bid proof, gossiped by
/// the generator and cached by the candidate broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateBlock {
    /// The proposed block.
    pub block: Block,
    /// The blind-bid score `Y`, compared as a big-endian integer.
    pub score: [u8; 32],
    /// Opaque proof bytes from the blind-bid oracle.
    pub proof: Vec<u8>,
    /// The seed the score was generated against.
    pub seed: Seed,
}

impl CandidateBlock {
    /// The identifying hash (the block's header hash).
    pub fn hash(&self) -> Hash {
        self.block.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_hash_is_stable() {
        let block = Block::new(
            3,
            1_234,
            Hash::digest(b"prev"),
            Seed::default().next(3),
            vec![Transaction::new(vec![1, 2, 3])],
        );
        assert_eq!(block.hash(), block.clone().hash());
    }

    #[test]
    fn header_hash_covers_every_field() {
        let base = Block::new(3, 1_234, Hash::digest(b"prev"), Seed::default(), vec![]);

        let mut other = base.clone();
        other.header.height = 4;
        assert_ne!(base.hash(), other.hash());

        let mut other = base.clone();
        other.header.timestamp = 1_235;
        assert_ne!(base.hash(), other.hash());

        let mut other = base.clone();
        other.header.prev_block_hash = Hash::digest(b"other prev");
        assert_ne!(base.hash(), other.hash());

        let mut other = base.clone();
        other.header.seed = Seed::default().next(9);
        assert_ne!(base.hash(), other.hash());
    }

    #[test]
    fn tx_root_depends_on_order() {
        let a = Transaction::new(vec![1]);
        let b = Transaction::new(vec![2]);
        let ab = Block::new(1, 0, Hash::EMPTY, Seed::default(), vec![a.clone(), b.clone()]);
        let ba = Block::new(1, 0, Hash::EMPTY, Seed::default(), vec![b, a]);
        assert_ne!(ab.hash(), ba.hash());
    }

    #[test]
    fn genesis_is_height_zero() {
        let genesis = Block::genesis();
        assert_eq!(genesis.header.height, 0);
        assert_eq!(genesis.header.prev_block_hash, Hash::EMPTY);
    }
}
