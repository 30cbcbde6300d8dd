//! Candidate payload.

use crate::{write_varint, CodecError, Reader};
use nocturne_types::{Block, BlockHeader, Hash, Seed, Transaction};

/// Upper bound on transactions per candidate.
const MAX_TX_COUNT: usize = 1 << 16;
/// Upper bound on a single serialized transaction.
const MAX_TX_SIZE: usize = 1 << 20;

/// A full candidate block: `header || varint(tx_count) || tx[]`.
///
/// The score and proof backing the candidate travel separately in the Score
/// message, linked by the block hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePayload {
    /// The proposed block.
    pub block: Block,
}

impl CandidatePayload {
    /// Append the payload bytes.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let header = &self.block.header;
        out.push(header.version);
        out.extend_from_slice(&header.height.to_be_bytes());
        out.extend_from_slice(&header.timestamp.to_be_bytes());
        out.extend_from_slice(header.prev_block_hash.as_bytes());
        out.extend_from_slice(header.seed.as_bytes());
        out.extend_from_slice(header.tx_root.as_bytes());
        write_varint(out, self.block.transactions.len() as u64);
        for tx in &self.block.transactions {
            write_varint(out, tx.payload.len() as u64);
            out.extend_from_slice(&tx.payload);
        }
    }

    /// Decode the payload bytes.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let version = r.u8()?;
        let height = r.u64_be()?;
        let timestamp = r.u64_be()?;
        let prev_block_hash = Hash::new(r.array()?);
        let seed = Seed::new(r.array()?);
        let tx_root = Hash::new(r.array()?);

        let tx_count = r.length(MAX_TX_COUNT)?;
        let mut transactions = Vec::with_capacity(tx_count.min(1024));
        for _ in 0..tx_count {
            let len = r.length(MAX_TX_SIZE)?;
            transactions.push(Transaction::new(r.take(len)?.to_vec()));
        }

        Ok(Self {
            block: Block {
                header: BlockHeader {
                    version,
                    height,
                    timestamp,
                    prev_block_hash,
                    seed,
                    tx_root,
                },
                transactions,
            },
        })
    }
}
