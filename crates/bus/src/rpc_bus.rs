//! Synchronous request/response bus.

use nocturne_types::{Block, CandidateBlock, Hash, Transaction};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Topics a responder can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcTopic {
    /// Current chain tip.
    GetLastBlock,
    /// Candidate lookup by block hash.
    GetCandidate,
    /// Mempool snapshot for candidate assembly.
    GetMempoolTxs,
    /// Hand a certified winning hash to the Chain.
    AcceptBlock,
    /// Store the wallet's bid values at boot.
    StoreBidValues,
}

/// A request parameter set, one variant per topic.
#[derive(Debug, Clone)]
pub enum RpcCall {
    /// Fetch the current chain tip.
    GetLastBlock,
    /// Fetch a cached candidate by hash.
    GetCandidate {
        /// The candidate's block hash.
        block_hash: Hash,
    },
    /// Fetch transactions for a new candidate.
    GetMempoolTxs,
    /// Deliver the certified winner of a round.
    AcceptBlock {
        /// The finalized round.
        round: u64,
        /// The certified hash.
        block_hash: Hash,
    },
    /// Store the bid opening needed by the score generator.
    StoreBidValues {
        /// Pedersen commitment of the bid amount.
        commitment: [u8; 32],
        /// The bid secret.
        k: [u8; 32],
        /// Rounds the bid stays locked.
        lock: u64,
    },
}

impl RpcCall {
    /// The topic this call routes to.
    pub fn topic(&self) -> RpcTopic {
        match self {
            RpcCall::GetLastBlock => RpcTopic::GetLastBlock,
            RpcCall::GetCandidate { .. } => RpcTopic::GetCandidate,
            RpcCall::GetMempoolTxs => RpcTopic::GetMempoolTxs,
            RpcCall::AcceptBlock { .. } => RpcTopic::AcceptBlock,
            RpcCall::StoreBidValues { .. } => RpcTopic::StoreBidValues,
        }
    }
}

/// A response, one variant per topic.
#[derive(Debug, Clone)]
pub enum RpcResponse {
    /// The chain tip.
    LastBlock(Block),
    /// The candidate, if the responder holds it.
    Candidate(Option<Box<CandidateBlock>>),
    /// Mempool snapshot.
    MempoolTxs(Vec<Transaction>),
    /// The winner was accepted.
    Accepted,
    /// The bid values were stored.
    BidStored,
}

/// A pending request delivered to a responder.
#[derive(Debug)]
pub struct Request {
    /// The call parameters.
    pub call: RpcCall,
    /// Where to send the response.
    pub responder: oneshot::Sender<RpcResponse>,
}

/// Errors from request bus operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No responder registered for the topic.
    #[error("no responder registered for {0:?}")]
    Unregistered(RpcTopic),
    /// A responder is already registered for the topic.
    #[error("responder already registered for {0:?}")]
    AlreadyRegistered(RpcTopic),
    /// The responder's queue is full.
    #[error("responder queue full for {0:?}")]
    QueueFull(RpcTopic),
    /// The responder dropped the request without answering.
    #[error("responder dropped request for {0:?}")]
    Dropped(RpcTopic),
    /// No answer within the deadline.
    #[error("request timed out for {0:?}")]
    Timeout(RpcTopic),
}

/// The request/response bus.
///
/// One responder per topic; callers block (asynchronously) on a `oneshot`
/// reply with a deadline.
pub struct RpcBus {
    handlers: RwLock<HashMap<RpcTopic, mpsc::Sender<Request>>>,
    queue_capacity: usize,
}

impl RpcBus {
    /// A bus whose responder queues hold up to `queue_capacity` requests.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            queue_capacity,
        }
    }

    /// Claim a topic. Returns the stream of requests to answer.
    pub fn register(&self, topic: RpcTopic) -> Result<mpsc::Receiver<Request>, RpcError> {
        let mut handlers = self.handlers.write().expect("rpc handlers poisoned");
        if handlers.contains_key(&topic) {
            return Err(RpcError::AlreadyRegistered(topic));
        }
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        handlers.insert(topic, tx);
        Ok(rx)
    }

    /// Release a topic.
    pub fn deregister(&self, topic: RpcTopic) {
        let mut handlers = self.handlers.write().expect("rpc handlers poisoned");
        handlers.remove(&topic);
    }

    /// Issue a call and await its response.
    pub async fn call(&self, call: RpcCall, timeout: Duration) -> Result<RpcResponse, RpcError> {
        let topic = call.topic();
        let sender = {
            let handlers = self.handlers.read().expect("rpc handlers poisoned");
            handlers
                .get(&topic)
                .cloned()
                .ok_or(RpcError::Unregistered(topic))?
        };

        let (resp_tx, resp_rx) = oneshot::channel();
        sender
            .try_send(Request {
                call,
                responder: resp_tx,
            })
            .map_err(|_| RpcError::QueueFull(topic))?;

        match tokio::time::timeout(timeout, resp_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RpcError::Dropped(topic)),
            Err(_) => Err(RpcError::Timeout(topic)),
        }
    }
}
