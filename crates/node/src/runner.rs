//! The consensus runner.
//!
//! Owns all I/O around the synchronous [`Sequencer`]: listener pump tasks
//! per bus topic, timers, the outbound gossip queue, and the request-bus
//! calls the phases delegate. The sequencer itself never blocks; the runner
//! feeds it events one at a time and executes whatever actions come back.

use crate::timers::TimerManager;
use nocturne_bus::{EventBus, RpcBus, RpcCall, RpcResponse, RpcTopic};
use nocturne_consensus::{
    BlindBidProver, CandidateStore, Config, Extractor, Sequencer, SharedCandidateStore,
};
use nocturne_core::{Action, Event, Message, StateMachine};
use nocturne_messages::{ConsensusMessage, Payload, Topic, PROTOCOL_MAGIC};
use nocturne_types::ConsensusKeys;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Wire messages a pump holds for the next round.
const MAX_ROUND_AHEAD: usize = 512;

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Consensus parameters.
    pub consensus: Config,
    /// Network magic for the wire envelope.
    pub magic: u32,
    /// Capacity of the runner's internal channels.
    pub channel_capacity: usize,
    /// Deadline for request-bus calls.
    pub rpc_timeout: Duration,
    /// Lock period announced when storing bid values at boot.
    pub bid_lock: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            consensus: Config::default(),
            magic: PROTOCOL_MAGIC,
            channel_capacity: 1_024,
            rpc_timeout: Duration::from_secs(5),
            bid_lock: 250_000,
        }
    }
}

/// The composition root: wires the buses, the sequencer and the runner
/// tasks together.
pub struct Node {
    config: NodeConfig,
    keys: ConsensusKeys,
    bid_secrets: Option<([u8; 32], [u8; 32])>,
    prover: Arc<dyn BlindBidProver>,
    bus: Arc<EventBus>,
    rpc: Arc<RpcBus>,
    candidates: SharedCandidateStore,
}

/// Handle to a running node.
pub struct NodeHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
    inbound: mpsc::Sender<Vec<u8>>,
    outbound: Option<mpsc::Receiver<Vec<u8>>>,
}

impl NodeHandle {
    /// Where the transport delivers raw inbound wire messages.
    pub fn inbound(&self) -> mpsc::Sender<Vec<u8>> {
        self.inbound.clone()
    }

    /// Take the stream of raw outbound wire messages for the transport.
    pub fn take_outbound(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.outbound.take()
    }

    /// Stop the node and wait for the runner to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

impl Node {
    /// Assemble a node over shared buses.
    ///
    /// `bid_secrets` is the wallet's bid opening `(d, k)`; without it the
    /// node participates in every phase except block generation.
    pub fn new(
        config: NodeConfig,
        keys: ConsensusKeys,
        bid_secrets: Option<([u8; 32], [u8; 32])>,
        prover: Arc<dyn BlindBidProver>,
        bus: Arc<EventBus>,
        rpc: Arc<RpcBus>,
    ) -> Self {
        Self {
            config,
            keys,
            bid_secrets,
            prover,
            bus,
            rpc,
            candidates: CandidateStore::shared(),
        }
    }

    /// The candidate store this node's broker serves from.
    pub fn candidates(&self) -> SharedCandidateStore {
        Arc::clone(&self.candidates)
    }

    /// Start all runner tasks.
    pub fn spawn(self) -> NodeHandle {
        let (event_tx, event_rx) = mpsc::channel::<Event>(self.config.channel_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Vec<u8>>(self.config.channel_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel::<Vec<u8>>(self.config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (round_tx, round_rx) = watch::channel(0u64);

        let sequencer = Sequencer::new(
            self.keys.clone(),
            self.config.consensus.clone(),
            Arc::clone(&self.prover),
            self.bid_secrets,
            Arc::new(Extractor::new()),
            Arc::clone(&self.candidates),
        );

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        // Ingress: decode, deduplicate and authenticate wire bytes.
        tasks.push(tokio::spawn(ingress_task(
            inbound_rx,
            Arc::clone(&self.bus),
            self.config.magic,
        )));

        // One listener pump per subscribed topic.
        for topic in [
            Topic::RoundUpdate,
            Topic::Score,
            Topic::Candidate,
            Topic::Reduction,
            Topic::Agreement,
        ] {
            let (_, listener_rx) = self.bus.subscribe(topic);
            tasks.push(tokio::spawn(pump_task(
                topic,
                listener_rx,
                event_tx.clone(),
                round_rx.clone(),
            )));
        }

        // Candidate broker: serve candidate lookups for the Chain.
        match self.rpc.register(RpcTopic::GetCandidate) {
            Ok(requests) => {
                tasks.push(tokio::spawn(candidate_responder(
                    requests,
                    Arc::clone(&self.candidates),
                )));
            }
            Err(e) => debug!(error = %e, "candidate responder not registered"),
        }

        // Boot-time chain interaction.
        tasks.push(tokio::spawn(boot_task(
            Arc::clone(&self.rpc),
            self.bid_secrets,
            self.config.bid_lock,
            self.config.rpc_timeout,
        )));

        let runner = Runner {
            config: self.config,
            sequencer,
            timers: TimerManager::new(event_tx.clone()),
            bus: self.bus,
            rpc: self.rpc,
            event_tx,
            outbound_tx,
            round_tx,
            tasks,
        };
        let join = tokio::spawn(runner.run(event_rx, shutdown_rx));

        NodeHandle {
            shutdown: Some(shutdown_tx),
            join,
            inbound: inbound_tx,
            outbound: Some(outbound_rx),
        }
    }
}

struct Runner {
    config: NodeConfig,
    sequencer: Sequencer,
    timers: TimerManager,
    bus: Arc<EventBus>,
    rpc: Arc<RpcBus>,
    event_tx: mpsc::Sender<Event>,
    outbound_tx: mpsc::Sender<Vec<u8>>,
    round_tx: watch::Sender<u64>,
    tasks: Vec<JoinHandle<()>>,
}

impl Runner {
    async fn run(
        mut self,
        mut event_rx: mpsc::Receiver<Event>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        info!("consensus runner started");
        let mut queue: VecDeque<Event> = VecDeque::new();

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("consensus runner shutting down");
                    break;
                }
                maybe_event = event_rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    queue.push_back(event);
                    while let Some(next) = queue.pop_front() {
                        self.dispatch(next, &mut queue);
                    }
                }
            }
        }

        self.timers.cancel_all();
        for task in &self.tasks {
            task.abort();
        }
    }

    fn dispatch(&mut self, event: Event, queue: &mut VecDeque<Event>) {
        trace!(event = event.type_name(), "dispatch");
        self.sequencer.set_now(now_ms());
        let actions = self.sequencer.handle(event);

        let round = self.sequencer.round();
        if *self.round_tx.borrow() != round {
            let _ = self.round_tx.send(round);
        }

        for action in actions {
            self.execute(action, queue);
        }
    }

    fn execute(&mut self, action: Action, queue: &mut VecDeque<Event>) {
        trace!(action = action.type_name(), "execute");
        match action {
            Action::Gossip(message) => self.gossip(message),
            Action::Publish(message) => self.bus.publish(message),
            Action::SetTimer { id, duration } => self.timers.set_timer(id, duration),
            Action::CancelTimer { id } => self.timers.cancel_timer(id),
            Action::FetchMempoolTxs { round } => self.fetch_mempool(round),
            Action::AcceptBlock { round, block_hash } => {
                let rpc = Arc::clone(&self.rpc);
                let timeout = self.config.rpc_timeout;
                tokio::spawn(async move {
                    match rpc
                        .call(RpcCall::AcceptBlock { round, block_hash }, timeout)
                        .await
                    {
                        Ok(_) => debug!(round, block_hash = ?block_hash, "winner delivered to chain"),
                        Err(e) => warn!(round, error = %e, "failed to deliver winner to chain"),
                    }
                });
            }
            Action::EnqueueInternal { event } => queue.push_back(event),
        }
    }

    /// Broadcast a signed message and loop it back through the local bus so
    /// our own votes take the same path as everyone else's.
    fn gossip(&mut self, message: ConsensusMessage) {
        let bytes = message.marshal(self.config.magic);
        // Pre-mark the payload: the network echoing our own message back
        // must not deliver it twice.
        let _ = self.bus.can_forward(message.topic(), &bytes);
        self.bus.publish(Message::Wire(message));
        if self.outbound_tx.try_send(bytes).is_err() {
            warn!("outbound queue full; gossip dropped");
        }
    }

    fn fetch_mempool(&self, round: u64) {
        let rpc = Arc::clone(&self.rpc);
        let event_tx = self.event_tx.clone();
        let timeout = self.config.rpc_timeout;
        tokio::spawn(async move {
            let txs = match rpc.call(RpcCall::GetMempoolTxs, timeout).await {
                Ok(RpcResponse::MempoolTxs(txs)) => txs,
                Ok(other) => {
                    warn!(response = ?other, "unexpected mempool response; proposing empty block");
                    Vec::new()
                }
                Err(e) => {
                    warn!(error = %e, "mempool snapshot failed; proposing empty block");
                    Vec::new()
                }
            };
            let _ = event_tx.send(Event::MempoolFetched { round, txs }).await;
        });
    }
}

/// Decode, deduplicate and authenticate inbound wire bytes, then publish
/// them on the local bus.
async fn ingress_task(mut inbound: mpsc::Receiver<Vec<u8>>, bus: Arc<EventBus>, magic: u32) {
    while let Some(bytes) = inbound.recv().await {
        let message = match ConsensusMessage::unmarshal(&bytes, magic) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "undecodable wire message dropped");
                continue;
            }
        };
        if !bus.can_forward(message.topic(), &bytes) {
            trace!(topic = ?message.topic(), "duplicate wire message dropped");
            continue;
        }
        if let Err(e) = message.verify_signature() {
            warn!(error = %e, signer = ?message.header.signer, "bad envelope signature; sender reported");
            continue;
        }
        bus.publish(Message::Wire(message));
    }
}

/// Forward one topic's listener queue into the event channel.
///
/// Messages for the current round pass; one round ahead is buffered until
/// the round advances; anything else is dropped. Round updates always pass
/// (monotonicity is enforced by the sequencer).
async fn pump_task(
    topic: Topic,
    mut listener: mpsc::Receiver<Message>,
    event_tx: mpsc::Sender<Event>,
    mut round_rx: watch::Receiver<u64>,
) {
    let mut ahead: Vec<Message> = Vec::new();

    loop {
        tokio::select! {
            changed = round_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *round_rx.borrow();
                let held = std::mem::take(&mut ahead);
                for message in held {
                    if message.round() == current {
                        forward(message, &event_tx).await;
                    } else if message.round() == current + 1 {
                        ahead.push(message);
                    }
                    // Older buffered messages fall away.
                }
            }
            maybe = listener.recv() => {
                let Some(message) = maybe else { break };
                if matches!(message, Message::RoundUpdate(_)) {
                    forward(message, &event_tx).await;
                    continue;
                }
                let current = *round_rx.borrow();
                let round = message.round();
                if round == current {
                    forward(message, &event_tx).await;
                } else if round == current + 1 {
                    if ahead.len() < MAX_ROUND_AHEAD {
                        ahead.push(message);
                    }
                } else {
                    trace!(?topic, round, current, "out-of-window message dropped");
                }
            }
        }
    }
}

async fn forward(message: Message, event_tx: &mpsc::Sender<Event>) {
    let event = match message {
        Message::Wire(msg) => {
            let header = msg.header;
            match msg.payload {
                Payload::Score(score) => Event::ScoreReceived { header, score },
                Payload::Candidate(candidate) => Event::CandidateReceived { header, candidate },
                Payload::Reduction(vote) => Event::ReductionReceived { header, vote },
                Payload::Agreement(agreement) => Event::AgreementReceived { header, agreement },
            }
        }
        Message::RoundUpdate(update) => Event::RoundUpdate(update),
        Message::Regeneration(state) => Event::Regeneration(state),
        // Absentee reports are for external observers only.
        Message::Absentees(_) => return,
    };
    let _ = event_tx.send(event).await;
}

/// Serve candidate lookups from the broker's store.
async fn candidate_responder(
    mut requests: mpsc::Receiver<nocturne_bus::Request>,
    candidates: SharedCandidateStore,
) {
    while let Some(request) = requests.recv().await {
        let response = match request.call {
            RpcCall::GetCandidate { block_hash } => {
                let store = candidates.read().expect("candidate store poisoned");
                RpcResponse::Candidate(store.get(&block_hash).cloned().map(Box::new))
            }
            other => {
                warn!(call = ?other, "unexpected call on candidate topic");
                continue;
            }
        };
        let _ = request.responder.send(response);
    }
}

/// Boot-time chain interaction: persist the wallet's bid values and log the
/// tip we start from.
async fn boot_task(
    rpc: Arc<RpcBus>,
    bid_secrets: Option<([u8; 32], [u8; 32])>,
    bid_lock: u64,
    timeout: Duration,
) {
    if let Some((d, k)) = bid_secrets {
        match rpc
            .call(
                RpcCall::StoreBidValues {
                    commitment: d,
                    k,
                    lock: bid_lock,
                },
                timeout,
            )
            .await
        {
            Ok(_) => debug!("bid values stored"),
            Err(e) => debug!(error = %e, "bid values not stored"),
        }
    }

    match rpc.call(RpcCall::GetLastBlock, timeout).await {
        Ok(RpcResponse::LastBlock(block)) => {
            info!(height = block.header.height, tip = ?block.hash(), "chain tip loaded");
        }
        Ok(other) => warn!(response = ?other, "unexpected tip response"),
        Err(e) => debug!(error = %e, "chain tip unavailable at boot"),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
