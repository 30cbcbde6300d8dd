//! Composition root for the Nocturne consensus core.
//!
//! A [`Node`] wires the event bus, the request bus, the sequencer and the
//! runner tasks together. External collaborators attach at two seams:
//!
//! - **Transport**: feeds raw wire bytes into [`NodeHandle::inbound`] and
//!   drains [`NodeHandle::take_outbound`] for gossip.
//! - **Chain**: publishes `RoundUpdate`s on the event bus and answers the
//!   request-bus topics (`GetLastBlock`, `GetMempoolTxs`, `AcceptBlock`,
//!   `StoreBidValues`).
//!
//! Everything else — phase scheduling, timers, vote accounting — happens
//! inside the runner.

mod runner;
mod timers;

pub use runner::{Node, NodeConfig, NodeHandle};
pub use timers::TimerManager;

use tracing_subscriber::EnvFilter;

/// Install a process-wide tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
