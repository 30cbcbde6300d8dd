//! In-process buses for the consensus core.
//!
//! Two buses connect the consensus components to each other and to their
//! external collaborators:
//!
//! - [`EventBus`]: multi-topic publish/subscribe. Each listener owns a
//!   bounded queue; publishing copies the message into every listener
//!   buffer. A round-scoped [`DupeMap`] drops byte-identical payloads
//!   before they reach any component.
//! - [`RpcBus`]: synchronous request/response for queries that need an
//!   answer (chain tip, mempool snapshot, candidate lookup).
//!
//! Both are plain values constructed by the composition root and threaded
//! through component constructors; there are no global singletons.

mod dupemap;
mod event_bus;
mod listener_map;
mod rpc_bus;

pub use dupemap::DupeMap;
pub use event_bus::{BusError, EventBus, ListenerId};
pub use rpc_bus::{Request, RpcBus, RpcCall, RpcError, RpcResponse, RpcTopic};
