//! Off-thread tile parsing.
//!
//! The main side talks to a pool of worker threads through a
//! [`WorkerChannel`]. Each worker owns a [`WorkerSourceRegistry`] and a
//! [`Dispatcher`] that routes requests by source type to a
//! [`WorkerSource`]. Responses are matched to callers by [`CorrelationId`],
//! never by arrival order.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────── main side ──────────────┐     ┌────────── worker thread N ──────────┐
//! │                                        │     │                                      │
//! │  WorkerChannel::send ──► PendingRequests     │  Dispatcher                          │
//! │        │                   (DashMap)   │     │    ├─ registry: name → constructor   │
//! │        └── WorkerMessage ──────────────┼────►│    ├─ sources: name → instance       │
//! │                                        │     │    └─ one task per request           │
//! │  router thread ◄── Response ───────────┼─────│                                      │
//! │        └─► resolve caller by id        │     │  current-thread tokio runtime        │
//! └────────────────────────────────────────┘     └──────────────────────────────────────┘
//! ```
//!
//! Workers are started on the first request, from the location chosen by
//! the [`BootstrapChain`]. Messages are moved through the channels, so
//! workers never share decoding state with the main side or each other.

mod bootstrap;
mod channel;
mod dispatcher;
mod error;
mod pending;
mod pool;
mod protocol;
mod registry;
mod source;
mod vector;

pub use bootstrap::{
    BootstrapChain, BootstrapLocation, BootstrapSettings, ExplicitOverride, LocationResolver,
    ModuleRelative, Resolution, ResolvedBootstrap, SameOrigin, Verbatim, DEFAULT_WORKER_ENTRY,
};
pub use channel::{
    default_pool_size, ChannelConfig, PendingRequest, WorkerChannel, MAX_DEFAULT_POOL_SIZE,
};
pub use dispatcher::Dispatcher;
pub use error::{ChannelError, DispatchError, RegistryError};
pub use pending::{Delivery, Outcome, PendingRequests, RequestState};
pub use protocol::{CorrelationId, ErrorDescriptor, Operation, Request, Response, WorkerMessage};
pub use registry::{RegistryBootstrap, SourceConstructor, WorkerSourceRegistry};
pub use source::{BoxFuture, RequestContext, WorkerContext, WorkerSource};
pub use vector::{
    DecodeError, JsonTileDecoder, ParsedTile, TileDecoder, VectorTileSource, VECTOR_SOURCE_TYPE,
};
