//! # tb-stream
//!
//! Session multiplexing and fan-out core of the Tickbridge service.
//!
//! ## Architecture
//!
//! [`SessionRegistry`](registry::SessionRegistry) owns one upstream streaming
//! connection per `(user, bot)` pair. Each session's asynchronous events are
//! handled by a [`SessionSink`](dispatcher::SessionSink), which republishes
//! ticks onto the tenant's pub/sub channel and translates every other
//! callback into a structured lifecycle event.
//!
//! ```text
//! TickerService.publish_ticks()
//!   ──► InstrumentResolver.resolve()          symbols → tokens
//!   ──► SessionRegistry.start()               reserve slot, connect, subscribe
//!         └── TickerClientFactory.create()    one client per session
//!               └── SessionSink               ticks → TickPublisher.publish()
//! ```
//!
//! ## Collaborator boundaries
//!
//! - [`client`] — upstream streaming client traits (`TickerClient`,
//!   `TickerSink`, `TickerClientFactory`)
//! - [`transport`] — pub/sub publish boundary (`TickPublisher`)
//! - [`resolver`] — instrument token resolution (`InstrumentResolver`)
//! - [`events`] — lifecycle/audit event sink (`EventLog`)
//!
//! All four are injected, never hard-wired, so each can be substituted with
//! a scripted double in tests.

pub mod client;
pub mod dispatcher;
pub mod events;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod transport;
pub mod ws_client;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::{FrameKind, TickerClient, TickerClientFactory, TickerSink};
pub use events::{EventLog, MemoryEventLog, TracingEventLog};
pub use registry::{RegistryPolicy, SessionRegistry};
pub use resolver::{CatalogResolver, InstrumentResolver};
pub use service::{PublishSummary, TickerService};
pub use transport::{MemoryPubSub, RedisPublisher, TickPublisher};
pub use ws_client::{WsTickerClient, WsTickerConfig, WsTickerFactory};
