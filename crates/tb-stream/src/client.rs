//! Upstream streaming client boundary.
//!
//! The wire protocol (handshake, framing, auto-reconnect) lives behind
//! [`TickerClient`]; this core only consumes the callback contract below.
//! The registry receives a [`TickerClientFactory`] at construction, so the
//! client can be substituted with a scripted double that emits canned
//! callback sequences.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tb_core::types::{Mode, Tick};

/// Kind of a raw diagnostic frame forwarded through [`TickerSink::on_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

/// Event sink wired into a streaming client — the seven callback slots.
///
/// Methods are invoked from the client's own task, concurrently with each
/// other and with registry calls. Implementations must be cheap, must not
/// block on registry state, and must never panic on malformed input.
pub trait TickerSink: Send + Sync {
    /// Handshake succeeded (fired on every successful connect, including
    /// reconnects).
    fn on_connect(&self);

    /// One market data tick.
    fn on_tick(&self, tick: Tick);

    /// Protocol-level error, non-fatal.
    fn on_error(&self, message: &str);

    /// Connection closed.
    fn on_close(&self, code: u16, reason: &str);

    /// The client is about to auto-retry.
    fn on_reconnect(&self, attempt: u32, delay: Duration);

    /// The client gave up retrying — terminal for this connection.
    fn on_no_reconnect(&self, attempt: u32);

    /// Raw frame, diagnostic only.
    fn on_message(&self, kind: FrameKind, payload: &[u8]);
}

/// Handle to one upstream streaming connection.
///
/// Subscription calls may be issued before the connection is up; the client
/// queues them and flushes once connected.
#[async_trait]
pub trait TickerClient: Send + Sync {
    /// Launch the connection loop as an independent task. Non-blocking;
    /// the first successful handshake is signalled via
    /// [`TickerSink::on_connect`].
    fn serve(&self);

    /// Subscribe to the given instrument tokens.
    async fn subscribe(&self, tokens: &[u32]) -> anyhow::Result<()>;

    /// Unsubscribe from the given instrument tokens.
    async fn unsubscribe(&self, tokens: &[u32]) -> anyhow::Result<()>;

    /// Switch the subscription depth for the given tokens.
    async fn set_mode(&self, mode: Mode, tokens: &[u32]) -> anyhow::Result<()>;

    /// Signal the connection loop to stop. Best-effort, returns immediately.
    async fn stop(&self);

    /// Tear the connection down and wait for the loop to finish.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Injected constructor for streaming clients — one call per session start.
pub trait TickerClientFactory: Send + Sync {
    fn create(
        &self,
        user_id: &str,
        credential: &str,
        sink: Arc<dyn TickerSink>,
    ) -> Arc<dyn TickerClient>;
}
