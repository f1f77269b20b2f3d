//! Typed error definitions for the Tickbridge service.
//!
//! Session lifecycle failures carry the tenant identity so callers can tell
//! "fix your request" errors (limit exceeded, unknown instrument, not found)
//! apart from "try again later" errors (connect timeout, transport hiccups).
//! All variants implement `std::error::Error` via `thiserror`, so they
//! integrate seamlessly with `anyhow::Result` at the edges.

use thiserror::Error;

/// Errors returned by the session registry's start/stop operations.
///
/// Any variant produced before a session is stored guarantees zero side
/// effects: no client is left running and no registry entry exists.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The user already holds the maximum number of concurrent sessions.
    #[error("maximum tickers reached for user {user_id}")]
    LimitExceeded { user_id: String },

    /// A session for this tenant key is live or currently being started.
    #[error("ticker already active for {key}")]
    AlreadyActive { key: String },

    /// `start` was called with an empty instrument list.
    #[error("no instruments to subscribe for {key}")]
    EmptyInstruments { key: String },

    /// The upstream connection did not come up within the bounded wait.
    #[error("timed out waiting for ticker connection for {key}")]
    ConnectTimeout { key: String },

    /// The upstream client rejected the subscribe call.
    #[error("subscription error for {key}: {reason}")]
    Subscription { key: String, reason: String },

    /// The upstream client rejected the set-mode call.
    #[error("setMode error for {key}: {reason}")]
    SetMode { key: String, reason: String },

    /// `stop` was called for a tenant with no active session.
    #[error("ticker not found for user {user_id} and bot {bot_id}")]
    NotFound { user_id: String, bot_id: String },
}

/// Errors from the instrument resolver boundary.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Symbol is not of the form `EXCHANGE:TRADINGSYMBOL`.
    #[error("invalid instrument format: {0}")]
    InvalidFormat(String),

    /// No token is known for the symbol. Fails the whole resolve call —
    /// partial subscription sets are never accepted silently.
    #[error("instrument not found: {0}")]
    NotFound(String),

    /// The backing store rejected a read or write.
    #[error("instrument store error: {0}")]
    Store(String),
}

/// Errors from the pub/sub transport boundary.
///
/// On the tick path these are absorbed and logged — a single failed publish
/// never tears down the session.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The envelope could not be serialized.
    #[error("failed to serialize envelope: {0}")]
    Serialize(String),

    /// The transport refused the payload.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Umbrella error for the service facade, which crosses the resolver and
/// registry boundaries in one call.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
