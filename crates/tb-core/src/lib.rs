//! # tb-core
//!
//! Core crate for the Tickbridge streaming service, providing:
//!
//! - **Types** (`types`) — tenant keys, instruments, ticks, outbound envelopes
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific errors via thiserror
//! - **Time utilities** (`time_util`) — epoch timestamps for publish stamping
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
