//! Instrument identity types.
//!
//! Instruments arrive from callers as `"EXCHANGE:TRADINGSYMBOL"` strings and
//! are resolved to numeric tokens before a session starts. The split into
//! exchange and symbol happens once, at resolve time — the per-tick hot path
//! only ever sees the already-split [`InstrumentId`].

use serde::{Deserialize, Serialize};

/// Human-readable instrument identity: exchange plus trading symbol.
///
/// Stored in the per-session token map to re-hydrate the identity of a tick
/// that arrives carrying only its numeric token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentId {
    pub exchange: String,
    pub trading_symbol: String,
}

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.exchange, self.trading_symbol)
    }
}

/// A fully resolved instrument: identity plus the numeric token the upstream
/// protocol subscribes with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerInstrument {
    pub exchange: String,
    pub trading_symbol: String,
    pub instrument_token: u32,
}

impl TickerInstrument {
    pub fn id(&self) -> InstrumentId {
        InstrumentId {
            exchange: self.exchange.clone(),
            trading_symbol: self.trading_symbol.clone(),
        }
    }
}
