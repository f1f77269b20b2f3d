//! Market data structures — the tick payload and the outbound envelope.
//!
//! # Timestamp convention
//!
//! All timestamps are **microseconds since Unix epoch** (us). The envelope's
//! `published_at` is stamped locally at publish time; `exchange_timestamp`
//! is whatever the upstream reported, carried through untouched.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tick — raw upstream payload
// ---------------------------------------------------------------------------

/// Open/high/low/close snapshot carried on quote and full-mode ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// One raw market data tick as delivered by the upstream streaming client.
///
/// The tick identifies its instrument only by numeric token; the session's
/// token map supplies the human-readable identity when the tick is
/// republished.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument_token: u32,
    pub last_price: f64,
    #[serde(default)]
    pub last_traded_quantity: u32,
    #[serde(default)]
    pub average_traded_price: f64,
    #[serde(default)]
    pub volume_traded: u32,
    #[serde(default)]
    pub total_buy_quantity: u32,
    #[serde(default)]
    pub total_sell_quantity: u32,
    #[serde(default)]
    pub ohlc: Ohlc,
    /// Upstream event time in microseconds, if the exchange reported one.
    #[serde(default)]
    pub exchange_timestamp: Option<u64>,
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tick(token={} ltp={:.2} vol={})",
            self.instrument_token, self.last_price, self.volume_traded
        )
    }
}

// ---------------------------------------------------------------------------
// TickEnvelope — outbound unit
// ---------------------------------------------------------------------------

/// The serialized unit published once per upstream tick.
///
/// Produced, published on the tenant's channel, then discarded — envelopes
/// are never retained (at-most-once, best-effort delivery).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickEnvelope {
    pub exchange: String,
    pub trading_symbol: String,
    /// Local publish time, microseconds since Unix epoch.
    pub published_at: u64,
    /// The raw tick payload as received from the upstream client.
    pub tick: Tick,
}
