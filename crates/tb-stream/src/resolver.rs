//! Instrument token resolution boundary.
//!
//! Callers name instruments as `"EXCHANGE:TRADINGSYMBOL"` strings; the
//! upstream protocol subscribes by numeric token. The resolver maps one to
//! the other and persists the active subscription set per `(user, bot)`
//! pair. Resolution is all-or-nothing: one unknown symbol fails the whole
//! call, so a session is never silently started on a partial set.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use ahash::AHashMap;
use tb_core::error::ResolveError;
use tb_core::types::TickerInstrument;

/// Resolver boundary consumed by the service facade.
pub trait InstrumentResolver: Send + Sync {
    /// Map symbols to resolved instruments, in input order.
    fn resolve(&self, symbols: &[String]) -> Result<Vec<TickerInstrument>, ResolveError>;

    /// Merge `instruments` into the persisted subscription set for the
    /// tenant (upsert by token).
    fn save_subscriptions(
        &self,
        user_id: &str,
        bot_id: &str,
        instruments: &[TickerInstrument],
    ) -> Result<(), ResolveError>;

    /// The full persisted subscription set for the tenant — everything ever
    /// saved, which is what the session actually subscribes to.
    fn load_subscriptions(
        &self,
        user_id: &str,
        bot_id: &str,
    ) -> Result<Vec<TickerInstrument>, ResolveError>;
}

// ---------------------------------------------------------------------------
// CatalogResolver
// ---------------------------------------------------------------------------

/// Resolver over a static instrument catalog.
///
/// The catalog is a JSON array of [`TickerInstrument`] records. Subscription
/// sets are kept in memory; durable storage of the catalog itself is the
/// operator's concern.
pub struct CatalogResolver {
    tokens: AHashMap<(String, String), u32>,
    subscriptions: Mutex<HashMap<(String, String), Vec<TickerInstrument>>>,
}

impl CatalogResolver {
    pub fn new(catalog: Vec<TickerInstrument>) -> Self {
        let mut tokens = AHashMap::with_capacity(catalog.len());
        for inst in catalog {
            tokens.insert((inst.exchange, inst.trading_symbol), inst.instrument_token);
        }
        Self { tokens, subscriptions: Mutex::new(HashMap::new()) }
    }

    /// Load a catalog from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog: Vec<TickerInstrument> = serde_json::from_str(&content)?;
        Ok(Self::new(catalog))
    }
}

impl InstrumentResolver for CatalogResolver {
    fn resolve(&self, symbols: &[String]) -> Result<Vec<TickerInstrument>, ResolveError> {
        let mut resolved = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let parts: Vec<&str> = symbol.split(':').collect();
            if parts.len() != 2 {
                return Err(ResolveError::InvalidFormat(symbol.clone()));
            }
            let (exchange, trading_symbol) = (parts[0], parts[1]);

            let token = self
                .tokens
                .get(&(exchange.to_string(), trading_symbol.to_string()))
                .copied()
                .ok_or_else(|| ResolveError::NotFound(symbol.clone()))?;

            resolved.push(TickerInstrument {
                exchange: exchange.to_string(),
                trading_symbol: trading_symbol.to_string(),
                instrument_token: token,
            });
        }
        Ok(resolved)
    }

    fn save_subscriptions(
        &self,
        user_id: &str,
        bot_id: &str,
        instruments: &[TickerInstrument],
    ) -> Result<(), ResolveError> {
        let mut subs = self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        let set = subs.entry((user_id.to_string(), bot_id.to_string())).or_default();
        for inst in instruments {
            match set.iter_mut().find(|s| s.instrument_token == inst.instrument_token) {
                Some(existing) => *existing = inst.clone(),
                None => set.push(inst.clone()),
            }
        }
        Ok(())
    }

    fn load_subscriptions(
        &self,
        user_id: &str,
        bot_id: &str,
    ) -> Result<Vec<TickerInstrument>, ResolveError> {
        let subs = self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(subs.get(&(user_id.to_string(), bot_id.to_string())).cloned().unwrap_or_default())
    }
}
