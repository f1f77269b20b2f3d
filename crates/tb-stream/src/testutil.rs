//! Scripted collaborator doubles shared by the crate's tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::bail;
use async_trait::async_trait;
use tb_core::types::{Mode, TickerInstrument};

use crate::client::{TickerClient, TickerClientFactory, TickerSink};

/// Failure script for a [`ScriptedTicker`].
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Fire `on_connect` immediately when served.
    pub connect: bool,
    pub fail_subscribe: bool,
    pub fail_set_mode: bool,
    pub fail_unsubscribe: bool,
    pub fail_close: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            connect: true,
            fail_subscribe: false,
            fail_set_mode: false,
            fail_unsubscribe: false,
            fail_close: false,
        }
    }
}

/// In-process ticker client driven by a [`Behavior`] script. Retains its
/// sink so tests can emit callback sequences by hand.
pub struct ScriptedTicker {
    behavior: Behavior,
    sink: Arc<dyn TickerSink>,
    subscribed: Mutex<Vec<u32>>,
    mode: Mutex<Option<Mode>>,
    stopped: AtomicBool,
    closed: AtomicBool,
}

impl ScriptedTicker {
    pub fn sink(&self) -> Arc<dyn TickerSink> {
        Arc::clone(&self.sink)
    }

    pub fn subscribed(&self) -> Vec<u32> {
        self.subscribed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn mode(&self) -> Option<Mode> {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl TickerClient for ScriptedTicker {
    fn serve(&self) {
        if self.behavior.connect {
            self.sink.on_connect();
        }
    }

    async fn subscribe(&self, tokens: &[u32]) -> anyhow::Result<()> {
        if self.behavior.fail_subscribe {
            bail!("subscribe rejected");
        }
        self.subscribed.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(tokens);
        Ok(())
    }

    async fn unsubscribe(&self, tokens: &[u32]) -> anyhow::Result<()> {
        if self.behavior.fail_unsubscribe {
            bail!("unsubscribe rejected");
        }
        self.subscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|t| !tokens.contains(t));
        Ok(())
    }

    async fn set_mode(&self, mode: Mode, _tokens: &[u32]) -> anyhow::Result<()> {
        if self.behavior.fail_set_mode {
            bail!("setMode rejected");
        }
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = Some(mode);
        Ok(())
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::Release);
        if self.behavior.fail_close {
            bail!("close failed");
        }
        Ok(())
    }
}

/// Factory producing [`ScriptedTicker`]s and retaining every created client.
pub struct ScriptedFactory {
    behavior: Behavior,
    clients: Mutex<Vec<Arc<ScriptedTicker>>>,
}

impl ScriptedFactory {
    pub fn new(behavior: Behavior) -> Self {
        Self { behavior, clients: Mutex::new(Vec::new()) }
    }

    pub fn created(&self) -> usize {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clients(&self) -> Vec<Arc<ScriptedTicker>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl TickerClientFactory for ScriptedFactory {
    fn create(
        &self,
        _user_id: &str,
        _credential: &str,
        sink: Arc<dyn TickerSink>,
    ) -> Arc<dyn TickerClient> {
        let client = Arc::new(ScriptedTicker {
            behavior: self.behavior.clone(),
            sink,
            subscribed: Mutex::new(Vec::new()),
            mode: Mutex::new(None),
            stopped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).push(Arc::clone(&client));
        client
    }
}

/// Shorthand for building resolved instrument lists in tests.
pub fn insts(specs: &[(&str, &str, u32)]) -> Vec<TickerInstrument> {
    specs
        .iter()
        .map(|(exchange, symbol, token)| TickerInstrument {
            exchange: exchange.to_string(),
            trading_symbol: symbol.to_string(),
            instrument_token: *token,
        })
        .collect()
}
