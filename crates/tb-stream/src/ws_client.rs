//! WebSocket-backed streaming client with auto-reconnect.
//!
//! The production implementation of [`TickerClient`]. A background tokio
//! task owns the connection:
//! 1. Connects to the tick endpoint (TLS) with the user's credential.
//! 2. Replays the current subscription set and mode after every handshake.
//! 3. Parses tick frames and feeds them to the session's [`TickerSink`].
//! 4. Reconnects on disconnection with exponential backoff, giving up after
//!    a configurable number of consecutive failures.
//!
//! Control frames are JSON: `{"a":"subscribe","v":[…]}`,
//! `{"a":"unsubscribe","v":[…]}`, `{"a":"mode","v":["full",[…]]}`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tb_core::config::DEFAULT_MAX_RECONNECT_ATTEMPTS;
use tb_core::types::{Mode, Tick};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::client::{FrameKind, TickerClient, TickerClientFactory, TickerSink};

/// Configuration for the WebSocket ticker client.
#[derive(Debug, Clone)]
pub struct WsTickerConfig {
    /// Tick stream endpoint (e.g. `wss://ticks.example.com/ws`).
    pub url: String,
    /// Consecutive failed reconnects before giving up.
    pub max_reconnect_attempts: u32,
}

impl WsTickerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS }
    }
}

/// Subscription state replayed after every reconnect.
#[derive(Default)]
struct SubState {
    tokens: Vec<u32>,
    mode: Option<Mode>,
}

/// A streaming connection managed by a background tokio task.
pub struct WsTickerClient {
    endpoint: String,
    max_reconnect_attempts: u32,
    sink: Arc<dyn TickerSink>,
    subs: Arc<Mutex<SubState>>,
    outbound_tx: mpsc::Sender<String>,
    /// Taken by the first `serve()` call.
    outbound_rx: Mutex<Option<mpsc::Receiver<String>>>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl WsTickerClient {
    pub fn new(
        config: &WsTickerConfig,
        user_id: &str,
        credential: &str,
        sink: Arc<dyn TickerSink>,
    ) -> Self {
        let endpoint = format!(
            "{}?user_id={}&enctoken={}",
            config.url,
            urlencoding::encode(user_id),
            urlencoding::encode(credential),
        );
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(64);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            endpoint,
            max_reconnect_attempts: config.max_reconnect_attempts,
            sink,
            subs: Arc::new(Mutex::new(SubState::default())),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    async fn send(&self, msg: String) -> anyhow::Result<()> {
        self.outbound_tx.send(msg).await.map_err(|_| anyhow!("connection task is gone"))
    }
}

#[async_trait]
impl TickerClient for WsTickerClient {
    fn serve(&self) {
        let rx = self.outbound_rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(outbound_rx) = rx else {
            return; // already serving
        };

        let task = tokio::spawn(connection_loop(
            self.endpoint.clone(),
            self.max_reconnect_attempts,
            Arc::clone(&self.sink),
            Arc::clone(&self.subs),
            outbound_rx,
            self.shutdown_tx.subscribe(),
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    async fn subscribe(&self, tokens: &[u32]) -> anyhow::Result<()> {
        {
            let mut subs = self.subs.lock().unwrap_or_else(PoisonError::into_inner);
            for token in tokens {
                if !subs.tokens.contains(token) {
                    subs.tokens.push(*token);
                }
            }
        }
        self.send(control_msg("subscribe", tokens)).await
    }

    async fn unsubscribe(&self, tokens: &[u32]) -> anyhow::Result<()> {
        {
            let mut subs = self.subs.lock().unwrap_or_else(PoisonError::into_inner);
            subs.tokens.retain(|t| !tokens.contains(t));
        }
        self.send(control_msg("unsubscribe", tokens)).await
    }

    async fn set_mode(&self, mode: Mode, tokens: &[u32]) -> anyhow::Result<()> {
        {
            let mut subs = self.subs.lock().unwrap_or_else(PoisonError::into_inner);
            subs.mode = Some(mode);
        }
        self.send(mode_msg(mode, tokens)).await
    }

    async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn close(&self) -> anyhow::Result<()> {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.await.map_err(|e| anyhow!("connection task failed: {e}"))?;
        }
        Ok(())
    }
}

fn control_msg(action: &str, tokens: &[u32]) -> String {
    serde_json::json!({ "a": action, "v": tokens }).to_string()
}

fn mode_msg(mode: Mode, tokens: &[u32]) -> String {
    serde_json::json!({ "a": "mode", "v": [mode.as_str(), tokens] }).to_string()
}

/// Main connection loop — connects, replays subscriptions, reads, reconnects.
async fn connection_loop(
    endpoint: String,
    max_reconnect_attempts: u32,
    sink: Arc<dyn TickerSink>,
    subs: Arc<Mutex<SubState>>,
    mut outbound_rx: mpsc::Receiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(30);
    let mut attempt: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        let ws_stream = match tokio_tungstenite::connect_async(endpoint.as_str()).await {
            Ok((stream, _response)) => {
                attempt = 0;
                backoff = Duration::from_millis(100);
                stream
            }
            Err(e) => {
                sink.on_error(&format!("connection failed: {e}"));
                attempt += 1;
                if attempt >= max_reconnect_attempts {
                    sink.on_no_reconnect(attempt);
                    return;
                }
                sink.on_reconnect(attempt, backoff);
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown_rx.changed() => return,
                }
                backoff = (backoff * 2).min(max_backoff);
                continue;
            }
        };

        sink.on_connect();

        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Replay the current subscription set and mode. On the very first
        // connect this is a no-op — the registry subscribes after the
        // connect signal.
        let (sub_msg, mode_replay) = {
            let subs = subs.lock().unwrap_or_else(PoisonError::into_inner);
            let sub = (!subs.tokens.is_empty()).then(|| control_msg("subscribe", &subs.tokens));
            let mode = subs.mode.map(|m| mode_msg(m, &subs.tokens));
            (sub, mode)
        };
        let mut replay_ok = true;
        for msg in [sub_msg, mode_replay].into_iter().flatten() {
            if let Err(e) = ws_write.send(Message::Text(msg.into())).await {
                sink.on_error(&format!("subscribe replay failed: {e}"));
                replay_ok = false;
                break;
            }
        }
        if !replay_ok {
            continue;
        }

        // Main read/write loop.
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    let _ = ws_write.close().await;
                    return;
                }

                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<Tick>(text.as_str()) {
                                Ok(tick) => sink.on_tick(tick),
                                // Not a tick — postback or server notice.
                                Err(_) => sink.on_message(FrameKind::Text, text.as_bytes()),
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            sink.on_message(FrameKind::Binary, &data);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.to_string()))
                                .unwrap_or((1005, String::new()));
                            sink.on_close(code, &reason);
                            break;
                        }
                        Some(Err(e)) => {
                            sink.on_error(&format!("read error: {e}"));
                            break;
                        }
                        None => {
                            sink.on_close(1006, "stream ended");
                            break;
                        }
                        _ => {} // Pong, Frame — ignore
                    }
                }

                Some(msg) = outbound_rx.recv() => {
                    if let Err(e) = ws_write.send(Message::Text(msg.into())).await {
                        sink.on_error(&format!("send error: {e}"));
                        break;
                    }
                }
            }
        }

        // Disconnected — retry with backoff at the top of the outer loop.
        attempt += 1;
        if attempt >= max_reconnect_attempts {
            sink.on_no_reconnect(attempt);
            return;
        }
        sink.on_reconnect(attempt, backoff);
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown_rx.changed() => return,
        }
        backoff = (backoff * 2).min(max_backoff);
    }
}

/// Factory producing [`WsTickerClient`]s — one per session start.
pub struct WsTickerFactory {
    config: WsTickerConfig,
}

impl WsTickerFactory {
    pub fn new(config: WsTickerConfig) -> Self {
        Self { config }
    }
}

impl TickerClientFactory for WsTickerFactory {
    fn create(
        &self,
        user_id: &str,
        credential: &str,
        sink: Arc<dyn TickerSink>,
    ) -> Arc<dyn TickerClient> {
        Arc::new(WsTickerClient::new(&self.config, user_id, credential, sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_messages_wire_form() {
        assert_eq!(control_msg("subscribe", &[408065, 2953217]), r#"{"a":"subscribe","v":[408065,2953217]}"#);
        assert_eq!(control_msg("unsubscribe", &[408065]), r#"{"a":"unsubscribe","v":[408065]}"#);
        assert_eq!(mode_msg(Mode::Full, &[408065]), r#"{"a":"mode","v":["full",[408065]]}"#);
    }

    #[test]
    fn endpoint_encodes_credentials() {
        struct NullSink;
        impl TickerSink for NullSink {
            fn on_connect(&self) {}
            fn on_tick(&self, _tick: Tick) {}
            fn on_error(&self, _message: &str) {}
            fn on_close(&self, _code: u16, _reason: &str) {}
            fn on_reconnect(&self, _attempt: u32, _delay: Duration) {}
            fn on_no_reconnect(&self, _attempt: u32) {}
            fn on_message(&self, _kind: FrameKind, _payload: &[u8]) {}
        }

        let config = WsTickerConfig::new("wss://ticks.example.com/ws");
        let client = WsTickerClient::new(&config, "U1", "a+b/c=", Arc::new(NullSink));
        assert_eq!(
            client.endpoint,
            "wss://ticks.example.com/ws?user_id=U1&enctoken=a%2Bb%2Fc%3D"
        );
    }

    #[test]
    fn tick_frame_parses() {
        let tick: Tick = serde_json::from_str(
            r#"{"instrument_token":408065,"last_price":1431.5,"volume_traded":42}"#,
        )
        .unwrap();
        assert_eq!(tick.instrument_token, 408065);
        assert_eq!(tick.volume_traded, 42);
    }
}
