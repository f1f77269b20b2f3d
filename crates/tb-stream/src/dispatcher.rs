//! Per-session callback dispatch.
//!
//! [`SessionSink`] is the [`TickerSink`] wired into one session's streaming
//! client. It owns everything a callback needs — the immutable token map,
//! the transport, the event log — so callbacks never touch the registry
//! table. Tick-path failures (unknown token, serialization, publish) are
//! absorbed: one event is logged, the tick is dropped, the session streams
//! on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use tb_core::time_util;
use tb_core::types::{EventLevel, InstrumentId, TenantKey, Tick, TickEnvelope};
use tokio::sync::watch;

use crate::client::{FrameKind, TickerSink};
use crate::events::EventLog;
use crate::transport::TickPublisher;

/// Callback handler for one streaming session.
pub struct SessionSink {
    key: TenantKey,
    channel: String,
    token_map: Arc<AHashMap<u32, InstrumentId>>,
    transport: Arc<dyn TickPublisher>,
    events: Arc<dyn EventLog>,
    connected: watch::Sender<bool>,
    degraded: Arc<AtomicBool>,
}

impl SessionSink {
    pub fn new(
        key: TenantKey,
        token_map: Arc<AHashMap<u32, InstrumentId>>,
        transport: Arc<dyn TickPublisher>,
        events: Arc<dyn EventLog>,
        connected: watch::Sender<bool>,
        degraded: Arc<AtomicBool>,
    ) -> Self {
        let channel = key.ticks_channel();
        Self { key, channel, token_map, transport, events, connected, degraded }
    }

    fn event(&self, level: EventLevel, event_type: &str, message: &str) {
        self.events.log(self.key.user_id(), self.key.bot_id(), level, event_type, message);
    }
}

impl TickerSink for SessionSink {
    fn on_connect(&self) {
        // Release the registry's bounded connect wait. Reconnects re-send
        // true, which is a no-op for the (long gone) waiter.
        let _ = self.connected.send(true);
        self.event(EventLevel::Info, "onConnect", "connected to ticker");
    }

    fn on_tick(&self, tick: Tick) {
        let Some(instrument) = self.token_map.get(&tick.instrument_token) else {
            self.event(
                EventLevel::Error,
                "onTick",
                &format!("unknown instrument token: {}", tick.instrument_token),
            );
            return;
        };

        let envelope = TickEnvelope {
            exchange: instrument.exchange.clone(),
            trading_symbol: instrument.trading_symbol.clone(),
            published_at: time_util::now_us(),
            tick,
        };

        let payload = match serde_json::to_vec(&envelope) {
            Ok(p) => p,
            Err(e) => {
                self.event(EventLevel::Error, "onTick", &format!("failed to marshal tick: {e}"));
                return;
            }
        };

        if let Err(e) = self.transport.publish(&self.channel, &payload) {
            self.event(EventLevel::Error, "PublishTicks", &format!("failed to publish tick: {e}"));
        }
    }

    fn on_error(&self, message: &str) {
        self.event(EventLevel::Error, "onError", message);
    }

    fn on_close(&self, code: u16, reason: &str) {
        self.event(
            EventLevel::Info,
            "onClose",
            &format!("connection closed: code={code}, reason={reason}"),
        );
    }

    fn on_reconnect(&self, attempt: u32, delay: Duration) {
        self.event(
            EventLevel::Info,
            "onReconnect",
            &format!("reconnecting to ticker, attempt {attempt}, delay: {delay:?}"),
        );
    }

    fn on_no_reconnect(&self, attempt: u32) {
        // Terminal for the connection; the session stays registered (and
        // keeps its concurrency slot) until an explicit stop.
        self.degraded.store(true, Ordering::Release);
        self.event(EventLevel::Info, "onNoReconnect", &format!("no reconnect after {attempt} attempts"));
    }

    fn on_message(&self, kind: FrameKind, payload: &[u8]) {
        // Text frames only — binary frames are tick data already handled
        // upstream of this callback.
        if kind == FrameKind::Text {
            let text = String::from_utf8_lossy(payload);
            self.event(EventLevel::Info, "onMessage", &format!("received message: {text}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_core::error::PublishError;

    use crate::events::MemoryEventLog;
    use crate::transport::MemoryPubSub;

    fn token_map() -> Arc<AHashMap<u32, InstrumentId>> {
        let mut map = AHashMap::new();
        map.insert(
            408065,
            InstrumentId { exchange: "NSE".to_string(), trading_symbol: "INFY".to_string() },
        );
        Arc::new(map)
    }

    fn sink_with(
        transport: Arc<dyn TickPublisher>,
    ) -> (SessionSink, Arc<MemoryEventLog>, watch::Receiver<bool>, Arc<AtomicBool>) {
        let events = Arc::new(MemoryEventLog::new());
        let degraded = Arc::new(AtomicBool::new(false));
        let (connected_tx, connected_rx) = watch::channel(false);
        let sink = SessionSink::new(
            TenantKey::new("U1", "B1"),
            token_map(),
            transport,
            Arc::clone(&events) as Arc<dyn EventLog>,
            connected_tx,
            Arc::clone(&degraded),
        );
        (sink, events, connected_rx, degraded)
    }

    #[tokio::test]
    async fn tick_published_on_tenant_channel() {
        let bus = Arc::new(MemoryPubSub::new());
        let mut rx = bus.subscribe("CH:TICKS:U1:B1");
        let (sink, events, _, _) = sink_with(bus);

        sink.on_tick(Tick { instrument_token: 408065, last_price: 1431.5, ..Tick::default() });

        let payload = rx.recv().await.unwrap();
        let envelope: TickEnvelope = serde_json::from_slice(&payload).unwrap();
        assert_eq!(envelope.exchange, "NSE");
        assert_eq!(envelope.trading_symbol, "INFY");
        assert_eq!(envelope.tick.instrument_token, 408065);
        assert!(envelope.published_at > 0);
        assert_eq!(events.count_of("PublishTicks"), 0);
    }

    #[tokio::test]
    async fn unknown_token_dropped_with_one_event() {
        let bus = Arc::new(MemoryPubSub::new());
        let mut rx = bus.subscribe("CH:TICKS:U1:B1");
        let (sink, events, _, _) = sink_with(bus);

        sink.on_tick(Tick { instrument_token: 999, ..Tick::default() });

        assert!(rx.try_recv().is_err(), "unknown-token tick must not be published");
        let records = events.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "onTick");
        assert_eq!(records[0].level, EventLevel::Error);
        assert!(records[0].message.contains("999"));
    }

    #[test]
    fn publish_failure_absorbed() {
        struct FailingPublisher;
        impl TickPublisher for FailingPublisher {
            fn publish(&self, _channel: &str, _payload: &[u8]) -> Result<(), PublishError> {
                Err(PublishError::Transport("connection refused".to_string()))
            }
        }

        let (sink, events, _, _) = sink_with(Arc::new(FailingPublisher));
        sink.on_tick(Tick { instrument_token: 408065, ..Tick::default() });

        assert_eq!(events.count_of("PublishTicks"), 1);
    }

    #[test]
    fn connect_signals_waiter() {
        let bus = Arc::new(MemoryPubSub::new());
        let (sink, _, connected_rx, _) = sink_with(bus);

        assert!(!*connected_rx.borrow());
        sink.on_connect();
        assert!(*connected_rx.borrow());
    }

    #[test]
    fn no_reconnect_marks_degraded() {
        let bus = Arc::new(MemoryPubSub::new());
        let (sink, events, _, degraded) = sink_with(bus);

        sink.on_no_reconnect(50);
        assert!(degraded.load(Ordering::Acquire));
        assert_eq!(events.count_of("onNoReconnect"), 1);
    }
}
