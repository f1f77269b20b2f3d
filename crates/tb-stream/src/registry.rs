//! Session registry — the single source of truth for active sessions.
//!
//! One exclusive lock covers the whole table. Start and stop are serialized
//! with respect to each other, but the connect handshake runs outside the
//! lock: `start` reserves the tenant's slot under the lock, releases it for
//! the bounded connect wait, then re-acquires it to commit or roll back.
//! The reservation keeps the per-user limit check atomic across concurrent
//! `start` calls without starving other tenants for up to the full connect
//! timeout.
//!
//! Sink callbacks never take the table lock — each session's sink owns
//! everything its callbacks touch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ahash::AHashMap;
use tb_core::config::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_SESSIONS_PER_USER};
use tb_core::error::SessionError;
use tb_core::types::{EventLevel, InstrumentId, Mode, TenantKey, TickerInstrument};
use tokio::sync::watch;

use crate::client::{TickerClient, TickerClientFactory};
use crate::dispatcher::SessionSink;
use crate::events::EventLog;
use crate::transport::TickPublisher;

/// Policy knobs of the registry.
#[derive(Debug, Clone)]
pub struct RegistryPolicy {
    /// Cap on concurrent sessions per user id, counted by exact identity.
    pub max_sessions_per_user: usize,
    /// Bound on the wait for the first connect signal.
    pub connect_timeout: Duration,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            max_sessions_per_user: DEFAULT_MAX_SESSIONS_PER_USER,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// One active streaming session. Owned exclusively by the registry.
struct Session {
    user_id: String,
    client: Arc<dyn TickerClient>,
    token_map: Arc<AHashMap<u32, InstrumentId>>,
    degraded: Arc<AtomicBool>,
}

#[derive(Default)]
struct Table {
    sessions: HashMap<TenantKey, Session>,
    /// Tenants with a `start` in flight (slot reserved, not yet committed),
    /// mapped to the owning user id for limit counting.
    pending: HashMap<TenantKey, String>,
}

impl Table {
    /// Live + pending sessions for a user, by exact user-id equality.
    fn user_count(&self, user_id: &str) -> usize {
        self.sessions.values().filter(|s| s.user_id == user_id).count()
            + self.pending.values().filter(|u| u.as_str() == user_id).count()
    }
}

/// Concurrency-guarded table of active sessions keyed by tenant identity.
pub struct SessionRegistry {
    table: Mutex<Table>,
    policy: RegistryPolicy,
    factory: Arc<dyn TickerClientFactory>,
    transport: Arc<dyn TickPublisher>,
    events: Arc<dyn EventLog>,
}

impl SessionRegistry {
    pub fn new(
        policy: RegistryPolicy,
        factory: Arc<dyn TickerClientFactory>,
        transport: Arc<dyn TickPublisher>,
        events: Arc<dyn EventLog>,
    ) -> Self {
        Self { table: Mutex::new(Table::default()), policy, factory, transport, events }
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a streaming session for `(user_id, bot_id)`.
    ///
    /// On success exactly one session exists under the tenant key and its
    /// token map mirrors `instruments`. On any failure nothing is stored,
    /// no client is left running, and the reserved slot is released.
    pub async fn start(
        &self,
        user_id: &str,
        bot_id: &str,
        credential: &str,
        instruments: &[TickerInstrument],
    ) -> Result<(), SessionError> {
        let key = TenantKey::new(user_id, bot_id);

        if instruments.is_empty() {
            return Err(SessionError::EmptyInstruments { key: key.to_string() });
        }

        // Reserve the slot. The lock is dropped before the handshake wait.
        {
            let mut table = self.table();
            if table.sessions.contains_key(&key) || table.pending.contains_key(&key) {
                return Err(SessionError::AlreadyActive { key: key.to_string() });
            }
            if table.user_count(user_id) >= self.policy.max_sessions_per_user {
                return Err(SessionError::LimitExceeded { user_id: user_id.to_string() });
            }
            table.pending.insert(key.clone(), user_id.to_string());
        }

        let mut tokens = Vec::with_capacity(instruments.len());
        let mut token_map = AHashMap::with_capacity(instruments.len());
        for inst in instruments {
            tokens.push(inst.instrument_token);
            token_map.insert(inst.instrument_token, inst.id());
        }
        let token_map = Arc::new(token_map);

        let (connected_tx, mut connected_rx) = watch::channel(false);
        let degraded = Arc::new(AtomicBool::new(false));
        let sink = Arc::new(SessionSink::new(
            key.clone(),
            Arc::clone(&token_map),
            Arc::clone(&self.transport),
            Arc::clone(&self.events),
            connected_tx,
            Arc::clone(&degraded),
        ));

        let client = self.factory.create(user_id, credential, sink);
        client.serve();

        // Bounded wait for the first connect signal. A dead client task
        // (dropped sender) is treated the same as a timeout.
        let connected = matches!(
            tokio::time::timeout(self.policy.connect_timeout, connected_rx.wait_for(|c| *c)).await,
            Ok(Ok(_))
        );
        if !connected {
            self.discard(&key, &client).await;
            return Err(SessionError::ConnectTimeout { key: key.to_string() });
        }

        if let Err(e) = client.subscribe(&tokens).await {
            self.discard(&key, &client).await;
            return Err(SessionError::Subscription { key: key.to_string(), reason: e.to_string() });
        }

        if let Err(e) = client.set_mode(Mode::Full, &tokens).await {
            self.discard(&key, &client).await;
            return Err(SessionError::SetMode { key: key.to_string(), reason: e.to_string() });
        }

        // Commit: swap the reservation for the live session.
        {
            let mut table = self.table();
            table.pending.remove(&key);
            table.sessions.insert(
                key.clone(),
                Session { user_id: user_id.to_string(), client, token_map, degraded },
            );
        }

        self.events.log(user_id, bot_id, EventLevel::Info, "StartTicker", "ticker started successfully");
        Ok(())
    }

    /// Stop the session for `(user_id, bot_id)`.
    ///
    /// The registry entry is removed unconditionally; unsubscribe and close
    /// failures are logged and otherwise ignored.
    pub async fn stop(&self, user_id: &str, bot_id: &str) -> Result<(), SessionError> {
        let key = TenantKey::new(user_id, bot_id);

        let session = self.table().sessions.remove(&key);
        let Some(session) = session else {
            return Err(SessionError::NotFound {
                user_id: user_id.to_string(),
                bot_id: bot_id.to_string(),
            });
        };

        let tokens: Vec<u32> = session.token_map.keys().copied().collect();
        if !tokens.is_empty() {
            if let Err(e) = session.client.unsubscribe(&tokens).await {
                self.events.log(
                    user_id,
                    bot_id,
                    EventLevel::Error,
                    "StopTicker",
                    &format!("failed to unsubscribe: {e}"),
                );
            }
        }

        session.client.stop().await;
        if let Err(e) = session.client.close().await {
            self.events.log(
                user_id,
                bot_id,
                EventLevel::Error,
                "StopTicker",
                &format!("failed to close connection: {e}"),
            );
        }

        self.events.log(user_id, bot_id, EventLevel::Info, "StopTicker", "ticker stopped successfully");
        Ok(())
    }

    /// Close every live client without clearing the table. Process
    /// termination only — not safe to race with `start`.
    pub async fn shutdown_all(&self) {
        let clients: Vec<Arc<dyn TickerClient>> =
            self.table().sessions.values().map(|s| Arc::clone(&s.client)).collect();
        for client in clients {
            let _ = client.close().await;
        }
    }

    /// Pub/sub channel the tenant's ticks are published on.
    pub fn ticks_channel(&self, user_id: &str, bot_id: &str) -> String {
        TenantKey::new(user_id, bot_id).ticks_channel()
    }

    /// Number of live sessions for a user, by exact user-id equality.
    pub fn session_count(&self, user_id: &str) -> usize {
        self.table().sessions.values().filter(|s| s.user_id == user_id).count()
    }

    /// Whether a live session exists for the tenant.
    pub fn is_active(&self, user_id: &str, bot_id: &str) -> bool {
        self.table().sessions.contains_key(&TenantKey::new(user_id, bot_id))
    }

    /// Whether the tenant's session is registered but streaming-dead (the
    /// upstream client gave up reconnecting).
    pub fn is_degraded(&self, user_id: &str, bot_id: &str) -> bool {
        self.table()
            .sessions
            .get(&TenantKey::new(user_id, bot_id))
            .is_some_and(|s| s.degraded.load(Ordering::Acquire))
    }

    /// Roll back a failed start: best-effort teardown of the client, then
    /// release the reserved slot.
    async fn discard(&self, key: &TenantKey, client: &Arc<dyn TickerClient>) {
        client.stop().await;
        let _ = client.close().await;
        self.table().pending.remove(key);
    }
}
