//! Lifecycle/audit event sink boundary.
//!
//! Every session lifecycle transition and every absorbed tick-path failure
//! is reported here as a structured `(user, bot, level, event_type, message)`
//! record. The sink is fire-and-forget: the core never checks whether an
//! event was durably recorded.

use std::sync::{Mutex, PoisonError};

use tb_core::types::EventLevel;
use tracing::{error, info};

/// Sink for lifecycle/audit events.
pub trait EventLog: Send + Sync {
    fn log(&self, user_id: &str, bot_id: &str, level: EventLevel, event_type: &str, message: &str);
}

/// Production sink — emits events through the `tracing` subscriber.
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn log(&self, user_id: &str, bot_id: &str, level: EventLevel, event_type: &str, message: &str) {
        match level {
            EventLevel::Info => {
                info!(user_id, bot_id, event = event_type, "{message}");
            }
            EventLevel::Error => {
                error!(user_id, bot_id, event = event_type, "{message}");
            }
        }
    }
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub user_id: String,
    pub bot_id: String,
    pub level: EventLevel,
    pub event_type: String,
    pub message: String,
}

/// Recording sink — retains every event in memory for inspection.
#[derive(Default)]
pub struct MemoryEventLog {
    records: Mutex<Vec<EventRecord>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of recorded events with the given event type.
    pub fn count_of(&self, event_type: &str) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.event_type == event_type)
            .count()
    }
}

impl EventLog for MemoryEventLog {
    fn log(&self, user_id: &str, bot_id: &str, level: EventLevel, event_type: &str, message: &str) {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).push(EventRecord {
            user_id: user_id.to_string(),
            bot_id: bot_id.to_string(),
            level,
            event_type: event_type.to_string(),
            message: message.to_string(),
        });
    }
}
