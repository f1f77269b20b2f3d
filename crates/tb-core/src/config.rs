//! Configuration parsing for the Tickbridge service.
//!
//! The runner reads its settings from a single JSON config file: service
//! metadata, collaborator endpoints, registry policy knobs, and a `sessions`
//! array where each entry describes one streaming session to start at boot.
//!
//! # Example config
//!
//! ```json
//! {
//!   "service": { "module_name": "tickbridge", "log_path": "/var/log/tb" },
//!   "redis_addr": "redis://127.0.0.1:6379",
//!   "max_sessions_per_user": 3,
//!   "connect_timeout_sec": 10,
//!   "ticker": { "url": "wss://ticks.example.com/ws", "max_reconnect_attempts": 50 },
//!   "instrument_catalog": "instruments.json",
//!   "sessions": [{
//!     "user_id": "U1",
//!     "bot_id": "B1",
//!     "enctoken": "…",
//!     "instruments": ["NSE:INFY", "NSE:TCS"]
//!   }]
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Default cap on concurrent sessions per user id.
pub const DEFAULT_MAX_SESSIONS_PER_USER: usize = 3;

/// Default bound on the wait for the first upstream connect signal.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default number of consecutive failed reconnect attempts before the
/// upstream client gives up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 50;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Service metadata (name, log path).
    pub service: Option<ServiceMeta>,

    /// Redis endpoint for the tick pub/sub transport.
    pub redis_addr: Option<String>,

    /// Cap on concurrent sessions per user id (default: 3).
    pub max_sessions_per_user: Option<usize>,

    /// Bound on the wait for the first connect signal (default: 10s).
    pub connect_timeout_sec: Option<u64>,

    /// Upstream streaming endpoint configuration.
    pub ticker: Option<TickerEndpoint>,

    /// Path to the JSON instrument catalog used for token resolution.
    pub instrument_catalog: Option<PathBuf>,

    /// Sessions to start at boot — one per (user, bot) pair.
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

/// Service metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Upstream streaming endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerEndpoint {
    /// WebSocket URL of the tick stream (e.g. `wss://ticks.example.com/ws`).
    pub url: String,

    /// Consecutive failed reconnects before the client gives up (default: 50).
    pub max_reconnect_attempts: Option<u32>,
}

impl TickerEndpoint {
    pub fn effective_max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts.unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS)
    }
}

/// One streaming session to start at boot.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub user_id: String,
    pub bot_id: String,
    /// Upstream authentication credential for this user.
    pub enctoken: String,
    /// Instrument symbols in `EXCHANGE:TRADINGSYMBOL` form.
    pub instruments: Vec<String>,
}

impl AppConfig {
    /// Returns the effective per-user session cap.
    pub fn effective_max_sessions(&self) -> usize {
        self.max_sessions_per_user.unwrap_or(DEFAULT_MAX_SESSIONS_PER_USER)
    }

    /// Returns the effective connect wait bound.
    pub fn effective_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_sec.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS))
    }

    /// Returns the module name from the service metadata block.
    pub fn module_name(&self) -> String {
        self.service
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "tickbridge".to_string())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.service.as_ref().and_then(|m| m.log_path.clone())
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{ "redis_addr": "redis://x" }"#).unwrap();
        assert_eq!(config.effective_max_sessions(), 3);
        assert_eq!(config.effective_connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.module_name(), "tickbridge");
        assert!(config.sessions.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "service": { "module_name": "tb-test", "log_path": "/tmp/tb" },
                "redis_addr": "redis://127.0.0.1:6379",
                "max_sessions_per_user": 5,
                "connect_timeout_sec": 3,
                "ticker": { "url": "wss://ticks.example.com/ws" },
                "instrument_catalog": "instruments.json",
                "sessions": [{
                    "user_id": "U1",
                    "bot_id": "B1",
                    "enctoken": "secret",
                    "instruments": ["NSE:INFY"]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.effective_max_sessions(), 5);
        assert_eq!(config.effective_connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.module_name(), "tb-test");
        assert_eq!(config.ticker.unwrap().effective_max_reconnect_attempts(), 50);
        assert_eq!(config.sessions.len(), 1);
        assert_eq!(config.sessions[0].instruments, vec!["NSE:INFY"]);
    }
}
