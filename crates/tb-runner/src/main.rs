//! # tb-runner
//!
//! Main entry point for the Tickbridge service.
//!
//! Loads a JSON configuration file, wires the collaborators (Redis
//! transport, instrument catalog, WebSocket ticker factory), starts one
//! streaming session per configured `(user, bot)` pair, and manages their
//! lifecycle until shutdown.
//!
//! # Usage
//!
//! ```bash
//! tickbridge config.json --log-level info
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use tb_stream::{
    CatalogResolver, InstrumentResolver, RedisPublisher, RegistryPolicy, SessionRegistry,
    TickerService, TracingEventLog, WsTickerConfig, WsTickerFactory,
};

/// Tickbridge market data streaming service.
#[derive(Parser)]
#[command(name = "tickbridge", about = "Market data tick streaming service")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    tb_core::logging::init_logging(&cli.log_level, cli.log_dir.as_deref(), "tb-runner");

    info!("tb-runner starting — config={}, log_level={}", cli.config.display(), cli.log_level,);

    // 2. Load configuration
    let config = tb_core::config::load_config(&cli.config)?;
    info!("config loaded — {} session(s) to start", config.sessions.len(),);

    // 3. Wire the collaborators
    let redis_addr = config.redis_addr.as_deref().context("redis_addr is required")?;
    let transport = Arc::new(RedisPublisher::connect(redis_addr)?);
    info!("connected to Redis at {redis_addr}");

    let resolver: Arc<dyn InstrumentResolver> = match &config.instrument_catalog {
        Some(path) => {
            let resolver = CatalogResolver::from_file(path)
                .with_context(|| format!("failed to load instrument catalog {}", path.display()))?;
            info!("instrument catalog loaded from {}", path.display());
            Arc::new(resolver)
        }
        None => Arc::new(CatalogResolver::new(Vec::new())),
    };

    let ticker = config.ticker.as_ref().context("ticker endpoint is required")?;
    let factory = Arc::new(WsTickerFactory::new(WsTickerConfig {
        url: ticker.url.clone(),
        max_reconnect_attempts: ticker.effective_max_reconnect_attempts(),
    }));

    let policy = RegistryPolicy {
        max_sessions_per_user: config.effective_max_sessions(),
        connect_timeout: config.effective_connect_timeout(),
    };
    let registry = Arc::new(SessionRegistry::new(
        policy,
        factory,
        transport,
        Arc::new(TracingEventLog),
    ));
    let service = TickerService::new(registry, resolver);

    // 4. Start the configured sessions
    for (idx, session) in config.sessions.iter().enumerate() {
        match service
            .publish_ticks(&session.user_id, &session.enctoken, &session.bot_id, &session.instruments)
            .await
        {
            Ok(summary) => {
                info!(
                    "session[{idx}]: {}:{} streaming {} instrument(s) on {}",
                    session.user_id, session.bot_id, summary.subscribed_count, summary.published_channel,
                );
            }
            Err(e) => {
                error!("session[{idx}]: failed to start for {}:{}: {e}", session.user_id, session.bot_id,);
            }
        }
    }

    info!("tickbridge running — press Ctrl+C to stop");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 6. Close all live sessions
    service.shutdown().await;

    info!("all sessions closed — goodbye");
    Ok(())
}
