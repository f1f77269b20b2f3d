//! Service facade — resolution glue in front of the registry.
//!
//! `publish_ticks` is the one call a caller needs: it resolves symbols to
//! tokens, persists the tenant's subscription set, starts the session with
//! the full persisted set, and reports the channel the ticks land on.

use std::sync::Arc;

use tb_core::error::ServiceError;

use crate::registry::SessionRegistry;
use crate::resolver::InstrumentResolver;

/// What a successful `publish_ticks` call bought the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishSummary {
    /// Channel the tenant's ticks are published on.
    pub published_channel: String,
    /// Number of instruments the session is subscribed to.
    pub subscribed_count: usize,
}

/// Facade over the resolver and the session registry.
pub struct TickerService {
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn InstrumentResolver>,
}

impl TickerService {
    pub fn new(registry: Arc<SessionRegistry>, resolver: Arc<dyn InstrumentResolver>) -> Self {
        Self { registry, resolver }
    }

    /// Resolve `symbols`, persist them for the tenant, and start streaming.
    ///
    /// The session subscribes to the tenant's full persisted set — prior
    /// subscriptions saved for the same `(user, bot)` pair are included.
    /// One unresolvable symbol fails the whole call; nothing is started.
    pub async fn publish_ticks(
        &self,
        user_id: &str,
        credential: &str,
        bot_id: &str,
        symbols: &[String],
    ) -> Result<PublishSummary, ServiceError> {
        let resolved = self.resolver.resolve(symbols)?;
        self.resolver.save_subscriptions(user_id, bot_id, &resolved)?;
        let active = self.resolver.load_subscriptions(user_id, bot_id)?;

        self.registry.start(user_id, bot_id, credential, &active).await?;

        Ok(PublishSummary {
            published_channel: self.registry.ticks_channel(user_id, bot_id),
            subscribed_count: active.len(),
        })
    }

    /// Stop the tenant's session.
    pub async fn stop_ticks(&self, user_id: &str, bot_id: &str) -> Result<(), ServiceError> {
        self.registry.stop(user_id, bot_id).await?;
        Ok(())
    }

    /// Close every live session (process termination).
    pub async fn shutdown(&self) {
        self.registry.shutdown_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tb_core::error::{ResolveError, SessionError};
    use tb_core::types::TickerInstrument;

    use crate::client::{TickerClientFactory, TickerSink};
    use crate::events::{EventLog, MemoryEventLog};
    use crate::registry::RegistryPolicy;
    use crate::resolver::CatalogResolver;
    use crate::testutil::{Behavior, ScriptedFactory};
    use crate::transport::{MemoryPubSub, TickPublisher};

    fn catalog() -> Vec<TickerInstrument> {
        vec![
            TickerInstrument {
                exchange: "NSE".to_string(),
                trading_symbol: "INFY".to_string(),
                instrument_token: 408065,
            },
            TickerInstrument {
                exchange: "NSE".to_string(),
                trading_symbol: "TCS".to_string(),
                instrument_token: 2953217,
            },
        ]
    }

    fn service() -> (TickerService, Arc<SessionRegistry>, Arc<ScriptedFactory>) {
        let factory = Arc::new(ScriptedFactory::new(Behavior::default()));
        let registry = Arc::new(SessionRegistry::new(
            RegistryPolicy::default(),
            Arc::clone(&factory) as Arc<dyn TickerClientFactory>,
            Arc::new(MemoryPubSub::new()) as Arc<dyn TickPublisher>,
            Arc::new(MemoryEventLog::new()) as Arc<dyn EventLog>,
        ));
        let resolver = Arc::new(CatalogResolver::new(catalog()));
        (TickerService::new(Arc::clone(&registry), resolver), registry, factory)
    }

    #[tokio::test]
    async fn publish_ticks_resolves_and_starts() {
        let (service, registry, factory) = service();

        let summary = service
            .publish_ticks("U1", "tok", "B1", &["NSE:INFY".to_string(), "NSE:TCS".to_string()])
            .await
            .unwrap();

        assert_eq!(summary.published_channel, "CH:TICKS:U1:B1");
        assert_eq!(summary.subscribed_count, 2);
        assert!(registry.is_active("U1", "B1"));
        assert_eq!(factory.clients()[0].subscribed().len(), 2);
    }

    #[tokio::test]
    async fn unknown_symbol_fails_whole_call_and_starts_nothing() {
        let (service, registry, factory) = service();

        let err = service
            .publish_ticks("U1", "tok", "B1", &["NSE:INFY".to_string(), "NSE:NOPE".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Resolve(ResolveError::NotFound(_))));
        assert!(!registry.is_active("U1", "B1"));
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn registry_errors_pass_through() {
        let (service, _, _) = service();

        service.publish_ticks("U1", "tok", "B1", &["NSE:INFY".to_string()]).await.unwrap();
        let err =
            service.publish_ticks("U1", "tok", "B1", &["NSE:TCS".to_string()]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Session(SessionError::AlreadyActive { .. })));
    }

    #[tokio::test]
    async fn stop_ticks_not_found() {
        let (service, _, _) = service();

        let err = service.stop_ticks("U1", "B1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Session(SessionError::NotFound { .. })));
    }

    #[tokio::test]
    async fn restart_after_stop_subscribes_accumulated_set() {
        let (service, registry, factory) = service();

        service.publish_ticks("U1", "tok", "B1", &["NSE:INFY".to_string()]).await.unwrap();
        service.stop_ticks("U1", "B1").await.unwrap();

        // The persisted set accumulates across calls for the same tenant.
        let summary =
            service.publish_ticks("U1", "tok", "B1", &["NSE:TCS".to_string()]).await.unwrap();
        assert_eq!(summary.subscribed_count, 2);
        assert!(registry.is_active("U1", "B1"));
        assert_eq!(factory.clients()[1].subscribed().len(), 2);
    }

    #[tokio::test]
    async fn subscribed_ticks_reach_the_reported_channel() {
        let factory = Arc::new(ScriptedFactory::new(Behavior::default()));
        let transport = Arc::new(MemoryPubSub::new());
        let registry = Arc::new(SessionRegistry::new(
            RegistryPolicy::default(),
            Arc::clone(&factory) as Arc<dyn TickerClientFactory>,
            Arc::clone(&transport) as Arc<dyn TickPublisher>,
            Arc::new(MemoryEventLog::new()) as Arc<dyn EventLog>,
        ));
        let service =
            TickerService::new(Arc::clone(&registry), Arc::new(CatalogResolver::new(catalog())));

        let summary =
            service.publish_ticks("U1", "tok", "B1", &["NSE:INFY".to_string()]).await.unwrap();
        let mut rx = transport.subscribe(&summary.published_channel);

        factory.clients()[0].sink().on_tick(tb_core::types::Tick {
            instrument_token: 408065,
            last_price: 1431.5,
            ..tb_core::types::Tick::default()
        });

        let envelope: tb_core::types::TickEnvelope =
            serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(envelope.trading_symbol, "INFY");
    }
}
