//! Multi-bot lifecycle management.
//!
//! Creates bots from validated configs, wires them to shared venue
//! adapters through the registry, and tears both down in order: the bot
//! task first, then the adapter references.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use arb_common::LatencySummary;
use arb_exchange::{AdapterError, AdapterRegistry};

use crate::bot::{BotCommand, BotHandle, BotSupervisor};
use crate::config::{BotConfig, ConfigError, VenuesConfig};
use crate::snapshot::{BotSnapshot, Observer};

/// Errors from bot lifecycle operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("bot not found: {0}")]
    BotNotFound(String),

    #[error("a bot for {0} is already running")]
    SymbolAlreadyRunning(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
}

/// Owns every bot in the process plus the shared adapter registry.
pub struct BotManager {
    registry: Arc<AdapterRegistry>,
    venues: VenuesConfig,
    bots: DashMap<String, BotHandle>,
    observer: Option<Observer>,
}

impl BotManager {
    pub fn new(venues: VenuesConfig) -> Self {
        Self {
            registry: Arc::new(AdapterRegistry::new()),
            venues,
            bots: DashMap::new(),
            observer: None,
        }
    }

    /// Attach an observer cloned into every bot created afterwards.
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The shared adapter registry (tests pre-seed mock adapters here).
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Validate, wire up adapters and start a bot. Returns its id.
    pub async fn create_bot(&self, mut config: BotConfig) -> Result<String, ManagerError> {
        if config.id.is_empty() {
            let mut uuid = Uuid::new_v4().simple().to_string();
            uuid.truncate(8);
            config.id = uuid;
        }
        config.validate()?;

        for existing in self.bots.iter() {
            if existing.symbol == config.symbol && existing.is_running() {
                return Err(ManagerError::SymbolAlreadyRunning(config.symbol));
            }
        }

        let adapter_a = self
            .registry
            .get_or_init(&config.exchange_a, &self.venues.for_venue(&config.exchange_a))
            .await?;
        let adapter_b = self
            .registry
            .get_or_init(&config.exchange_b, &self.venues.for_venue(&config.exchange_b))
            .await?;

        let id = config.id.clone();
        info!(bot = %id, symbol = %config.symbol, a = %config.exchange_a, b = %config.exchange_b, "creating bot");
        let handle = BotSupervisor::spawn(config, adapter_a, adapter_b, self.observer.clone());
        self.bots.insert(id.clone(), handle);
        Ok(id)
    }

    /// Stop a bot, then hand its adapter references back (closing each
    /// adapter once no other bot uses it).
    pub async fn stop_bot(&self, id: &str) -> Result<(), ManagerError> {
        let (_, handle) = self
            .bots
            .remove(id)
            .ok_or_else(|| ManagerError::BotNotFound(id.to_string()))?;

        let venue_a = handle.exchange_a.clone();
        let venue_b = handle.exchange_b.clone();
        handle.stop().await;
        self.registry.release(&venue_a).await;
        self.registry.release(&venue_b).await;
        info!(bot = %id, "bot stopped");
        Ok(())
    }

    /// Forward a control command to a running bot.
    pub async fn send(&self, id: &str, command: BotCommand) -> Result<(), ManagerError> {
        let handle = self
            .bots
            .get(id)
            .ok_or_else(|| ManagerError::BotNotFound(id.to_string()))?;
        if !handle.send(command).await {
            return Err(ManagerError::BotNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Snapshot of one bot.
    pub async fn snapshot(&self, id: &str) -> Result<BotSnapshot, ManagerError> {
        let handle = self
            .bots
            .get(id)
            .ok_or_else(|| ManagerError::BotNotFound(id.to_string()))?;
        handle
            .snapshot()
            .await
            .ok_or_else(|| ManagerError::BotNotFound(id.to_string()))
    }

    /// Ids of all registered bots.
    pub fn bot_ids(&self) -> Vec<String> {
        self.bots.iter().map(|e| e.key().clone()).collect()
    }

    /// Latency summaries for every live venue adapter.
    pub fn venue_latencies(&self) -> Vec<(String, LatencySummary)> {
        self.registry.latencies()
    }

    /// Stop everything, bots first, then adapters.
    pub async fn shutdown(&self) {
        let ids = self.bot_ids();
        for id in ids {
            let _ = self.stop_bot(&id).await;
        }
        self.registry.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_common::{Orderbook, PriceLevel};
    use arb_exchange::MockAdapter;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn seeded_manager() -> BotManager {
        let manager = BotManager::new(VenuesConfig::default());
        let a = MockAdapter::new("mock-a");
        let b = MockAdapter::new("mock-b");
        let mut book_a = Orderbook::new("mock-a", "ETH-USD");
        book_a.bids.push(PriceLevel::new(dec!(99.9), dec!(10)));
        book_a.asks.push(PriceLevel::new(dec!(100), dec!(10)));
        book_a.timestamp_ms = Utc::now().timestamp_millis();
        let mut book_b = book_a.clone();
        book_b.exchange_id = "mock-b".into();
        a.push_book(book_a);
        b.push_book(book_b);
        manager.registry().insert(Arc::new(a));
        manager.registry().insert(Arc::new(b));
        manager
    }

    fn mock_bot_config(symbol: &str) -> BotConfig {
        BotConfig {
            id: String::new(),
            symbol: symbol.into(),
            exchange_a: "mock-a".into(),
            exchange_b: "mock-b".into(),
            poll_interval_ms: 10,
            ..BotConfig::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_stop_bot() {
        let manager = seeded_manager();
        let id = manager.create_bot(mock_bot_config("ETH-USD")).await.unwrap();
        assert_eq!(id.len(), 8, "generated ids are short uuids");
        assert_eq!(manager.bot_ids(), vec![id.clone()]);

        let snap = manager.snapshot(&id).await.unwrap();
        assert_eq!(snap.symbol, "ETH-USD");

        manager.stop_bot(&id).await.unwrap();
        assert!(manager.bot_ids().is_empty());
        assert!(matches!(
            manager.snapshot(&id).await,
            Err(ManagerError::BotNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_same_symbol_rejected_while_running() {
        let manager = seeded_manager();
        manager.create_bot(mock_bot_config("ETH-USD")).await.unwrap();

        let err = manager.create_bot(mock_bot_config("ETH-USD")).await;
        assert!(matches!(err, Err(ManagerError::SymbolAlreadyRunning(_))));

        // A different symbol is fine.
        assert!(manager.create_bot(mock_bot_config("BTC-USD")).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let manager = seeded_manager();
        let mut config = mock_bot_config("ETH-USD");
        config.target_amount = dec!(0);
        assert!(matches!(
            manager.create_bot(config).await,
            Err(ManagerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let manager = seeded_manager();
        manager.create_bot(mock_bot_config("ETH-USD")).await.unwrap();
        manager.create_bot(mock_bot_config("BTC-USD")).await.unwrap();

        manager.shutdown().await;
        assert!(manager.bot_ids().is_empty());
    }
}
