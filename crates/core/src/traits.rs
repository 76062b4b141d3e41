use crate::events::DailyBar;
use crate::snapshot::RegistrySnapshot;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One instrument as reported by the contract catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub symbol: String,
    pub exchange: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub price_tick: Decimal,
    pub lot_size: Decimal,
    /// Market tier/partition (e.g. "main", "innovation").
    pub tier: String,
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn submit_buy(&self, symbol: &str, price: Decimal, volume: Decimal) -> Result<String>;
    async fn submit_sell(&self, symbol: &str, price: Decimal, volume: Decimal) -> Result<String>;
    async fn cancel(&self, order_id: &str) -> Result<()>;
}

#[async_trait]
pub trait InstrumentCatalog: Send + Sync {
    async fn instruments(&self) -> Result<Vec<CatalogEntry>>;
}

#[async_trait]
pub trait BarHistory: Send + Sync {
    /// Returns up to `count` daily bars for `symbol`, most recent last.
    async fn daily_bars(&self, symbol: &str, count: usize) -> Result<Vec<DailyBar>>;
}

#[async_trait]
pub trait MarketSubscriber: Send + Sync {
    async fn subscribe(&self, symbol: &str) -> Result<()>;
}

/// Date-keyed snapshot persistence; keys follow `analyse_<ISO-date>`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<RegistrySnapshot>>;
    async fn save(&self, key: &str, snapshot: &RegistrySnapshot) -> Result<()>;
}
