use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use surge_trade_core::{
    BarHistory, CatalogEntry, DailyBar, InstrumentCatalog, MarketSubscriber, RegistrySnapshot,
    SnapshotStore,
};
use tracing::debug;

/// Catalog and daily-bar history served from a fixed seed.
///
/// Each seeded instrument carries its daily opening price, from which a
/// single most-recent bar is synthesized for baseline fetches.
#[derive(Debug, Default)]
pub struct PaperMarket {
    entries: Vec<CatalogEntry>,
    opens: HashMap<String, Decimal>,
    failing: HashSet<String>,
}

impl PaperMarket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds one instrument with its daily opening price.
    pub fn add(&mut self, entry: CatalogEntry, open: Decimal) {
        self.opens.insert(entry.symbol.clone(), open);
        self.entries.push(entry);
    }

    /// Makes bar fetches for `symbol` fail, for partial-failure tests.
    pub fn fail_bars_for(&mut self, symbol: &str) {
        self.failing.insert(symbol.to_string());
    }
}

#[async_trait]
impl InstrumentCatalog for PaperMarket {
    async fn instruments(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.entries.clone())
    }
}

#[async_trait]
impl BarHistory for PaperMarket {
    async fn daily_bars(&self, symbol: &str, _count: usize) -> Result<Vec<DailyBar>> {
        if self.failing.contains(symbol) {
            anyhow::bail!("bar history unavailable for {symbol}");
        }
        let open = self
            .opens
            .get(symbol)
            .ok_or_else(|| anyhow::anyhow!("unknown symbol {symbol}"))?;
        Ok(vec![DailyBar {
            open: *open,
            high: *open,
            low: *open,
            close: *open,
            volume: Decimal::ZERO,
            timestamp: Utc::now(),
        }])
    }
}

/// Subscriber that only notes the registration.
#[derive(Debug, Default)]
pub struct NullSubscriber;

#[async_trait]
impl MarketSubscriber for NullSubscriber {
    async fn subscribe(&self, symbol: &str) -> Result<()> {
        debug!("subscribed {symbol}");
        Ok(())
    }
}

/// Snapshot store backed by a plain map.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<String, RegistrySnapshot>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-loads a snapshot under `key`, as if written by a prior run.
    pub fn seed(&self, key: &str, snapshot: RegistrySnapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(key.to_string(), snapshot);
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self, key: &str) -> Result<Option<RegistrySnapshot>> {
        Ok(self.snapshots.lock().unwrap().get(key).cloned())
    }

    async fn save(&self, key: &str, snapshot: &RegistrySnapshot) -> Result<()> {
        self.snapshots
            .lock()
            .unwrap()
            .insert(key.to_string(), snapshot.clone());
        Ok(())
    }
}
