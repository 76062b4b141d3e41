use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use surge_trade_core::{InstrumentState, RegistrySnapshot};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Owns the symbol-to-state mapping for every monitored instrument.
///
/// Membership sits behind a read-mostly lock; each state has its own
/// mutex so that tick evaluation, reconciliation, timeout checks, and
/// baseline resets for one instrument are serialized without blocking
/// the others. States are created at startup (or restore) and never
/// removed during a run.
pub struct InstrumentRegistry {
    instruments: RwLock<HashMap<String, Arc<Mutex<InstrumentState>>>>,
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            instruments: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a freshly-built state, logging the addition.
    pub async fn insert(&self, state: InstrumentState) {
        info!(
            "monitoring {} ({}) under profile '{}'",
            state.symbol, state.exchange, state.profile
        );
        self.instruments
            .write()
            .await
            .insert(state.symbol.clone(), Arc::new(Mutex::new(state)));
    }

    pub async fn get(&self, symbol: &str) -> Option<Arc<Mutex<InstrumentState>>> {
        self.instruments.read().await.get(symbol).cloned()
    }

    /// Snapshot of the current membership, for scheduled sweeps.
    pub async fn all(&self) -> Vec<(String, Arc<Mutex<InstrumentState>>)> {
        self.instruments
            .read()
            .await
            .iter()
            .map(|(symbol, state)| (symbol.clone(), Arc::clone(state)))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.instruments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instruments.read().await.is_empty()
    }

    /// Copies every state out into a dated snapshot.
    pub async fn export_snapshot(&self, date: NaiveDate) -> RegistrySnapshot {
        let mut entries = Vec::new();
        for (_, slot) in self.all().await {
            entries.push(slot.lock().await.clone());
        }
        entries.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        RegistrySnapshot::new(date, entries)
    }

    /// Merges a restored snapshot back, replacing the state of every
    /// symbol that is still registered. Returns how many were restored;
    /// snapshot entries for unknown symbols are skipped with a warning.
    pub async fn merge_snapshot(&self, snapshot: RegistrySnapshot) -> usize {
        let mut restored = 0;
        for entry in snapshot.entries {
            match self.get(&entry.symbol).await {
                Some(slot) => {
                    *slot.lock().await = entry;
                    restored += 1;
                }
                None => warn!(
                    "snapshot entry for {} has no registered instrument, skipping",
                    entry.symbol
                ),
            }
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use surge_trade_core::{CatalogEntry, ProfileConfig};

    fn sample_state(symbol: &str) -> InstrumentState {
        let entry = CatalogEntry {
            symbol: symbol.to_string(),
            exchange: "HUOBI".to_string(),
            base_currency: "btc".to_string(),
            quote_currency: "usdt".to_string(),
            price_tick: dec!(0.01),
            lot_size: dec!(0.0001),
            tier: "main".to_string(),
        };
        let profile = ProfileConfig {
            name: "primary".to_string(),
            quote_currency: "usdt".to_string(),
            fee_budget: 1000.0,
            entry_threshold: 0.02,
            entry_ceiling: 0.5,
            exit_threshold: 0.05,
            wait_time_secs: 600,
        };
        InstrumentState::new(&entry, &profile).unwrap()
    }

    #[tokio::test]
    async fn insert_and_get() {
        let registry = InstrumentRegistry::new();
        registry.insert(sample_state("btcusdt")).await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.get("btcusdt").await.is_some());
        assert!(registry.get("ethusdt").await.is_none());
    }

    #[tokio::test]
    async fn snapshot_export_is_sorted_and_merge_restores() {
        let registry = InstrumentRegistry::new();
        registry.insert(sample_state("ethusdt")).await;
        registry.insert(sample_state("btcusdt")).await;

        {
            let slot = registry.get("btcusdt").await.unwrap();
            let mut state = slot.lock().await;
            state.baseline = dec!(100);
            state.momentum = 5;
        }

        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let snapshot = registry.export_snapshot(date).await;
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.entries[0].symbol, "btcusdt");

        // A fresh registry with the same membership picks the state up.
        let fresh = InstrumentRegistry::new();
        fresh.insert(sample_state("btcusdt")).await;
        fresh.insert(sample_state("ethusdt")).await;
        let restored = fresh.merge_snapshot(snapshot).await;
        assert_eq!(restored, 2);
        let slot = fresh.get("btcusdt").await.unwrap();
        let state = slot.lock().await;
        assert_eq!(state.baseline, dec!(100));
        assert_eq!(state.momentum, 5);
    }

    #[tokio::test]
    async fn merge_skips_unknown_symbols() {
        let registry = InstrumentRegistry::new();
        registry.insert(sample_state("btcusdt")).await;
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let snapshot = registry.export_snapshot(date).await;

        let other = InstrumentRegistry::new();
        other.insert(sample_state("ethusdt")).await;
        assert_eq!(other.merge_snapshot(snapshot).await, 0);
    }
}
