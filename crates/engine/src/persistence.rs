use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use surge_trade_core::{RegistrySnapshot, SnapshotStore, SNAPSHOT_VERSION};
use tracing::debug;

/// Snapshot store writing one JSON file per key.
///
/// Writes go to a temporary sibling first and are renamed into place, so
/// a crash mid-write can never leave a truncated snapshot behind.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self, key: &str) -> Result<Option<RegistrySnapshot>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no snapshot at {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let snapshot: RegistrySnapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("corrupt snapshot at {}", path.display()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            anyhow::bail!(
                "snapshot at {} has version {}, expected {SNAPSHOT_VERSION}",
                path.display(),
                snapshot.version
            );
        }
        Ok(Some(snapshot))
    }

    async fn save(&self, key: &str, snapshot: &RegistrySnapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path_for(key);
        let tmp = tmp_path(&path);
        let bytes = serde_json::to_vec_pretty(snapshot).context("failed to encode snapshot")?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to move snapshot into {}", path.display()))?;
        debug!("snapshot written to {}", path.display());
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use surge_trade_core::{snapshot_key, CatalogEntry, InstrumentState, OffsetState, ProfileConfig};

    fn sample_state() -> InstrumentState {
        let entry = CatalogEntry {
            symbol: "btcusdt".to_string(),
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
        let mut state = InstrumentState::new(&entry, &profile).unwrap();
        state.baseline = dec!(100);
        state.last_price = dec!(104.5);
        state.last_bid = dec!(104.4);
        state.last_ask = dec!(104.6);
        state.momentum = 4;
        state.last_sell_price = dec!(99);
        state.avg_buy_price = dec!(101.25);
        state.position_volume = dec!(2.5);
        state.committed_budget = dec!(253.125);
        state.buy_order_id = Some("b-1".to_string());
        state.buy_time = Some(chrono::Utc::now());
        state.buy_price = dec!(101.25);
        state.wait_count = 17;
        state.offset = OffsetState::Close;
        state.locked_out = true;
        state
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[tokio::test]
    async fn save_then_load_round_trips_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let snapshot = RegistrySnapshot::new(date(), vec![sample_state()]);
        let key = snapshot_key(date());

        store.save(&key, &snapshot).await.unwrap();
        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        assert!(store.load("analyse_2024-03-07").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let key = snapshot_key(date());
        std::fs::write(dir.path().join(format!("{key}.json")), b"{not json").unwrap();
        let store = FileSnapshotStore::new(dir.path());
        assert!(store.load(&key).await.is_err());
    }

    #[tokio::test]
    async fn version_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let mut snapshot = RegistrySnapshot::new(date(), vec![]);
        snapshot.version = 99;
        let key = snapshot_key(date());
        // Write bypassing the store's own versioning.
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(
            dir.path().join(format!("{key}.json")),
            serde_json::to_vec(&snapshot).unwrap(),
        )
        .unwrap();
        assert!(store.load(&key).await.is_err());
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let snapshot = RegistrySnapshot::new(date(), vec![sample_state()]);
        let key = snapshot_key(date());
        store.save(&key, &snapshot).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{key}.json")]);
    }
}
