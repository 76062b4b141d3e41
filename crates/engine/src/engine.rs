use crate::baseline;
use crate::decision::{self, DecisionParams};
use crate::reconcile;
use crate::registry::InstrumentRegistry;
use crate::timeout;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_trade_core::{
    snapshot_key, BarHistory, Clock, ConfigError, FillEvent, InstrumentCatalog, InstrumentState,
    MarketSubscriber, OrderGateway, OrderUpdate, SnapshotStore, StrategyConfig, TickEvent,
};
use surge_trade_scheduler::TaskScheduler;
use tracing::{debug, error, info, warn};

/// External services the engine drives; all abstract, all shared.
pub struct Collaborators {
    pub gateway: Arc<dyn OrderGateway>,
    pub catalog: Arc<dyn InstrumentCatalog>,
    pub history: Arc<dyn BarHistory>,
    pub subscriber: Arc<dyn MarketSubscriber>,
    pub store: Arc<dyn SnapshotStore>,
}

/// The decision core: owns the instrument registry, drives the baseline
/// refresh and timeout supervision through an injected scheduler, and
/// reacts to tick/fill/order events dispatched by the external engine.
///
/// Tick, fill, and order handlers may run concurrently with scheduled
/// jobs; every access to one instrument's state is serialized by that
/// instrument's own lock.
pub struct StrategyEngine {
    config: StrategyConfig,
    params: DecisionParams,
    registry: Arc<InstrumentRegistry>,
    scheduler: Arc<TaskScheduler>,
    clock: Arc<dyn Clock>,
    gateway: Arc<dyn OrderGateway>,
    catalog: Arc<dyn InstrumentCatalog>,
    history: Arc<dyn BarHistory>,
    subscriber: Arc<dyn MarketSubscriber>,
    store: Arc<dyn SnapshotStore>,
    /// Gate opened once startup completes; ticks before that are dropped.
    accepting_ticks: AtomicBool,
}

impl StrategyEngine {
    /// Validates the configuration and builds the engine.
    ///
    /// # Errors
    /// Fails fast on any configuration error; no instruments are
    /// monitored when construction fails.
    pub fn new(
        config: StrategyConfig,
        scheduler: Arc<TaskScheduler>,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let stop_loss_ratio = Decimal::try_from(config.stop_loss_ratio).map_err(|_| {
            ConfigError::InvalidNumber {
                name: "stop_loss_ratio",
                value: config.stop_loss_ratio,
            }
        })?;
        let params = DecisionParams {
            stop_loss_ratio,
            min_dwell: chrono::Duration::seconds(config.min_dwell_secs as i64),
        };
        Ok(Self {
            config,
            params,
            registry: Arc::new(InstrumentRegistry::new()),
            scheduler,
            clock,
            gateway: collaborators.gateway,
            catalog: collaborators.catalog,
            history: collaborators.history,
            subscriber: collaborators.subscriber,
            store: collaborators.store,
            accepting_ticks: AtomicBool::new(false),
        })
    }

    /// Runs the startup sequence: populate the registry from the
    /// catalog, wait for first baselines, restore the persisted
    /// snapshot, then begin scheduling and tick evaluation.
    ///
    /// # Errors
    /// Returns an error when the catalog query fails or scheduler jobs
    /// cannot be registered; per-instrument failures are logged and
    /// skipped instead.
    pub async fn start(&self) -> Result<()> {
        let entries = self
            .catalog
            .instruments()
            .await
            .context("contract catalog query failed")?;
        info!("catalog returned {} instruments", entries.len());

        for entry in entries {
            let Some(profile) = self
                .config
                .profiles
                .iter()
                .find(|p| p.quote_currency.eq_ignore_ascii_case(&entry.quote_currency))
            else {
                debug!("no profile claims {}, skipping", entry.symbol);
                continue;
            };
            if let Err(e) = self.subscriber.subscribe(&entry.symbol).await {
                warn!("subscription failed for {}, skipping: {e:#}", entry.symbol);
                continue;
            }
            match InstrumentState::new(&entry, profile) {
                Ok(state) => self.registry.insert(state).await,
                Err(e) => warn!("cannot monitor {}: {e}", entry.symbol),
            }
        }
        if self.registry.is_empty().await {
            warn!("no instruments matched any profile");
        }

        self.await_first_baselines().await;
        self.restore_snapshot().await;
        self.register_jobs().await?;
        self.scheduler.start();
        self.accepting_ticks.store(true, Ordering::SeqCst);
        info!("strategy engine started, {} instruments", self.registry.len().await);
        Ok(())
    }

    /// Readiness gate: retries baseline fetches until every instrument
    /// has one or the configured timeout elapses.
    async fn await_first_baselines(&self) {
        baseline::refresh_all(&self.registry, self.history.as_ref()).await;
        let deadline =
            self.clock.now() + chrono::Duration::seconds(self.config.baseline_ready_timeout_secs as i64);
        loop {
            let mut missing = Vec::new();
            for (symbol, slot) in self.registry.all().await {
                if slot.lock().await.baseline.is_zero() {
                    missing.push((symbol, slot));
                }
            }
            if missing.is_empty() {
                return;
            }
            if self.clock.now() >= deadline {
                warn!(
                    "{} instruments still have no baseline after {}s, proceeding",
                    missing.len(),
                    self.config.baseline_ready_timeout_secs
                );
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            for (symbol, slot) in &missing {
                if let Err(e) =
                    baseline::refresh_instrument(self.history.as_ref(), symbol, slot).await
                {
                    debug!("baseline retry failed for {symbol}: {e:#}");
                }
            }
        }
    }

    /// Merges today's persisted snapshot back into the registry, if any.
    /// Absence or corruption never stops startup.
    async fn restore_snapshot(&self) {
        let today = self.clock.now().date_naive();
        let key = snapshot_key(today);
        match self.store.load(&key).await {
            Ok(Some(snapshot)) => {
                if snapshot.date == today {
                    let restored = self.registry.merge_snapshot(snapshot).await;
                    info!("restored {restored} instrument states from '{key}'");
                } else {
                    info!(
                        "snapshot '{key}' is dated {}, not today; ignoring",
                        snapshot.date
                    );
                }
            }
            Ok(None) => info!("no snapshot under '{key}', starting fresh"),
            Err(e) => error!("snapshot restore failed, starting fresh: {e:#}"),
        }
    }

    async fn register_jobs(&self) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let history = Arc::clone(&self.history);
        self.scheduler
            .add_daily_job(
                "baseline-refresh",
                self.config.baseline_refresh_hour,
                move || {
                    let registry = Arc::clone(&registry);
                    let history = Arc::clone(&history);
                    Box::pin(async move {
                        let refreshed = baseline::refresh_all(&registry, history.as_ref()).await;
                        info!("daily baseline refresh set {refreshed} baselines");
                        Ok(())
                    })
                },
            )
            .await?;

        let registry = Arc::clone(&self.registry);
        let gateway = Arc::clone(&self.gateway);
        self.scheduler
            .add_interval_job(
                "timeout-supervisor",
                Duration::from_secs(self.config.supervisor_interval_secs),
                move || {
                    let registry = Arc::clone(&registry);
                    let gateway = Arc::clone(&gateway);
                    Box::pin(async move {
                        timeout::run_sweep(&registry, gateway.as_ref()).await;
                        Ok(())
                    })
                },
            )
            .await?;
        Ok(())
    }

    /// Tick dispatch entry point; runs on the dispatcher's thread.
    pub async fn on_tick(&self, tick: &TickEvent) {
        if !self.accepting_ticks.load(Ordering::SeqCst) {
            return;
        }
        let Some(slot) = self.registry.get(&tick.symbol).await else {
            return;
        };
        let mut state = slot.lock().await;
        if let Err(e) = decision::evaluate_tick(
            self.gateway.as_ref(),
            self.clock.as_ref(),
            &self.params,
            &mut state,
            tick,
        )
        .await
        {
            error!("tick evaluation failed for {}: {e:#}", tick.symbol);
        }
    }

    /// Fill dispatch entry point.
    pub async fn on_fill(&self, fill: &FillEvent) {
        reconcile::apply_fill(&self.registry, fill).await;
    }

    /// Order/cancel acknowledgment entry point.
    pub async fn on_order(&self, update: &OrderUpdate) {
        reconcile::apply_order_update(&self.registry, update).await;
    }

    /// Runs one timeout-supervisor pass outside the scheduled cadence.
    pub async fn run_timeout_sweep(&self) {
        timeout::run_sweep(&self.registry, self.gateway.as_ref()).await;
    }

    #[must_use]
    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    /// Stops tick evaluation, the scheduler, and writes the final
    /// snapshot. In-flight orders are left for the external engine's own
    /// shutdown sequence.
    ///
    /// # Errors
    /// Returns an error when the final snapshot cannot be written.
    pub async fn stop(&self) -> Result<()> {
        self.accepting_ticks.store(false, Ordering::SeqCst);
        self.scheduler.stop().await;

        let today = self.clock.now().date_naive();
        let snapshot = self.registry.export_snapshot(today).await;
        let key = snapshot_key(today);
        self.store
            .save(&key, &snapshot)
            .await
            .with_context(|| format!("final snapshot write failed for '{key}'"))?;
        info!(
            "strategy engine stopped, snapshot '{key}' holds {} instruments",
            snapshot.entries.len()
        );
        Ok(())
    }
}
