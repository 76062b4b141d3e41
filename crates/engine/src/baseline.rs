use crate::registry::InstrumentRegistry;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use surge_trade_core::{BarHistory, InstrumentState};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Fetches the most recent daily bar for one instrument and applies its
/// opening price as the new baseline, clearing the daily fields.
///
/// The bar request happens before the state lock is taken so no network
/// wait ever holds an instrument lock.
///
/// # Errors
/// Returns an error when the bar fetch fails or yields no bars.
pub async fn refresh_instrument(
    history: &dyn BarHistory,
    symbol: &str,
    slot: &Arc<Mutex<InstrumentState>>,
) -> Result<Decimal> {
    let bars = history
        .daily_bars(symbol, 1)
        .await
        .with_context(|| format!("daily bar fetch failed for {symbol}"))?;
    let bar = bars
        .last()
        .with_context(|| format!("no daily bars returned for {symbol}"))?;

    let mut state = slot.lock().await;
    state.reset_daily(bar.open);
    Ok(bar.open)
}

/// Refreshes every registered instrument, tolerating per-instrument
/// failures: a failed fetch is logged and skipped, the rest proceed.
/// Returns how many baselines were set.
pub async fn refresh_all(registry: &InstrumentRegistry, history: &dyn BarHistory) -> usize {
    let mut refreshed = 0;
    for (symbol, slot) in registry.all().await {
        match refresh_instrument(history, &symbol, &slot).await {
            Ok(open) => {
                info!("baseline for {symbol} set to {open}");
                refreshed += 1;
            }
            Err(e) => warn!("baseline refresh skipped for {symbol}: {e:#}"),
        }
    }
    refreshed
}
