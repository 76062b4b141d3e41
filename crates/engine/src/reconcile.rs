use crate::registry::InstrumentRegistry;
use rust_decimal::Decimal;
use surge_trade_core::{FillDirection, FillEvent, OrderUpdate};
use tracing::{debug, info, warn};

/// Folds a fill notification into the owning instrument's state.
///
/// Unknown symbols and non-positive volumes are logged and dropped;
/// reconciliation never fails the dispatch loop.
pub async fn apply_fill(registry: &InstrumentRegistry, fill: &FillEvent) {
    let Some(slot) = registry.get(&fill.symbol).await else {
        warn!("fill for unmonitored symbol {}, ignoring", fill.symbol);
        return;
    };
    if fill.volume <= Decimal::ZERO {
        warn!(
            "fill {} for {} has non-positive volume {}, ignoring",
            fill.order_id, fill.symbol, fill.volume
        );
        return;
    }

    let mut state = slot.lock().await;
    match fill.direction {
        FillDirection::Buy => {
            state.apply_buy_fill(fill.volume, fill.price, fill.fees);
            info!(
                "{}: buy fill {}@{} (fees {}), position {} at cost {}",
                fill.symbol,
                fill.volume,
                fill.price,
                fill.fees,
                state.position_volume,
                state.avg_buy_price
            );
        }
        FillDirection::Sell => {
            let realized = state.apply_sell_fill(fill.volume, fill.price, fill.fees);
            info!(
                "{}: sell fill {}@{}, position now {}",
                fill.symbol, fill.volume, fill.price, state.position_volume
            );
            if let Some(profit) = realized {
                info!("{}: realized profit {profit}", fill.symbol);
            }
        }
    }

    if state.re_arm_if_closed() {
        debug!("{}: position negligible, re-armed for entries", fill.symbol);
    }
}

/// Applies an order/cancel acknowledgment: a terminal status clears the
/// matching outstanding order id.
pub async fn apply_order_update(registry: &InstrumentRegistry, update: &OrderUpdate) {
    if !update.status.is_terminal() {
        return;
    }
    let Some(slot) = registry.get(&update.symbol).await else {
        return;
    };
    let mut state = slot.lock().await;
    if state.buy_order_id.as_deref() == Some(update.order_id.as_str()) {
        state.buy_order_id = None;
        debug!(
            "{}: buy order {} closed ({:?})",
            update.symbol, update.order_id, update.status
        );
    } else if state.sell_order_id.as_deref() == Some(update.order_id.as_str()) {
        state.sell_order_id = None;
        debug!(
            "{}: sell order {} closed ({:?})",
            update.symbol, update.order_id, update.status
        );
    }
}
