use crate::registry::InstrumentRegistry;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use surge_trade_core::{round_to_step, InstrumentState, OffsetState, OrderGateway};
use tracing::{info, warn};

/// Margin applied to cost when liquidating below the bid, covering
/// round-trip fees.
fn fee_cover_ratio() -> Decimal {
    Decimal::new(1005, 3)
}

/// One pass over every instrument, aging wait counters and forcing out
/// stale orders and overheld positions. Runs on a fixed periodic cadence
/// independent of market data arrival.
pub async fn run_sweep(registry: &InstrumentRegistry, gateway: &dyn OrderGateway) {
    for (symbol, slot) in registry.all().await {
        let mut state = slot.lock().await;
        if let Err(e) = check_instrument(gateway, &mut state).await {
            warn!("timeout check failed for {symbol}: {e:#}");
        }
    }
}

async fn check_instrument(
    gateway: &dyn OrderGateway,
    state: &mut InstrumentState,
) -> Result<()> {
    if state.position_volume > Decimal::ZERO {
        state.wait_count += 1;
        if state.wait_count < state.wait_time_secs {
            return Ok(());
        }

        // A partially-filled entry still resting on the book is pulled
        // before the position itself is dealt with.
        if let Some(order_id) = state.buy_order_id.take() {
            if let Err(e) = gateway.cancel(&order_id).await {
                warn!("cancel of stale buy {order_id} for {} failed: {e:#}", state.symbol);
            }
        }

        // An exit is already in flight; give it this cycle.
        if state.offset == OffsetState::Unknown {
            return Ok(());
        }

        let volume = round_to_step(state.position_volume, state.lot_size);
        if volume <= Decimal::ZERO {
            state.wait_count = 0;
            return Ok(());
        }
        let price = if state.last_bid >= state.avg_buy_price {
            state.last_bid
        } else {
            state.avg_buy_price * fee_cover_ratio()
        };
        let order_id = gateway
            .submit_sell(&state.symbol, price, volume)
            .await
            .with_context(|| format!("timeout sell submit failed for {}", state.symbol))?;
        info!(
            "{}: wait window elapsed, liquidating {volume}@{price} ({order_id})",
            state.symbol
        );
        state.offset = OffsetState::Close;
        state.sell_order_id = Some(order_id);
        // Wait a full window before trying again if this sell also sits.
        state.wait_count = 0;
    } else if state.buy_order_id.is_some() {
        state.wait_count += 1;
        if state.wait_count < state.wait_time_secs {
            return Ok(());
        }
        if let Some(order_id) = state.buy_order_id.take() {
            gateway
                .cancel(&order_id)
                .await
                .with_context(|| format!("cancel of unfilled buy failed for {}", state.symbol))?;
            info!("{}: cancelled unfilled buy {order_id}", state.symbol);
        }
        state.offset = OffsetState::Open;
        state.wait_count = 0;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use surge_trade_core::{CatalogEntry, FillDirection, ProfileConfig};
    use surge_trade_paper::PaperGateway;

    fn sample_state(wait_time_secs: u64) -> InstrumentState {
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
            wait_time_secs,
        };
        InstrumentState::new(&entry, &profile).unwrap()
    }

    async fn registry_with(state: InstrumentState) -> InstrumentRegistry {
        let registry = InstrumentRegistry::new();
        registry.insert(state).await;
        registry
    }

    #[tokio::test]
    async fn held_position_liquidates_exactly_once_after_wait_window() {
        let mut state = sample_state(600);
        state.position_volume = dec!(1);
        state.avg_buy_price = dec!(100);
        state.last_bid = dec!(101);
        let registry = registry_with(state).await;
        let gateway = PaperGateway::new();

        for _ in 0..600 {
            run_sweep(&registry, &gateway).await;
        }
        let orders = gateway.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].direction, FillDirection::Sell);
        // Bid covers cost, so the sell goes out at the bid.
        assert_eq!(orders[0].price, dec!(101));
        assert_eq!(orders[0].volume, dec!(1));
    }

    #[tokio::test]
    async fn underwater_position_liquidates_at_cost_plus_fee_cover() {
        let mut state = sample_state(10);
        state.position_volume = dec!(2);
        state.avg_buy_price = dec!(100);
        state.last_bid = dec!(95);
        let registry = registry_with(state).await;
        let gateway = PaperGateway::new();

        for _ in 0..10 {
            run_sweep(&registry, &gateway).await;
        }
        let order = gateway.last_order().unwrap();
        assert_eq!(order.price, dec!(100.5));
    }

    #[tokio::test]
    async fn liquidation_waits_another_window_before_retrying() {
        let mut state = sample_state(10);
        state.position_volume = dec!(1);
        state.avg_buy_price = dec!(100);
        state.last_bid = dec!(101);
        let registry = registry_with(state).await;
        let gateway = PaperGateway::new();

        for _ in 0..19 {
            run_sweep(&registry, &gateway).await;
        }
        assert_eq!(gateway.orders().len(), 1);

        // The sell from the first window is still unfilled; an exit in
        // flight would be Unknown, but the forced exit used Close, so a
        // second full window produces a second attempt.
        run_sweep(&registry, &gateway).await;
        assert_eq!(gateway.orders().len(), 2);
    }

    #[tokio::test]
    async fn in_flight_exit_is_left_alone() {
        let mut state = sample_state(10);
        state.position_volume = dec!(1);
        state.avg_buy_price = dec!(100);
        state.offset = OffsetState::Unknown;
        let registry = registry_with(state).await;
        let gateway = PaperGateway::new();

        for _ in 0..20 {
            run_sweep(&registry, &gateway).await;
        }
        assert!(gateway.orders().is_empty());
    }

    #[tokio::test]
    async fn stale_partial_buy_is_cancelled_before_liquidation() {
        let mut state = sample_state(10);
        state.position_volume = dec!(0.5);
        state.avg_buy_price = dec!(100);
        state.last_bid = dec!(101);
        state.buy_order_id = Some("b-7".to_string());
        state.offset = OffsetState::Close;
        let registry = registry_with(state).await;
        let gateway = PaperGateway::new();

        for _ in 0..10 {
            run_sweep(&registry, &gateway).await;
        }
        assert_eq!(gateway.cancelled(), vec!["b-7".to_string()]);
        assert_eq!(gateway.orders().len(), 1);
    }

    #[tokio::test]
    async fn unfilled_buy_without_position_is_cancelled_and_reopened() {
        let mut state = sample_state(10);
        state.buy_order_id = Some("b-3".to_string());
        state.offset = OffsetState::Close;
        let registry = registry_with(state).await;
        let gateway = PaperGateway::new();

        for _ in 0..10 {
            run_sweep(&registry, &gateway).await;
        }
        assert_eq!(gateway.cancelled(), vec!["b-3".to_string()]);
        let slot = registry.get("btcusdt").await.unwrap();
        let state = slot.lock().await;
        assert!(state.buy_order_id.is_none());
        assert_eq!(state.offset, OffsetState::Open);
        assert_eq!(state.wait_count, 0);
    }

    #[tokio::test]
    async fn quiet_instrument_is_untouched() {
        let registry = registry_with(sample_state(10)).await;
        let gateway = PaperGateway::new();
        for _ in 0..50 {
            run_sweep(&registry, &gateway).await;
        }
        assert!(gateway.orders().is_empty());
        assert!(gateway.cancelled().is_empty());
    }
}
