use anyhow::{Context, Result};
use rust_decimal::Decimal;
use surge_trade_core::{
    round_to_step, Clock, InstrumentState, OffsetState, OrderGateway, TickEvent,
};
use tracing::{debug, info, warn};

/// Engine-level tuning shared by every instrument.
pub struct DecisionParams {
    /// Price-to-cost ratio below which the emergency liquidation fires.
    pub stop_loss_ratio: Decimal,
    /// Minimum holding time before a profit-take sell is considered.
    pub min_dwell: chrono::Duration,
}

/// Consecutive rising ticks required before a buy qualifies.
const MOMENTUM_TRIGGER: i64 = 2;

/// Evaluates one tick against one instrument's state machine.
///
/// The caller holds the instrument lock for the whole evaluation; the
/// only awaits in here are gateway submissions.
pub async fn evaluate_tick(
    gateway: &dyn OrderGateway,
    clock: &dyn Clock,
    params: &DecisionParams,
    state: &mut InstrumentState,
    tick: &TickEvent,
) -> Result<()> {
    // Quote cache for the timeout supervisor, which prices liquidations
    // off the most recent tick rather than pulling the feed.
    state.last_bid = tick.bid;
    state.last_ask = tick.ask;

    if state.baseline.is_zero() {
        return Ok(());
    }
    let current = tick.last;

    if current <= state.baseline {
        state.momentum -= 1;
        evaluate_stop_loss(gateway, params, state, current).await?;
        return Ok(());
    }

    let increase = (current - state.baseline) / state.baseline;

    if increase > state.entry_threshold
        && increase < state.entry_ceiling
        && current > state.last_price
    {
        state.momentum += 1;
        if state.momentum > MOMENTUM_TRIGGER
            && state.offset == OffsetState::Open
            && !state.locked_out
            && try_buy(gateway, clock, state, tick, current).await?
        {
            // Entry submitted; skip the sell evaluation this tick.
            return Ok(());
        }
    }

    evaluate_sell(gateway, clock, params, state, tick, current).await
}

/// Emergency liquidation when the price has fallen well below cost.
/// Takes priority over everything else on a declining tick.
async fn evaluate_stop_loss(
    gateway: &dyn OrderGateway,
    params: &DecisionParams,
    state: &mut InstrumentState,
    current: Decimal,
) -> Result<()> {
    if state.position_volume <= Decimal::ZERO
        || state.liquidating
        || current >= state.buy_price * params.stop_loss_ratio
    {
        return Ok(());
    }

    if let Some(order_id) = state.sell_order_id.take() {
        // A resting profit-take sell would race the liquidation; pull it
        // first. Cancel failures are logged and the liquidation proceeds.
        if let Err(e) = gateway.cancel(&order_id).await {
            warn!("cancel of sell {order_id} for {} failed: {e:#}", state.symbol);
        }
    }

    let volume = round_to_step(state.position_volume, state.lot_size);
    if volume <= Decimal::ZERO {
        return Ok(());
    }
    let order_id = gateway
        .submit_sell(&state.symbol, current, volume)
        .await
        .with_context(|| format!("emergency sell submit failed for {}", state.symbol))?;
    warn!(
        "emergency liquidation for {}: {volume}@{current} (cost {})",
        state.symbol, state.avg_buy_price
    );
    state.sell_order_id = Some(order_id);
    state.liquidating = true;
    state.offset = OffsetState::Unknown;
    Ok(())
}

/// Attempts an entry. Returns true when a buy order was submitted.
async fn try_buy(
    gateway: &dyn OrderGateway,
    clock: &dyn Clock,
    state: &mut InstrumentState,
    tick: &TickEvent,
    current: Decimal,
) -> Result<bool> {
    let price = current.min(tick.ask);

    // Re-entry guard: after a sell, wait until the price has retraced at
    // least a third of the way from the sell level back toward cost
    // before buying the same move again.
    if state.last_sell_price > Decimal::ZERO {
        let retrace_floor = state.last_sell_price
            - (state.last_sell_price - state.avg_buy_price) / Decimal::from(3);
        if price > retrace_floor {
            debug!(
                "{}: {price} still within re-entry guard (floor {retrace_floor})",
                state.symbol
            );
            return Ok(false);
        }
    }

    let volume = round_to_step(state.remaining_budget() / price, state.lot_size);
    if volume <= Decimal::ZERO {
        // Stays Open so the entry can retry on the next qualifying tick.
        warn!(
            "{}: remaining budget {} buys no volume at {price}",
            state.symbol,
            state.remaining_budget()
        );
        return Ok(false);
    }

    let order_id = gateway
        .submit_buy(&state.symbol, price, volume)
        .await
        .with_context(|| format!("buy submit failed for {}", state.symbol))?;
    info!("{}: buy {volume}@{price} submitted ({order_id})", state.symbol);
    state.buy_order_id = Some(order_id);
    state.buy_price = price;
    state.buy_time = Some(clock.now());
    state.committed_budget += price * volume;
    state.offset = OffsetState::Close;
    Ok(true)
}

/// Profit-take evaluation; also keeps the last-price watermark current.
async fn evaluate_sell(
    gateway: &dyn OrderGateway,
    clock: &dyn Clock,
    params: &DecisionParams,
    state: &mut InstrumentState,
    tick: &TickEvent,
    current: Decimal,
) -> Result<()> {
    state.last_price = current;

    if state.avg_buy_price <= Decimal::ZERO || state.offset == OffsetState::Unknown {
        return Ok(());
    }
    let gain = (current - state.avg_buy_price) / state.avg_buy_price;
    if gain <= state.exit_threshold {
        return Ok(());
    }
    let dwell_elapsed = state
        .buy_time
        .map_or(true, |bought| clock.now() - bought >= params.min_dwell);
    if !dwell_elapsed {
        return Ok(());
    }

    let volume = round_to_step(state.position_volume, state.lot_size);
    if volume <= Decimal::ZERO {
        return Ok(());
    }
    let price = current.max(tick.ask - state.price_tick);
    let order_id = gateway
        .submit_sell(&state.symbol, price, volume)
        .await
        .with_context(|| format!("sell submit failed for {}", state.symbol))?;
    info!(
        "{}: profit-take sell {volume}@{price} submitted ({order_id}), gain {gain:.4}",
        state.symbol
    );
    state.sell_order_id = Some(order_id);
    state.locked_out = true;
    state.offset = OffsetState::Unknown;
    Ok(())
}
