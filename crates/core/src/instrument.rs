use crate::config::ProfileConfig;
use crate::error::ConfigError;
use crate::traits::CatalogEntry;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether an instrument may open a position, has an entry in flight,
/// or has an exit in flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OffsetState {
    /// May open a new position.
    Open,
    /// Buy submitted, awaiting fill; rebuy suppressed.
    Close,
    /// Sell submitted, awaiting fill; no further sells until resolved.
    Unknown,
}

/// Full mutable trading state for one monitored instrument.
///
/// Every field has an explicit initial value at construction; the struct
/// round-trips through serde unchanged, which is what the snapshot store
/// persists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentState {
    // Identity
    pub symbol: String,
    pub exchange: String,
    pub price_tick: Decimal,
    pub lot_size: Decimal,
    pub tier: String,
    /// Name of the monitoring profile this instrument belongs to.
    pub profile: String,

    // Strategy parameters, copied from the profile at construction
    pub fee_budget: Decimal,
    pub entry_threshold: Decimal,
    pub entry_ceiling: Decimal,
    pub exit_threshold: Decimal,
    pub wait_time_secs: u64,

    // Market state
    /// Most recent daily opening price; zero means "not yet ready".
    pub baseline: Decimal,
    pub last_price: Decimal,
    /// Best bid from the latest tick, cached for the timeout supervisor.
    pub last_bid: Decimal,
    pub last_ask: Decimal,
    /// Signed tally of consecutive rises/declines; gates buy eligibility.
    pub momentum: i64,
    pub last_sell_price: Decimal,

    // Position state
    pub avg_buy_price: Decimal,
    pub position_volume: Decimal,
    /// Quote-currency amount already earmarked for buys today.
    pub committed_budget: Decimal,

    // Order state
    pub buy_order_id: Option<String>,
    pub sell_order_id: Option<String>,
    pub buy_time: Option<DateTime<Utc>>,
    pub buy_price: Decimal,
    /// Supervisor cycles elapsed while waiting on fills or holding.
    pub wait_count: u64,

    // Control state
    pub offset: OffsetState,
    /// Suppresses rebuy after a profit-take sell until the next baseline refresh.
    pub locked_out: bool,
    /// An emergency stop-loss sell is in flight.
    pub liquidating: bool,
}

/// Ratio of held value to budget below which a position counts as closed.
fn effectively_closed_ratio() -> Decimal {
    Decimal::new(5, 2)
}

fn decimal_param(name: &'static str, value: f64) -> Result<Decimal, ConfigError> {
    Decimal::try_from(value).map_err(|_| ConfigError::InvalidNumber { name, value })
}

impl InstrumentState {
    /// Builds a fresh state from a catalog entry and its owning profile,
    /// with all mutable fields zeroed.
    ///
    /// # Errors
    /// Returns an error if a profile parameter cannot be represented as a
    /// decimal.
    pub fn new(entry: &CatalogEntry, profile: &ProfileConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            symbol: entry.symbol.clone(),
            exchange: entry.exchange.clone(),
            price_tick: entry.price_tick,
            lot_size: entry.lot_size,
            tier: entry.tier.clone(),
            profile: profile.name.clone(),
            fee_budget: decimal_param("fee_budget", profile.fee_budget)?,
            entry_threshold: decimal_param("entry_threshold", profile.entry_threshold)?,
            entry_ceiling: decimal_param("entry_ceiling", profile.entry_ceiling)?,
            exit_threshold: decimal_param("exit_threshold", profile.exit_threshold)?,
            wait_time_secs: profile.wait_time_secs,
            baseline: Decimal::ZERO,
            last_price: Decimal::ZERO,
            last_bid: Decimal::ZERO,
            last_ask: Decimal::ZERO,
            momentum: 0,
            last_sell_price: Decimal::ZERO,
            avg_buy_price: Decimal::ZERO,
            position_volume: Decimal::ZERO,
            committed_budget: Decimal::ZERO,
            buy_order_id: None,
            sell_order_id: None,
            buy_time: None,
            buy_price: Decimal::ZERO,
            wait_count: 0,
            offset: OffsetState::Open,
            locked_out: false,
            liquidating: false,
        })
    }

    /// Quote budget still available for buys.
    #[must_use]
    pub fn remaining_budget(&self) -> Decimal {
        self.fee_budget - self.committed_budget
    }

    /// Daily re-arm: sets the baseline and clears the fields that only
    /// live for one trading day.
    pub fn reset_daily(&mut self, baseline: Decimal) {
        self.baseline = baseline;
        self.last_sell_price = Decimal::ZERO;
        self.momentum = 0;
        self.locked_out = false;
    }

    /// True when the held value is negligible relative to the budget.
    #[must_use]
    pub fn effectively_closed(&self) -> bool {
        if self.fee_budget <= Decimal::ZERO {
            return true;
        }
        self.avg_buy_price * self.position_volume / self.fee_budget < effectively_closed_ratio()
    }

    /// Folds a buy fill into the volume-weighted cost basis.
    ///
    /// Fees on buys are charged in the purchased asset, so the position
    /// grows by `volume - fees`.
    pub fn apply_buy_fill(&mut self, volume: Decimal, price: Decimal, fees: Decimal) {
        let new_volume = self.position_volume + volume - fees;
        if new_volume <= Decimal::ZERO {
            self.position_volume = Decimal::ZERO;
            self.avg_buy_price = Decimal::ZERO;
            return;
        }
        self.avg_buy_price =
            (self.avg_buy_price * self.position_volume + volume * price) / new_volume;
        self.position_volume = new_volume;
    }

    /// Applies a sell fill.
    ///
    /// A fill covering the entire position resets the cost basis and
    /// clears the exit bookkeeping; a partial sell leaves the average buy
    /// price untouched (accepted cost-basis drift). The committed budget
    /// is decremented by the rounded proceeds and floored at zero.
    ///
    /// Returns the realized profit when the proceeds exceeded the
    /// committed budget (the clamp case), `None` otherwise.
    pub fn apply_sell_fill(
        &mut self,
        volume: Decimal,
        price: Decimal,
        fees: Decimal,
    ) -> Option<Decimal> {
        let full_exit = volume >= self.position_volume;
        self.position_volume = (self.position_volume - volume).max(Decimal::ZERO);
        if full_exit {
            self.avg_buy_price = Decimal::ZERO;
            self.wait_count = 0;
            self.sell_order_id = None;
            self.liquidating = false;
        }
        self.last_sell_price = price;

        let proceeds = (volume * price).round_dp(8) - fees;
        self.committed_budget -= proceeds;
        if self.committed_budget < Decimal::ZERO {
            let profit = -self.committed_budget;
            self.committed_budget = Decimal::ZERO;
            return Some(profit);
        }
        None
    }

    /// Re-arms the instrument for new entries once the position is
    /// negligible. Returns true when the state changed to `Open`.
    pub fn re_arm_if_closed(&mut self) -> bool {
        if self.effectively_closed() {
            self.momentum = 0;
            self.offset = OffsetState::Open;
            true
        } else {
            false
        }
    }
}
