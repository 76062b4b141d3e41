use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use surge_trade_core::{FillDirection, FillEvent, OrderGateway};
use tracing::info;

/// One order recorded by the paper gateway.
#[derive(Debug, Clone)]
pub struct PaperOrder {
    pub id: String,
    pub symbol: String,
    pub direction: FillDirection,
    pub price: Decimal,
    pub volume: Decimal,
}

/// Order gateway that records submissions instead of routing them.
///
/// Makes zero network calls; fills are produced by the caller via
/// [`PaperGateway::fill`], which mirrors how the live gateway delivers
/// asynchronous fill notifications.
#[derive(Debug, Default)]
pub struct PaperGateway {
    orders: Mutex<Vec<PaperOrder>>,
    cancelled: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl PaperGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, symbol: &str, direction: FillDirection, price: Decimal, volume: Decimal) -> String {
        let id = format!("paper-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let order = PaperOrder {
            id: id.clone(),
            symbol: symbol.to_string(),
            direction,
            price,
            volume,
        };
        info!(
            "paper {:?} {} {}@{} ({})",
            direction, symbol, volume, price, id
        );
        self.orders.lock().unwrap().push(order);
        id
    }

    /// All orders submitted so far, in submission order.
    #[must_use]
    pub fn orders(&self) -> Vec<PaperOrder> {
        self.orders.lock().unwrap().clone()
    }

    /// Ids passed to `cancel`, in call order.
    #[must_use]
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    #[must_use]
    pub fn last_order(&self) -> Option<PaperOrder> {
        self.orders.lock().unwrap().last().cloned()
    }

    /// Builds the fill notification for an order, fully or partially.
    #[must_use]
    pub fn fill(
        &self,
        order: &PaperOrder,
        volume: Decimal,
        fees: Decimal,
        at: DateTime<Utc>,
    ) -> FillEvent {
        FillEvent {
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            direction: order.direction,
            volume,
            price: order.price,
            fees,
            timestamp: at,
        }
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn submit_buy(&self, symbol: &str, price: Decimal, volume: Decimal) -> Result<String> {
        Ok(self.record(symbol, FillDirection::Buy, price, volume))
    }

    async fn submit_sell(&self, symbol: &str, price: Decimal, volume: Decimal) -> Result<String> {
        Ok(self.record(symbol, FillDirection::Sell, price, volume))
    }

    async fn cancel(&self, order_id: &str) -> Result<()> {
        self.cancelled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }
}
