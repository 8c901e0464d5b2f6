//! Broker access port trait.
//!
//! What the strategy may see and do during a bar: read cash, value, positions
//! and live orders, submit and cancel orders.

use crate::domain::order::{Order, OrderId, OrderRequest};

pub trait BrokerPort {
    fn cash(&self) -> f64;
    fn portfolio_value(&self) -> f64;
    /// Signed quantity held in `ticker`, 0 when flat.
    fn position(&self, ticker: &str) -> i64;
    /// Orders for `ticker` that are submitted or accepted.
    fn live_orders(&self, ticker: &str) -> Vec<&Order>;
    fn order(&self, id: OrderId) -> Option<&Order>;
    fn submit(&mut self, request: OrderRequest) -> OrderId;
    fn cancel(&mut self, id: OrderId);
}
