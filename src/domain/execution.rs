//! Fill simulation against a single bar.
//!
//! Orders are matched on bars after the one they were placed on, so the open
//! is the first price they can trade at.

use super::candle::Candle;
use super::order::{OrderKind, Side};

/// Commission for one fill: `rate * |quantity| * price`.
pub fn calculate_commission(quantity: u64, price: f64, rate: f64) -> f64 {
    rate * quantity as f64 * price
}

/// Price at which an order of `kind` on `side` executes during `bar`, if any.
///
/// - market: the open;
/// - buy limit: the open if at or below the limit, else the limit if the low
///   reaches it (sell limit mirrors with the high);
/// - sell stop: the open if at or below the stop, else the stop if the low
///   reaches it (buy stop mirrors with the high).
pub fn fill_price(side: Side, kind: OrderKind, bar: &Candle) -> Option<f64> {
    match (kind, side) {
        (OrderKind::Market, _) => Some(bar.open),
        (OrderKind::Limit(limit), Side::Buy) => {
            if bar.open <= limit {
                Some(bar.open)
            } else if bar.low <= limit {
                Some(limit)
            } else {
                None
            }
        }
        (OrderKind::Limit(limit), Side::Sell) => {
            if bar.open >= limit {
                Some(bar.open)
            } else if bar.high >= limit {
                Some(limit)
            } else {
                None
            }
        }
        (OrderKind::Stop(stop), Side::Sell) => {
            if bar.open <= stop {
                Some(bar.open)
            } else if bar.low <= stop {
                Some(stop)
            } else {
                None
            }
        }
        (OrderKind::Stop(stop), Side::Buy) => {
            if bar.open >= stop {
                Some(bar.open)
            } else if bar.high >= stop {
                Some(stop)
            } else {
                None
            }
        }
    }
}
