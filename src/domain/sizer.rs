//! Converts cash and portfolio value into a whole order quantity.

use crate::domain::error::CloseHighError;

/// Share of the affordable quantity used when cash is already below the
/// per-trade cap.
const LOW_CASH_FRACTION: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSizer {
    max_fraction: f64,
}

impl PositionSizer {
    pub fn new(max_fraction: f64) -> Self {
        Self { max_fraction }
    }

    /// Quantity to buy at `price`:
    ///
    /// - `cash < value * max_fraction`: 90% of what cash affords;
    /// - `cash <= value`: `max_fraction` of what cash affords;
    /// - `cash > value` (a short is open): nothing.
    ///
    /// Inputs for which none of these comparisons hold are a
    /// [`CloseHighError::SizingInconsistency`].
    pub fn size(&self, ticker: &str, cash: f64, value: f64, price: f64) -> Result<u64, CloseHighError> {
        let inconsistent = || CloseHighError::SizingInconsistency {
            ticker: ticker.to_string(),
            cash,
            value,
            price,
        };
        if !(price > 0.0) || !price.is_finite() || !cash.is_finite() || !value.is_finite() {
            return Err(inconsistent());
        }

        let affordable = (cash / price).floor();
        let quantity = if cash < value * self.max_fraction {
            (affordable * LOW_CASH_FRACTION).floor()
        } else if cash <= value {
            (affordable * self.max_fraction).floor()
        } else if cash > value {
            0.0
        } else {
            return Err(inconsistent());
        };

        Ok(quantity.max(0.0) as u64)
    }
}
