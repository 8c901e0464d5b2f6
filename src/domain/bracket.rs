//! Bracketed entry orders: a limit buy plus take-profit and stop-loss exits.
//!
//! The exits are children of the entry (activated when it fills) and cancel
//! each other.

use chrono::NaiveDateTime;
use log::info;

use crate::domain::error::CloseHighError;
use crate::domain::order::{OrderId, OrderKind, OrderRequest, Side};
use crate::domain::sizer::PositionSizer;
use crate::ports::broker_port::BrokerPort;

/// Entry, take-profit and stop-loss prices. Always `take > entry > stop`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BracketPrices {
    pub entry: f64,
    pub take: f64,
    pub stop: f64,
}

impl BracketPrices {
    /// `take = close * (1 + take_pct)`, `stop = close * (1 - stop_pct)`.
    /// `None` when the prices would not be strictly ordered.
    pub fn compute(close: f64, take_pct: f64, stop_pct: f64) -> Option<Self> {
        let prices = Self {
            entry: close,
            take: close * (1.0 + take_pct),
            stop: close * (1.0 - stop_pct),
        };
        let ordered = prices.take > prices.entry && prices.entry > prices.stop && prices.stop > 0.0;
        ordered.then_some(prices)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IssueOutcome {
    Submitted {
        entry: OrderId,
        take: OrderId,
        stop: OrderId,
        quantity: u64,
        prices: BracketPrices,
    },
    /// A live order for the instrument already exists for this bar and price.
    DuplicateRejected,
    ZeroQuantity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BracketOrderIssuer {
    take_pct: f64,
    stop_pct: f64,
    sizer: PositionSizer,
}

impl BracketOrderIssuer {
    pub fn new(take_pct: f64, stop_pct: f64, sizer: PositionSizer) -> Self {
        Self {
            take_pct,
            stop_pct,
            sizer,
        }
    }

    /// Issue a bracket for `ticker` at `close`, placed at bar time `timestamp`.
    pub fn issue(
        &self,
        broker: &mut dyn BrokerPort,
        ticker: &str,
        timestamp: NaiveDateTime,
        close: f64,
    ) -> Result<IssueOutcome, CloseHighError> {
        let prices = BracketPrices::compute(close, self.take_pct, self.stop_pct).ok_or_else(|| {
            CloseHighError::InvalidBracket {
                ticker: ticker.to_string(),
                reason: format!(
                    "close={close} take_pct={} stop_pct={} do not give take > entry > stop",
                    self.take_pct, self.stop_pct
                ),
            }
        })?;

        let duplicate = broker
            .live_orders(ticker)
            .iter()
            .any(|o| o.created_at == timestamp && o.price() == Some(prices.entry));
        if duplicate {
            info!("{} | duplicate order at {} @ {:.4} rejected", ticker, timestamp, prices.entry);
            return Ok(IssueOutcome::DuplicateRejected);
        }

        let quantity = self
            .sizer
            .size(ticker, broker.cash(), broker.portfolio_value(), close)?;
        if quantity == 0 {
            info!("{} | sized to zero at {:.4}, no order", ticker, close);
            return Ok(IssueOutcome::ZeroQuantity);
        }

        let leg = |side, kind, parent, oco| OrderRequest {
            ticker: ticker.to_string(),
            side,
            kind,
            quantity,
            created_at: timestamp,
            parent,
            oco,
        };
        let entry = broker.submit(leg(Side::Buy, OrderKind::Limit(prices.entry), None, None));
        let take = broker.submit(leg(Side::Sell, OrderKind::Limit(prices.take), Some(entry), None));
        let stop = broker.submit(leg(Side::Sell, OrderKind::Stop(prices.stop), Some(entry), Some(take)));

        info!(
            "{} | bracket {} x{} entry={:.4} take={:.4} stop={:.4}",
            ticker, entry, quantity, prices.entry, prices.take, prices.stop
        );
        Ok(IssueOutcome::Submitted {
            entry,
            take,
            stop,
            quantity,
            prices,
        })
    }
}
