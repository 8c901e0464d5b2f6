//! Cash, open positions and the daily equity curve.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::position::{Fill, FillOutcome, Position, TradeRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: HashMap<String, Position>,
    pub last_prices: HashMap<String, f64>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            last_prices: HashMap::new(),
            equity_curve: Vec::new(),
        }
    }

    /// Signed quantity held, 0 when flat.
    pub fn quantity(&self, ticker: &str) -> i64 {
        self.positions.get(ticker).map_or(0, |p| p.quantity)
    }

    pub fn mark(&mut self, ticker: &str, price: f64) {
        self.last_prices.insert(ticker.to_string(), price);
    }

    /// Settle a fill in cash and positions. Returns the trade record when the
    /// position returns to flat.
    pub fn apply_fill(&mut self, ticker: &str, fill: &Fill) -> Option<TradeRecord> {
        self.cash -= fill.quantity as f64 * fill.price + fill.commission;

        let outcome = match self.positions.remove(ticker) {
            Some(position) => position.apply(fill),
            None => FillOutcome::Open(Position::open(ticker, fill)),
        };
        match outcome {
            FillOutcome::Open(position) => {
                self.positions.insert(ticker.to_string(), position);
                None
            }
            FillOutcome::Closed(record) => Some(record),
        }
    }

    /// `cash + sum(quantity * last price)`. Positions without a price are
    /// valued at their average entry price.
    pub fn total_equity(&self) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|pos| {
                let price = self
                    .last_prices
                    .get(&pos.ticker)
                    .copied()
                    .unwrap_or(pos.avg_price);
                pos.market_value(price)
            })
            .sum();
        self.cash + position_value
    }

    pub fn record_equity(&mut self, date: NaiveDate) {
        let equity = self.total_equity();
        match self.equity_curve.last_mut() {
            Some(last) if last.date == date => last.equity = equity,
            _ => self.equity_curve.push(EquityPoint { date, equity }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn fill(quantity: i64, price: f64, commission: f64) -> Fill {
        Fill {
            quantity,
            price,
            commission,
            time: date().and_hms_opt(10, 0, 0).unwrap(),
            bar: 0,
        }
    }

    #[test]
    fn new_portfolio() {
        let portfolio = Portfolio::new(100000.0);
        assert!((portfolio.cash - 100000.0).abs() < f64::EPSILON);
        assert!(portfolio.positions.is_empty());
        assert!(portfolio.equity_curve.is_empty());
        assert!((portfolio.total_equity() - 100000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn buy_moves_cash_into_position() {
        let mut portfolio = Portfolio::new(100000.0);
        assert!(portfolio.apply_fill("SBER", &fill(100, 110.0, 5.0)).is_none());
        assert!((portfolio.cash - (100000.0 - 11000.0 - 5.0)).abs() < 1e-9);
        assert_eq!(portfolio.quantity("SBER"), 100);
        assert_eq!(portfolio.positions.len(), 1);

        portfolio.mark("SBER", 120.0);
        assert!((portfolio.total_equity() - (100000.0 - 5.0 + 1000.0)).abs() < 1e-9);
    }

    #[test]
    fn closing_returns_trade_and_clears_position() {
        let mut portfolio = Portfolio::new(100000.0);
        portfolio.apply_fill("SBER", &fill(100, 100.0, 4.0));
        let record = portfolio.apply_fill("SBER", &fill(-100, 110.0, 4.4)).unwrap();
        assert!((record.net_pnl - (1000.0 - 8.4)).abs() < 1e-9);
        assert_eq!(portfolio.quantity("SBER"), 0);
        assert!(!portfolio.positions.contains_key("SBER"));
        assert!((portfolio.cash - (100000.0 + 1000.0 - 8.4)).abs() < 1e-9);
    }

    #[test]
    fn short_sale_adds_cash_and_negative_value() {
        let mut portfolio = Portfolio::new(1000.0);
        portfolio.apply_fill("SBER", &fill(-10, 50.0, 0.0));
        portfolio.mark("SBER", 40.0);
        assert!((portfolio.cash - 1500.0).abs() < 1e-9);
        assert!((portfolio.total_equity() - 1100.0).abs() < 1e-9);
    }

    #[test]
    fn record_equity_once_per_date() {
        let mut portfolio = Portfolio::new(1000.0);
        portfolio.record_equity(date());
        portfolio.cash = 1100.0;
        portfolio.record_equity(date());
        assert_eq!(portfolio.equity_curve.len(), 1);
        assert!((portfolio.equity_curve[0].equity - 1100.0).abs() < f64::EPSILON);
    }
}
