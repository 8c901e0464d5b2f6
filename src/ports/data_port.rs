//! Candle store port trait.

use crate::domain::candle::{Candle, CandleInterval};
use crate::domain::error::CloseHighError;
use chrono::NaiveDate;

pub trait CandleStore {
    /// Cleaned candles for `ticker` with dates in `[from, to]`, oldest first.
    fn fetch_candles(
        &self,
        ticker: &str,
        interval: CandleInterval,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Candle>, CloseHighError>;

    fn list_tickers(&self, interval: CandleInterval) -> Result<Vec<String>, CloseHighError>;

    /// First date, last date and bar count, or `None` when nothing is stored.
    fn data_range(
        &self,
        ticker: &str,
        interval: CandleInterval,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, CloseHighError>;
}
