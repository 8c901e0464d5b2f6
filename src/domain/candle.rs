//! OHLCV candle representation.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

/// One bar for one instrument. Timestamps are exchange-local.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn time(&self) -> NaiveTime {
        self.timestamp.time()
    }
}

/// Bar interval supported by the candle store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandleInterval {
    Minute,
    Day,
}

impl CandleInterval {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "1min" | "minute" | "1m" => Some(CandleInterval::Minute),
            "day" | "1d" | "daily" => Some(CandleInterval::Day),
            _ => None,
        }
    }

    /// Suffix used in candle file names.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            CandleInterval::Minute => "1min",
            CandleInterval::Day => "day",
        }
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_suffix())
    }
}
