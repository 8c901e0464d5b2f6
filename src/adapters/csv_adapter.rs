//! CSV file candle store.
//!
//! One file per instrument and interval, `<TICKER>_<interval>.csv`, with the
//! header `time,open,high,low,close,volume`. Times are exchange local, written
//! as `%Y-%m-%d %H:%M:%S` with an optional UTC offset that is discarded.

use crate::domain::candle::{Candle, CandleInterval};
use crate::domain::error::CloseHighError;
use crate::ports::data_port::CandleStore;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Weekday};
use log::{debug, warn};
use std::fs;
use std::path::PathBuf;

pub struct CsvCandleStore {
    base_path: PathBuf,
}

impl CsvCandleStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str, interval: CandleInterval) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", ticker, interval.file_suffix()))
    }

    fn read_all(&self, ticker: &str, interval: CandleInterval) -> Result<Vec<Candle>, CloseHighError> {
        let path = self.csv_path(ticker, interval);
        if !path.exists() {
            return Err(CloseHighError::NoData {
                ticker: ticker.to_string(),
                interval: interval.to_string(),
            });
        }
        let content = fs::read_to_string(&path)?;
        let source_name = path.display().to_string();
        let candles = parse_candles(&content, &source_name)?;
        Ok(clean_candles(candles, &source_name))
    }
}

fn data_error(source_name: &str, reason: String) -> CloseHighError {
    CloseHighError::DataFormat {
        source_name: source_name.to_string(),
        reason,
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%:z")
                .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%z"))
                .ok()
                .map(|dt| dt.naive_local())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
}

fn parse_field(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    line: u64,
    source_name: &str,
) -> Result<f64, CloseHighError> {
    let raw = record
        .get(index)
        .ok_or_else(|| data_error(source_name, format!("line {}: missing {} column", line, name)))?;
    let value: f64 = raw.trim().parse().map_err(|e| {
        data_error(
            source_name,
            format!("line {}: invalid {} value '{}': {}", line, name, raw, e),
        )
    })?;
    if !value.is_finite() {
        return Err(data_error(
            source_name,
            format!("line {}: {} is not finite", line, name),
        ));
    }
    Ok(value)
}

/// Parse candle rows in file order.
pub fn parse_candles(content: &str, source_name: &str) -> Result<Vec<Candle>, CloseHighError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut candles = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| data_error(source_name, format!("CSV parse error: {}", e)))?;
        let line = record.position().map_or(0, |p| p.line());

        let time_str = record
            .get(0)
            .ok_or_else(|| data_error(source_name, format!("line {}: missing time column", line)))?;
        let timestamp = parse_timestamp(time_str).ok_or_else(|| {
            data_error(
                source_name,
                format!("line {}: invalid time '{}'", line, time_str),
            )
        })?;

        candles.push(Candle {
            timestamp,
            open: parse_field(&record, 1, "open", line, source_name)?,
            high: parse_field(&record, 2, "high", line, source_name)?,
            low: parse_field(&record, 3, "low", line, source_name)?,
            close: parse_field(&record, 4, "close", line, source_name)?,
            volume: parse_field(&record, 5, "volume", line, source_name)?,
        });
    }

    Ok(candles)
}

/// Sort by time, keep the first of duplicate timestamps and drop weekend bars.
pub fn clean_candles(mut candles: Vec<Candle>, source_name: &str) -> Vec<Candle> {
    candles.sort_by_key(|c| c.timestamp);

    let before = candles.len();
    candles.dedup_by_key(|c| c.timestamp);
    let duplicates = before - candles.len();
    if duplicates > 0 {
        warn!("{}: dropped {} duplicate candles", source_name, duplicates);
    }

    let before = candles.len();
    candles.retain(|c| !matches!(c.timestamp.weekday(), Weekday::Sat | Weekday::Sun));
    let weekend = before - candles.len();
    if weekend > 0 {
        debug!("{}: dropped {} weekend candles", source_name, weekend);
    }

    candles
}

impl CandleStore for CsvCandleStore {
    fn fetch_candles(
        &self,
        ticker: &str,
        interval: CandleInterval,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Candle>, CloseHighError> {
        let mut candles = self.read_all(ticker, interval)?;
        candles.retain(|c| {
            let date = c.date();
            date >= from && date <= to
        });
        Ok(candles)
    }

    fn list_tickers(&self, interval: CandleInterval) -> Result<Vec<String>, CloseHighError> {
        let suffix = format!("_{}.csv", interval.file_suffix());
        let mut tickers = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let name = entry?.file_name();
            let name_str = name.to_string_lossy();
            if let Some(ticker) = name_str.strip_suffix(&suffix) {
                if !ticker.is_empty() {
                    tickers.push(ticker.to_string());
                }
            }
        }

        tickers.sort();
        Ok(tickers)
    }

    fn data_range(
        &self,
        ticker: &str,
        interval: CandleInterval,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, CloseHighError> {
        let candles = match self.read_all(ticker, interval) {
            Ok(c) => c,
            Err(CloseHighError::NoData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(match (candles.first(), candles.last()) {
            (Some(first), Some(last)) => Some((first.date(), last.date(), candles.len())),
            _ => None,
        })
    }
}
