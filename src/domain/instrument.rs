//! Per-instrument candle streams and the unified run timeline.

use crate::domain::candle::Candle;
use chrono::NaiveDateTime;
use std::collections::{BTreeSet, HashMap};

/// Ordered, immutable candle history for one instrument.
#[derive(Debug, Clone)]
pub struct InstrumentStream {
    pub ticker: String,
    pub candles: Vec<Candle>,
    pub timestamp_index: HashMap<NaiveDateTime, usize>,
}

impl InstrumentStream {
    pub fn new(ticker: String, candles: Vec<Candle>) -> Self {
        let timestamp_index = candles
            .iter()
            .enumerate()
            .map(|(i, c)| (c.timestamp, i))
            .collect();
        Self {
            ticker,
            candles,
            timestamp_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.candles.len()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn index_of(&self, timestamp: NaiveDateTime) -> Option<usize> {
        self.timestamp_index.get(&timestamp).copied()
    }

    /// A copy holding only the first `len` bars.
    pub fn truncated(&self, len: usize) -> Self {
        let len = len.min(self.candles.len());
        InstrumentStream::new(self.ticker.clone(), self.candles[..len].to_vec())
    }
}

/// Sorted union of every timestamp across the streams.
pub fn build_unified_timeline(streams: &[InstrumentStream]) -> Vec<NaiveDateTime> {
    let unique: BTreeSet<NaiveDateTime> = streams
        .iter()
        .flat_map(|s| s.candles.iter().map(|c| c.timestamp))
        .collect();
    unique.into_iter().collect()
}

/// Joined ticker label of an instrument set, e.g. `SBER+GAZP`.
pub fn ticker_label(streams: &[InstrumentStream]) -> String {
    streams
        .iter()
        .map(|s| s.ticker.as_str())
        .collect::<Vec<_>>()
        .join("+")
}
