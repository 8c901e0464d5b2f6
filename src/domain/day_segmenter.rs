//! Calendar-day segmentation of an intraday candle stream.
//!
//! The boundary table is built once from the buffered history of a run. It is
//! metadata only: a boundary after bar `i` is known from the date of bar `i + 1`,
//! and nothing built on top of it reads prices or volumes past the current bar.
//! The trailing day of a stream has no detected boundary and is never traded.

use crate::domain::candle::Candle;
use chrono::{NaiveDate, NaiveTime};
use log::warn;

/// Closed index range `[first_bar, last_bar]` of one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySegment {
    pub day: usize,
    pub date: NaiveDate,
    pub first_bar: usize,
    pub last_bar: usize,
}

impl DaySegment {
    pub fn bar_count(&self) -> usize {
        self.last_bar - self.first_bar + 1
    }
}

/// Where a bar sits inside its trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPosition {
    pub day: usize,
    pub first_bar: usize,
    pub last_bar: usize,
    pub is_first_bar: bool,
    pub is_last_bar: bool,
    /// The bar immediately preceding the day's last bar.
    pub is_decision_bar: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarLocation {
    InDay(DayPosition),
    /// Past the last known day boundary of the stream.
    Exhausted,
}

#[derive(Debug, Clone, Default)]
pub struct DaySegments {
    last_bars: Vec<usize>,
    dates: Vec<NaiveDate>,
    next_dates: Vec<NaiveDate>,
    missing_auction_days: usize,
}

impl DaySegments {
    /// Scan `candles` for date changes. When `opening_auction` is set, a day whose
    /// first bar starts at any other time is logged as missing its auction candle.
    pub fn build(ticker: &str, candles: &[Candle], opening_auction: Option<NaiveTime>) -> Self {
        let mut segments = DaySegments::default();

        for (i, pair) in candles.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.date() <= prev.date() {
                continue;
            }
            segments.last_bars.push(i);
            segments.dates.push(prev.date());
            segments.next_dates.push(next.date());

            if let Some(expected) = opening_auction {
                if next.time() != expected {
                    segments.missing_auction_days += 1;
                    warn!(
                        "{} | no opening auction candle | last={} | first={} | expected {}",
                        ticker, prev.timestamp, next.timestamp, expected
                    );
                }
            }
        }

        segments
    }

    /// Index of the last bar of every day that has a detected boundary.
    pub fn last_bar_indices(&self) -> &[usize] {
        &self.last_bars
    }

    /// Number of days with a known last bar.
    pub fn day_count(&self) -> usize {
        self.last_bars.len()
    }

    pub fn missing_auction_days(&self) -> usize {
        self.missing_auction_days
    }

    pub fn segment(&self, day: usize) -> Option<DaySegment> {
        let last_bar = *self.last_bars.get(day)?;
        let first_bar = if day == 0 {
            0
        } else {
            self.last_bars[day - 1] + 1
        };
        Some(DaySegment {
            day,
            date: self.dates[day],
            first_bar,
            last_bar,
        })
    }

    pub fn locate(&self, index: usize) -> BarLocation {
        let day = self.last_bars.partition_point(|&last| last < index);
        match self.segment(day) {
            Some(seg) => BarLocation::InDay(DayPosition {
                day,
                first_bar: seg.first_bar,
                last_bar: seg.last_bar,
                is_first_bar: index == seg.first_bar,
                is_last_bar: index == seg.last_bar,
                is_decision_bar: index + 1 == seg.last_bar,
            }),
            None => BarLocation::Exhausted,
        }
    }

    /// Calendar days between `day` and the following trading day.
    pub fn next_day_gap_days(&self, day: usize) -> Option<i64> {
        let date = self.dates.get(day)?;
        let next = self.next_dates.get(day)?;
        Some((*next - *date).num_days())
    }
}
