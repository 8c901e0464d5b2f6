//! Rolling per-day statistics for one instrument.
//!
//! A day's price change is appended exactly once, when its last bar is seen.
//! Volume accumulates on every bar of the day, the finalizing bar included.
//! Averages use a strict window: fewer completed days than the lookback is
//! [`InsufficientHistory`], otherwise exactly the most recent `lookback` days.

use log::warn;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("insufficient history: have {have} completed days, need {need}")]
pub struct InsufficientHistory {
    pub have: usize,
    pub need: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RollingStatsTracker {
    price_changes: Vec<(usize, f64)>,
    volume_by_day: BTreeMap<usize, f64>,
    prior_close: Option<f64>,
    last_finalized_day: Option<usize>,
    realized_value: f64,
}

impl RollingStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bar_volume(&mut self, day: usize, volume: f64) {
        *self.volume_by_day.entry(day).or_insert(0.0) += volume;
    }

    /// Close out `day` at `close`. Returns the day's change, or `None` for the
    /// first day of the stream (no prior close) and for repeated calls.
    pub fn finalize_day(&mut self, day: usize, close: f64) -> Option<f64> {
        if self.last_finalized_day.is_some_and(|last| day <= last) {
            warn!("day {} already finalized, ignoring close {}", day, close);
            return None;
        }
        self.last_finalized_day = Some(day);

        let change = self.prior_close.map(|prev| (close - prev) / prev);
        if let Some(change) = change {
            self.price_changes.push((day, change));
        }
        self.prior_close = Some(close);
        change
    }

    /// Number of completed days holding a price change.
    pub fn completed_days(&self) -> usize {
        self.price_changes.len()
    }

    pub fn prior_close(&self) -> Option<f64> {
        self.prior_close
    }

    pub fn volume_of(&self, day: usize) -> f64 {
        self.volume_by_day.get(&day).copied().unwrap_or(0.0)
    }

    fn window(&self, lookback: usize) -> Result<&[(usize, f64)], InsufficientHistory> {
        let have = self.price_changes.len();
        if lookback == 0 || have < lookback {
            return Err(InsufficientHistory {
                have,
                need: lookback.max(1),
            });
        }
        Ok(&self.price_changes[have - lookback..])
    }

    /// Mean of `|change|` over the last `lookback` completed days.
    pub fn average_price_change(&self, lookback: usize) -> Result<f64, InsufficientHistory> {
        let window = self.window(lookback)?;
        let sum: f64 = window.iter().map(|(_, c)| c.abs()).sum();
        Ok(sum / window.len() as f64)
    }

    /// Mean daily volume over the same days as [`Self::average_price_change`].
    pub fn average_volume(&self, lookback: usize) -> Result<f64, InsufficientHistory> {
        let window = self.window(lookback)?;
        let sum: f64 = window.iter().map(|(day, _)| self.volume_of(*day)).sum();
        Ok(sum / window.len() as f64)
    }

    pub fn record_realized(&mut self, value: f64) {
        self.realized_value += value;
    }

    pub fn realized_value(&self) -> f64 {
        self.realized_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tracker_with_closes(closes: &[f64]) -> RollingStatsTracker {
        let mut t = RollingStatsTracker::new();
        for (day, &close) in closes.iter().enumerate() {
            t.add_bar_volume(day, 1000.0 * (day + 1) as f64);
            t.finalize_day(day, close);
        }
        t
    }

    #[test]
    fn first_day_only_sets_reference_close() {
        let mut t = RollingStatsTracker::new();
        assert_eq!(t.finalize_day(0, 100.0), None);
        assert_eq!(t.completed_days(), 0);
        assert_eq!(t.prior_close(), Some(100.0));
    }

    #[test]
    fn change_is_relative_to_prior_close() {
        let mut t = RollingStatsTracker::new();
        t.finalize_day(0, 100.0);
        let change = t.finalize_day(1, 102.0).unwrap();
        assert_relative_eq!(change, 0.02, epsilon = 1e-12);
    }

    #[test]
    fn finalize_twice_is_ignored() {
        let mut t = RollingStatsTracker::new();
        t.finalize_day(0, 100.0);
        t.finalize_day(1, 101.0);
        assert_eq!(t.finalize_day(1, 150.0), None);
        assert_eq!(t.completed_days(), 1);
        assert_eq!(t.prior_close(), Some(101.0));
    }

    #[test]
    fn average_with_lookback_one() {
        let t = tracker_with_closes(&[100.0, 110.0, 99.0]);
        // last change: (99 - 110) / 110
        let expected = (99.0_f64 - 110.0).abs() / 110.0;
        assert_relative_eq!(t.average_price_change(1).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn average_over_full_history_uses_abs() {
        let t = tracker_with_closes(&[100.0, 110.0, 99.0]);
        let expected = (0.1 + 11.0 / 110.0) / 2.0;
        assert_relative_eq!(t.average_price_change(2).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn average_fails_with_short_history() {
        let t = tracker_with_closes(&[100.0, 110.0, 99.0]);
        assert_eq!(
            t.average_price_change(3),
            Err(InsufficientHistory { have: 2, need: 3 })
        );
        assert!(t.average_volume(3).is_err());
    }

    #[test]
    fn zero_lookback_is_insufficient() {
        let t = tracker_with_closes(&[100.0, 110.0]);
        assert!(t.average_price_change(0).is_err());
    }

    #[test]
    fn volume_average_aligned_with_change_days() {
        // day volumes: 1000, 2000, 3000; changes exist for days 1 and 2
        let t = tracker_with_closes(&[100.0, 110.0, 99.0]);
        assert_relative_eq!(t.average_volume(2).unwrap(), 2500.0);
        assert_relative_eq!(t.average_volume(1).unwrap(), 3000.0);
    }

    #[test]
    fn volume_accumulates_per_day() {
        let mut t = RollingStatsTracker::new();
        t.add_bar_volume(4, 10.0);
        t.add_bar_volume(4, 15.0);
        assert_relative_eq!(t.volume_of(4), 25.0);
        assert_relative_eq!(t.volume_of(5), 0.0);
    }

    #[test]
    fn realized_value_sums() {
        let mut t = RollingStatsTracker::new();
        t.record_realized(10.0);
        t.record_realized(-4.0);
        assert_relative_eq!(t.realized_value(), 6.0);
    }
}
