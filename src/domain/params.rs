//! Strategy parameters and exchange session schedule.
//!
//! Both are immutable values handed to a run at construction time.

use chrono::NaiveTime;
use std::fmt;

/// Parameters of one closing-on-highs simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    /// Day change must exceed the rolling mean absolute change times this.
    pub c_price_change: f64,
    /// Today's volume must exceed the rolling mean daily volume times this.
    pub c_volume_change: f64,
    /// Day change must exceed this share of the move to the day's high.
    pub c_from_low: f64,
    /// Day change must stay this share below the move to the day's high.
    pub c_from_high: f64,
    pub take_pct: f64,
    pub stop_pct: f64,
    pub days_look_back: usize,
    pub trade_end_of_main_session: bool,
    pub trade_end_of_evening_session: bool,
    pub trade_before_weekends: bool,
    pub max_fraction_of_cash: f64,
    /// Close a held position during the first bars of the next session.
    pub exit_next_session: bool,
}

impl fmt::Display for StrategyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "c_price_change={} c_volume_change={} c_from_low={} c_from_high={} \
             take_pct={} stop_pct={} days_look_back={} main={} evening={} \
             before_weekends={} max_fraction={} exit_next_session={}",
            self.c_price_change,
            self.c_volume_change,
            self.c_from_low,
            self.c_from_high,
            self.take_pct,
            self.stop_pct,
            self.days_look_back,
            self.trade_end_of_main_session,
            self.trade_end_of_evening_session,
            self.trade_before_weekends,
            self.max_fraction_of_cash,
            self.exit_next_session,
        )
    }
}

/// Half-open time-of-day window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }

    /// Parse `HH:MM-HH:MM`.
    pub fn parse(value: &str) -> Option<Self> {
        let (start, end) = value.split_once('-')?;
        let start = parse_time(start)?;
        let end = parse_time(end)?;
        if start >= end {
            return None;
        }
        Some(Self { start, end })
    }
}

pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Session times that the segmenter and the time gate depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSchedule {
    pub opening_auction: Option<NaiveTime>,
    pub main_close: TimeWindow,
    pub evening_close: TimeWindow,
}

impl SessionSchedule {
    /// Moscow Exchange equities: 09:50 opening auction, main session closing at
    /// 18:40, evening session closing at 23:50.
    pub fn moex() -> Self {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self {
            opening_auction: Some(t(9, 50)),
            main_close: TimeWindow::new(t(18, 30), t(18, 40)),
            evening_close: TimeWindow::new(t(23, 40), t(23, 50)),
        }
    }
}
