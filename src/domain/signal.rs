//! Entry rule for the closing-on-highs pattern.
//!
//! Evaluated on the decision bar of a day, i.e. the bar right before the
//! day's last bar. Long entries only.
//!
//! Time gate truth table (`M`/`E`: bar time inside the main/evening close window):
//!
//! | main  | evening | passes iff |
//! |-------|---------|------------|
//! | false | false   | never      |
//! | true  | false   | M          |
//! | false | true    | E          |
//! | true  | true    | M or E     |
//!
//! Price gates are always ANDed with the time gate.

use crate::domain::params::{SessionSchedule, StrategyParams};
use chrono::NaiveTime;

/// Market state at the decision bar. Every field is built from bars at or
/// before the current one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalInputs {
    pub close: f64,
    pub prior_close: f64,
    pub running_high: f64,
    pub avg_price_change: f64,
    pub avg_volume: f64,
    pub volume_today: f64,
    pub time: NaiveTime,
    /// Calendar days until the next trading day.
    pub gap_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub day_change: f64,
    pub change_to_high: f64,
    pub min_day_change: f64,
    pub min_volume: f64,
    pub near_high_floor: f64,
    pub below_high_cap: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateReport {
    pub price_change: bool,
    pub volume: bool,
    pub near_high: bool,
    pub below_high: bool,
    pub time: bool,
    pub weekend: bool,
}

impl GateReport {
    pub fn all(&self) -> bool {
        self.price_change
            && self.volume
            && self.near_high
            && self.below_high
            && self.time
            && self.weekend
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalDecision {
    pub should_enter: bool,
    pub reference_price: f64,
    pub thresholds: Thresholds,
    pub gates: GateReport,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalEvaluator {
    c_price_change: f64,
    c_volume_change: f64,
    c_from_low: f64,
    c_from_high: f64,
    trade_main: bool,
    trade_evening: bool,
    trade_before_weekends: bool,
    schedule: SessionSchedule,
}

impl SignalEvaluator {
    pub fn new(params: &StrategyParams, schedule: SessionSchedule) -> Self {
        Self {
            c_price_change: params.c_price_change,
            c_volume_change: params.c_volume_change,
            c_from_low: params.c_from_low,
            c_from_high: params.c_from_high,
            trade_main: params.trade_end_of_main_session,
            trade_evening: params.trade_end_of_evening_session,
            trade_before_weekends: params.trade_before_weekends,
            schedule,
        }
    }

    pub fn time_gate(&self, time: NaiveTime) -> bool {
        let in_main = self.schedule.main_close.contains(time);
        let in_evening = self.schedule.evening_close.contains(time);
        match (self.trade_main, self.trade_evening) {
            (false, false) => false,
            (true, false) => in_main,
            (false, true) => in_evening,
            (true, true) => in_main || in_evening,
        }
    }

    pub fn weekend_gate(&self, gap_days: i64) -> bool {
        self.trade_before_weekends || gap_days <= 1
    }

    pub fn evaluate(&self, inputs: &SignalInputs) -> SignalDecision {
        let prior = inputs.prior_close;
        let day_change = (inputs.close - prior) / prior;
        let change_to_high = (inputs.running_high - prior) / prior;

        let thresholds = Thresholds {
            day_change,
            change_to_high,
            min_day_change: inputs.avg_price_change * self.c_price_change,
            min_volume: inputs.avg_volume * self.c_volume_change,
            near_high_floor: change_to_high * self.c_from_low,
            below_high_cap: change_to_high * (1.0 - self.c_from_high),
        };

        let gates = GateReport {
            price_change: day_change > thresholds.min_day_change,
            volume: inputs.volume_today > thresholds.min_volume,
            near_high: change_to_high >= day_change && day_change > thresholds.near_high_floor,
            below_high: day_change <= thresholds.below_high_cap,
            time: self.time_gate(inputs.time),
            weekend: self.weekend_gate(inputs.gap_days),
        };

        SignalDecision {
            should_enter: gates.all(),
            reference_price: inputs.close,
            thresholds,
            gates,
        }
    }
}
