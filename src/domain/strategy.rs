//! The closing-on-highs strategy: per-bar, per-instrument state machine.
//!
//! On each bar the strategy places the bar in its trading day, updates the
//! day's running high and volume, and on the decision bar evaluates the entry
//! rule. A positive decision issues a bracket. On a day's last bar the day is
//! finalized into the rolling statistics.

use log::{debug, info};
use std::collections::HashMap;

use crate::domain::bracket::{BracketOrderIssuer, IssueOutcome};
use crate::domain::candle::Candle;
use crate::domain::day_segmenter::{BarLocation, DayPosition, DaySegments};
use crate::domain::error::CloseHighError;
use crate::domain::instrument::InstrumentStream;
use crate::domain::order::{OrderEvent, OrderId, OrderRequest, OrderStatus, Side};
use crate::domain::params::{SessionSchedule, StrategyParams};
use crate::domain::position::TradeRecord;
use crate::domain::results::ResultAggregator;
use crate::domain::rolling_stats::{InsufficientHistory, RollingStatsTracker};
use crate::domain::signal::{SignalDecision, SignalEvaluator, SignalInputs};
use crate::domain::sizer::PositionSizer;
use crate::ports::broker_port::BrokerPort;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipReason {
    /// Bar lies past the stream's last detected day boundary.
    IndexExhausted,
    UnknownInstrument,
    NotDecisionBar,
    /// First day of the stream: no prior close.
    FirstDay,
    InsufficientHistory(InsufficientHistory),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Skip(SkipReason),
    Evaluate {
        signal: SignalDecision,
        /// `None` when the signal was negative or the entry was suppressed.
        issued: Option<IssueOutcome>,
    },
}

/// Per-instrument state, keyed by ticker.
#[derive(Debug, Clone)]
pub struct InstrumentContext {
    pub segments: DaySegments,
    pub stats: RollingStatsTracker,
    current_day: Option<usize>,
    running_high: Option<f64>,
    pending_entry: Option<OrderId>,
    pending_exit: Option<OrderId>,
    /// Day on which the open position was entered.
    entry_day: Option<usize>,
}

impl InstrumentContext {
    fn new(segments: DaySegments) -> Self {
        Self {
            segments,
            stats: RollingStatsTracker::new(),
            current_day: None,
            running_high: None,
            pending_entry: None,
            pending_exit: None,
            entry_day: None,
        }
    }
}

pub struct ClosingOnHighs {
    params: StrategyParams,
    evaluator: SignalEvaluator,
    issuer: BracketOrderIssuer,
    contexts: HashMap<String, InstrumentContext>,
    results: ResultAggregator,
}

impl ClosingOnHighs {
    /// Build day boundaries for every stream up front.
    pub fn new(params: StrategyParams, schedule: SessionSchedule, streams: &[InstrumentStream]) -> Self {
        let contexts = streams
            .iter()
            .map(|s| {
                let segments = DaySegments::build(&s.ticker, &s.candles, schedule.opening_auction);
                debug!(
                    "{} | {} bars, {} complete days, {} without auction candle",
                    s.ticker,
                    s.bar_count(),
                    segments.day_count(),
                    segments.missing_auction_days()
                );
                (s.ticker.clone(), InstrumentContext::new(segments))
            })
            .collect();

        Self {
            evaluator: SignalEvaluator::new(&params, schedule),
            issuer: BracketOrderIssuer::new(
                params.take_pct,
                params.stop_pct,
                PositionSizer::new(params.max_fraction_of_cash),
            ),
            params,
            contexts,
            results: ResultAggregator::new(),
        }
    }

    pub fn context(&self, ticker: &str) -> Option<&InstrumentContext> {
        self.contexts.get(ticker)
    }

    pub fn results(&self) -> &ResultAggregator {
        &self.results
    }

    /// Handle bar `index` of `stream`. Only candles at or before `index` are read.
    pub fn on_bar(
        &mut self,
        stream: &InstrumentStream,
        index: usize,
        broker: &mut dyn BrokerPort,
    ) -> Result<Decision, CloseHighError> {
        let Some(history) = stream.candles.get(..=index) else {
            return Ok(Decision::Skip(SkipReason::IndexExhausted));
        };
        let ticker = stream.ticker.as_str();
        let Some(ctx) = self.contexts.get_mut(ticker) else {
            return Ok(Decision::Skip(SkipReason::UnknownInstrument));
        };
        let pos = match ctx.segments.locate(index) {
            BarLocation::InDay(pos) => pos,
            BarLocation::Exhausted => return Ok(Decision::Skip(SkipReason::IndexExhausted)),
        };

        let bar = &history[index];
        if ctx.current_day != Some(pos.day) {
            ctx.current_day = Some(pos.day);
            ctx.running_high = None;
        }
        let high = ctx.running_high.map_or(bar.high, |h| h.max(bar.high));
        ctx.running_high = Some(high);
        ctx.stats.add_bar_volume(pos.day, bar.volume);

        if self.params.exit_next_session {
            overnight_exit(ctx, ticker, history, &pos, broker);
        }

        let decision = if pos.is_decision_bar {
            evaluate_entry(ctx, &self.evaluator, &self.issuer, &self.params, ticker, history, &pos, broker)?
        } else {
            Decision::Skip(SkipReason::NotDecisionBar)
        };

        if pos.is_last_bar {
            if let Some(entry) = ctx.pending_entry {
                info!("{} | entry {} not filled by day end, canceling", ticker, entry);
                broker.cancel(entry);
            }
            ctx.stats.finalize_day(pos.day, bar.close);
        }

        Ok(decision)
    }

    pub fn on_order_update(&mut self, event: &OrderEvent) {
        let Some(ctx) = self.contexts.get_mut(&event.ticker) else {
            return;
        };
        match event.status {
            OrderStatus::Submitted | OrderStatus::Accepted => return,
            OrderStatus::Completed => info!(
                "{} | {} executed | price={:.4} | qty={} | comm={:.4}",
                event.ticker,
                if event.side == Side::Buy { "buy" } else { "sell" },
                event.fill_price.unwrap_or(f64::NAN),
                event.quantity,
                event.commission
            ),
            status => info!("{} | order {} status: {}", event.ticker, event.order_id, status),
        }

        if ctx.pending_entry == Some(event.order_id) {
            ctx.pending_entry = None;
            if event.status == OrderStatus::Completed {
                ctx.entry_day = ctx.current_day;
            }
        }
        if ctx.pending_exit == Some(event.order_id) {
            ctx.pending_exit = None;
        }
    }

    pub fn on_trade_closed(&mut self, record: &TradeRecord) {
        info!(
            "{} | trade closed | gross={:.2} | net={:.2} | bars={}",
            record.ticker, record.gross_pnl, record.net_pnl, record.bars_held
        );
        if let Some(ctx) = self.contexts.get_mut(&record.ticker) {
            ctx.stats.record_realized(record.net_pnl);
            ctx.entry_day = None;
        }
        self.results.record(record.clone());
    }
}

#[allow(clippy::too_many_arguments)]
fn evaluate_entry(
    ctx: &mut InstrumentContext,
    evaluator: &SignalEvaluator,
    issuer: &BracketOrderIssuer,
    params: &StrategyParams,
    ticker: &str,
    history: &[Candle],
    pos: &DayPosition,
    broker: &mut dyn BrokerPort,
) -> Result<Decision, CloseHighError> {
    let Some(prior_close) = ctx.stats.prior_close() else {
        return Ok(Decision::Skip(SkipReason::FirstDay));
    };
    let lookback = params.days_look_back;
    let (avg_price_change, avg_volume) = match (
        ctx.stats.average_price_change(lookback),
        ctx.stats.average_volume(lookback),
    ) {
        (Ok(p), Ok(v)) => (p, v),
        (Err(e), _) | (_, Err(e)) => {
            return Ok(Decision::Skip(SkipReason::InsufficientHistory(e)));
        }
    };

    let bar = &history[history.len() - 1];
    let inputs = SignalInputs {
        close: bar.close,
        prior_close,
        running_high: ctx.running_high.unwrap_or(bar.high),
        avg_price_change,
        avg_volume,
        volume_today: ctx.stats.volume_of(pos.day),
        time: bar.time(),
        gap_days: ctx.segments.next_day_gap_days(pos.day).unwrap_or(1),
    };
    let signal = evaluator.evaluate(&inputs);
    debug!(
        "{} | {} | day_change={:.4} to_high={:.4} gates={:?}",
        ticker, bar.timestamp, signal.thresholds.day_change, signal.thresholds.change_to_high, signal.gates
    );
    if !signal.should_enter {
        return Ok(Decision::Evaluate { signal, issued: None });
    }

    info!(
        "{} | signal at {} | day_change={:.2}% | avg_change={:.2}% | volume={:.0} vs avg {:.0}",
        ticker,
        bar.timestamp,
        signal.thresholds.day_change * 100.0,
        avg_price_change * 100.0,
        inputs.volume_today,
        avg_volume
    );
    if broker.position(ticker) != 0 || ctx.pending_entry.is_some() {
        info!("{} | entry suppressed: position or entry already open", ticker);
        return Ok(Decision::Evaluate { signal, issued: None });
    }

    let outcome = issuer.issue(broker, ticker, bar.timestamp, signal.reference_price)?;
    if let IssueOutcome::Submitted { entry, .. } = outcome {
        ctx.pending_entry = Some(entry);
    }
    Ok(Decision::Evaluate {
        signal,
        issued: Some(outcome),
    })
}

/// Close a position carried overnight: on the first bar of the next day if it
/// closes below the previous bar, otherwise on the second bar.
fn overnight_exit(
    ctx: &mut InstrumentContext,
    ticker: &str,
    history: &[Candle],
    pos: &DayPosition,
    broker: &mut dyn BrokerPort,
) {
    let held = broker.position(ticker);
    let carried = ctx.entry_day.is_some_and(|d| d < pos.day);
    if held <= 0 || !carried || ctx.pending_exit.is_some() {
        return;
    }

    let index = history.len() - 1;
    let falling_open = pos.is_first_bar && index > 0 && history[index].close < history[index - 1].close;
    let second_bar = index == pos.first_bar + 1;
    if !(falling_open || second_bar) {
        return;
    }

    let live: Vec<OrderId> = broker.live_orders(ticker).iter().map(|o| o.id).collect();
    for id in live {
        broker.cancel(id);
    }
    let request = OrderRequest::market(ticker, Side::Sell, held.unsigned_abs(), history[index].timestamp);
    let id = broker.submit(request);
    info!("{} | overnight exit {} x{}", ticker, id, held);
    ctx.pending_exit = Some(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::broker::SimBroker;
    use crate::domain::order::BrokerEvent;
    use chrono::{Duration, NaiveDate};

    fn params() -> StrategyParams {
        StrategyParams {
            c_price_change: 2.0,
            c_volume_change: 1.5,
            c_from_low: 0.5,
            c_from_high: 0.05,
            take_pct: 0.003,
            stop_pct: 0.001,
            days_look_back: 2,
            trade_end_of_main_session: true,
            trade_end_of_evening_session: false,
            trade_before_weekends: true,
            max_fraction_of_cash: 0.1,
            exit_next_session: false,
        }
    }

    /// Four bars per day at 18:36..18:39. `closes[d]` is the close of every bar
    /// of day `d` except on `breakout_day`, whose decision bar jumps.
    fn stream(closes: &[f64], breakout_day: Option<usize>) -> InstrumentStream {
        let mut candles = Vec::new();
        let mut date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        for (d, &close) in closes.iter().enumerate() {
            let start = date.and_hms_opt(18, 36, 0).unwrap();
            for m in 0..4 {
                let breakout = breakout_day == Some(d) && m >= 2;
                let c = if breakout { close * 1.05 } else { close };
                candles.push(Candle {
                    timestamp: start + Duration::minutes(m),
                    open: c,
                    high: if breakout { close * 1.055 } else { c },
                    low: c,
                    close: c,
                    volume: if breakout_day == Some(d) { 1_000.0 } else { 100.0 },
                });
            }
            date += Duration::days(1);
        }
        InstrumentStream::new("SBER".into(), candles)
    }

    fn replay(strategy: &mut ClosingOnHighs, broker: &mut SimBroker, s: &InstrumentStream) -> Vec<Decision> {
        let mut decisions = Vec::new();
        for (i, candle) in s.candles.iter().enumerate() {
            for ev in broker.process_bar(&s.ticker, i, candle) {
                match ev {
                    BrokerEvent::Order(o) => strategy.on_order_update(&o),
                    BrokerEvent::TradeClosed(t) => strategy.on_trade_closed(&t),
                }
            }
            decisions.push(strategy.on_bar(s, i, broker).unwrap());
            for ev in broker.take_events() {
                match ev {
                    BrokerEvent::Order(o) => strategy.on_order_update(&o),
                    BrokerEvent::TradeClosed(t) => strategy.on_trade_closed(&t),
                }
            }
        }
        decisions
    }

    #[test]
    fn skips_until_history_is_long_enough() {
        let s = stream(&[100.0, 101.0, 100.0, 101.0, 100.0], None);
        let mut strategy = ClosingOnHighs::new(params(), SessionSchedule::moex(), std::slice::from_ref(&s));
        let mut broker = SimBroker::new(1_000_000.0, 0.0);
        let d = replay(&mut strategy, &mut broker, &s);

        assert_eq!(d[0], Decision::Skip(SkipReason::NotDecisionBar));
        assert_eq!(d[2], Decision::Skip(SkipReason::FirstDay));
        // day 1: no change known yet
        assert!(matches!(
            d[6],
            Decision::Skip(SkipReason::InsufficientHistory(InsufficientHistory { have: 0, need: 2 }))
        ));
        // day 2: only day 1's change known
        assert!(matches!(d[10], Decision::Skip(SkipReason::InsufficientHistory(_))));
        assert!(matches!(d[14], Decision::Evaluate { issued: None, .. }));
        // trailing day
        assert_eq!(d[18], Decision::Skip(SkipReason::IndexExhausted));
    }

    #[test]
    fn breakout_issues_one_bracket() {
        let s = stream(&[100.0, 101.0, 100.0, 101.0, 100.0, 100.0], Some(4));
        let mut strategy = ClosingOnHighs::new(params(), SessionSchedule::moex(), std::slice::from_ref(&s));
        let mut broker = SimBroker::new(1_000_000.0, 0.0);
        let d = replay(&mut strategy, &mut broker, &s);

        let issued: Vec<usize> = d
            .iter()
            .enumerate()
            .filter(|(_, d)| matches!(d, Decision::Evaluate { issued: Some(IssueOutcome::Submitted { .. }), .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(issued, vec![18]);
    }

    #[test]
    fn unknown_instrument_skipped() {
        let s = stream(&[100.0, 101.0], None);
        let mut strategy = ClosingOnHighs::new(params(), SessionSchedule::moex(), &[]);
        let mut broker = SimBroker::new(1_000.0, 0.0);
        assert_eq!(
            strategy.on_bar(&s, 0, &mut broker).unwrap(),
            Decision::Skip(SkipReason::UnknownInstrument)
        );
    }

    #[test]
    fn out_of_range_index_is_exhausted() {
        let s = stream(&[100.0, 101.0], None);
        let mut strategy = ClosingOnHighs::new(params(), SessionSchedule::moex(), std::slice::from_ref(&s));
        let mut broker = SimBroker::new(1_000.0, 0.0);
        assert_eq!(
            strategy.on_bar(&s, 99, &mut broker).unwrap(),
            Decision::Skip(SkipReason::IndexExhausted)
        );
    }
}
