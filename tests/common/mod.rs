#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use closehigh::domain::backtest::BacktestConfig;
use closehigh::domain::broker::SimBroker;
use closehigh::domain::candle::{Candle, CandleInterval};
use closehigh::domain::error::CloseHighError;
use closehigh::domain::instrument::{InstrumentStream, build_unified_timeline};
use closehigh::domain::order::BrokerEvent;
use closehigh::domain::params::{SessionSchedule, StrategyParams};
use closehigh::domain::strategy::{ClosingOnHighs, Decision};
use closehigh::ports::data_port::CandleStore;
use std::collections::HashMap;

/// One-minute bars per session day: 09:50 up to and including 18:39.
pub const BARS_PER_DAY: usize = 530;
/// Offset of the 18:38 decision bar inside a day.
pub const DECISION_OFFSET: usize = BARS_PER_DAY - 2;

pub struct MockCandleStore {
    pub data: HashMap<String, Vec<Candle>>,
    pub errors: HashMap<String, String>,
}

impl MockCandleStore {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_candles(mut self, ticker: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(ticker.to_string(), candles);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl CandleStore for MockCandleStore {
    fn fetch_candles(
        &self,
        ticker: &str,
        _interval: CandleInterval,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Candle>, CloseHighError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(CloseHighError::DataFormat {
                source_name: ticker.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(ticker)
            .map(|c| {
                c.iter()
                    .filter(|c| c.date() >= from && c.date() <= to)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_tickers(&self, _interval: CandleInterval) -> Result<Vec<String>, CloseHighError> {
        let mut tickers: Vec<String> = self.data.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }

    fn data_range(
        &self,
        ticker: &str,
        _interval: CandleInterval,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, CloseHighError> {
        Ok(self.data.get(ticker).and_then(|c| match (c.first(), c.last()) {
            (Some(first), Some(last)) => Some((first.date(), last.date(), c.len())),
            _ => None,
        }))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `n` consecutive weekdays starting at `start`.
pub fn weekdays(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut d = start;
    while out.len() < n {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(d);
        }
        d += Duration::days(1);
    }
    out
}

pub fn flat_bar(timestamp: NaiveDateTime, price: f64, volume: f64) -> Candle {
    Candle {
        timestamp,
        open: price,
        high: price,
        low: price,
        close: price,
        volume,
    }
}

/// A full session day of flat one-minute bars at `price`.
pub fn flat_day(day: NaiveDate, price: f64, volume: f64) -> Vec<Candle> {
    let start = day.and_hms_opt(9, 50, 0).unwrap();
    (0..BARS_PER_DAY)
        .map(|m| flat_bar(start + Duration::minutes(m as i64), price, volume))
        .collect()
}

/// Index of the decision bar of `day` in a stream of full session days.
pub fn decision_index(day: usize) -> usize {
    day * BARS_PER_DAY + DECISION_OFFSET
}

/// 65 weekdays of one-minute bars. Closes alternate 100 / 101 day by day, so the
/// average absolute daily change is just under 1%. Day 61 trades flat at 100 with
/// ten times the usual volume, then the 18:38 bar closes at 105 with a 105.5
/// high; every later bar trades flat at 105.
pub fn breakout_stream(ticker: &str) -> InstrumentStream {
    breakout_stream_from(ticker, date(2024, 1, 15))
}

/// The breakout scenario on 65 weekdays starting at `start`. Starting on a
/// Thursday puts the breakout day on a Friday.
pub fn breakout_stream_from(ticker: &str, start: NaiveDate) -> InstrumentStream {
    let days = weekdays(start, 65);
    let mut candles = Vec::with_capacity(days.len() * BARS_PER_DAY);
    for (d, &day) in days.iter().enumerate() {
        if d < 61 {
            let price = if d % 2 == 0 { 100.0 } else { 101.0 };
            candles.extend(flat_day(day, price, 100.0));
        } else if d == 61 {
            let mut bars = flat_day(day, 100.0, 1_000.0);
            let decision = &mut bars[DECISION_OFFSET];
            decision.close = 105.0;
            decision.high = 105.5;
            let last = bars[DECISION_OFFSET + 1].timestamp;
            bars[DECISION_OFFSET + 1] = flat_bar(last, 105.0, 1_000.0);
            candles.extend(bars);
        } else {
            candles.extend(flat_day(day, 105.0, 100.0));
        }
    }
    InstrumentStream::new(ticker.to_string(), candles)
}

pub fn breakout_date() -> NaiveDate {
    weekdays(date(2024, 1, 15), 65)[61]
}

pub fn breakout_params() -> StrategyParams {
    StrategyParams {
        c_price_change: 4.0,
        c_volume_change: 3.0,
        c_from_low: 0.5,
        c_from_high: 0.05,
        take_pct: 0.003,
        stop_pct: 0.001,
        days_look_back: 60,
        trade_end_of_main_session: true,
        trade_end_of_evening_session: false,
        trade_before_weekends: true,
        max_fraction_of_cash: 0.1,
        exit_next_session: false,
    }
}

pub fn sample_config() -> BacktestConfig {
    BacktestConfig {
        initial_capital: 1_000_000.0,
        commission_rate: 0.0004,
        risk_free_rate: 0.0,
        schedule: SessionSchedule::moex(),
    }
}

fn dispatch(strategy: &mut ClosingOnHighs, events: Vec<BrokerEvent>) {
    for event in events {
        match event {
            BrokerEvent::Order(o) => strategy.on_order_update(&o),
            BrokerEvent::TradeClosed(t) => strategy.on_trade_closed(&t),
        }
    }
}

/// Drive the strategy bar by bar the way the backtest driver does and collect
/// every decision per ticker, indexed by bar.
pub fn replay(
    streams: &[InstrumentStream],
    params: &StrategyParams,
    config: &BacktestConfig,
) -> HashMap<String, Vec<Decision>> {
    let mut broker = SimBroker::new(config.initial_capital, config.commission_rate);
    let mut strategy = ClosingOnHighs::new(params.clone(), config.schedule, streams);
    let mut decisions: HashMap<String, Vec<Decision>> = HashMap::new();

    for timestamp in build_unified_timeline(streams) {
        for stream in streams {
            let Some(index) = stream.index_of(timestamp) else {
                continue;
            };
            let events = broker.process_bar(&stream.ticker, index, &stream.candles[index]);
            dispatch(&mut strategy, events);
            let decision = strategy.on_bar(stream, index, &mut broker).unwrap();
            dispatch(&mut strategy, broker.take_events());
            decisions
                .entry(stream.ticker.clone())
                .or_default()
                .push(decision);
        }
    }
    decisions
}
