//! Bar-by-bar backtest driver.
//!
//! Walks the unified timeline of all instruments. At each timestamp the
//! instruments are visited in configuration order; for each one the broker
//! matches pending orders on the bar, its notifications are delivered, then the
//! strategy sees the bar.

use chrono::NaiveDateTime;
use log::{debug, info};

use crate::domain::bracket::{BracketPrices, IssueOutcome};
use crate::domain::broker::SimBroker;
use crate::domain::error::CloseHighError;
use crate::domain::instrument::{InstrumentStream, build_unified_timeline, ticker_label};
use crate::domain::metrics::AnalyzerReport;
use crate::domain::order::BrokerEvent;
use crate::domain::params::{SessionSchedule, StrategyParams};
use crate::domain::portfolio::EquityPoint;
use crate::domain::position::TradeRecord;
use crate::domain::results::StrategyResult;
use crate::domain::strategy::{ClosingOnHighs, Decision};
use crate::ports::broker_port::BrokerPort;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub risk_free_rate: f64,
    pub schedule: SessionSchedule,
}

/// A bracket submitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedBracket {
    pub ticker: String,
    pub bar: usize,
    pub timestamp: NaiveDateTime,
    pub quantity: u64,
    pub prices: BracketPrices,
}

#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub result: StrategyResult,
    pub trades: Vec<TradeRecord>,
    pub brackets: Vec<IssuedBracket>,
    pub equity_curve: Vec<EquityPoint>,
}

fn dispatch(strategy: &mut ClosingOnHighs, events: Vec<BrokerEvent>) {
    for event in events {
        match event {
            BrokerEvent::Order(order) => strategy.on_order_update(&order),
            BrokerEvent::TradeClosed(record) => strategy.on_trade_closed(&record),
        }
    }
}

/// Run one simulation. A fatal error aborts this run only.
pub fn run_backtest(
    streams: &[InstrumentStream],
    params: &StrategyParams,
    config: &BacktestConfig,
) -> Result<BacktestRun, CloseHighError> {
    let timeline = build_unified_timeline(streams);
    let mut broker = SimBroker::new(config.initial_capital, config.commission_rate);
    let mut strategy = ClosingOnHighs::new(params.clone(), config.schedule, streams);
    let mut brackets = Vec::new();

    for (t, &timestamp) in timeline.iter().enumerate() {
        for stream in streams {
            let Some(index) = stream.index_of(timestamp) else {
                continue;
            };
            let candle = &stream.candles[index];

            dispatch(&mut strategy, broker.process_bar(&stream.ticker, index, candle));
            let decision = strategy.on_bar(stream, index, &mut broker)?;
            dispatch(&mut strategy, broker.take_events());

            if let Decision::Evaluate {
                issued: Some(IssueOutcome::Submitted { quantity, prices, .. }),
                ..
            } = decision
            {
                brackets.push(IssuedBracket {
                    ticker: stream.ticker.clone(),
                    bar: index,
                    timestamp,
                    quantity,
                    prices,
                });
            }
        }

        let last_of_date = timeline
            .get(t + 1)
            .is_none_or(|next| next.date() != timestamp.date());
        if last_of_date {
            broker.record_equity(timestamp.date());
        }
    }

    for stream in streams {
        if let Some(ctx) = strategy.context(&stream.ticker) {
            debug!(
                "{} | {} days | realized net {:.2}",
                stream.ticker,
                ctx.segments.day_count(),
                ctx.stats.realized_value()
            );
        }
    }

    let label = ticker_label(streams);
    let analyzers = AnalyzerReport::compute(
        &broker.portfolio().equity_curve,
        config.initial_capital,
        config.risk_free_rate,
    );
    let result = StrategyResult::new(
        label,
        params.clone(),
        config.initial_capital,
        broker.portfolio_value(),
        strategy.results(),
        analyzers,
    );

    info!(
        "{} | {} | trades={} won={} net={:.2} ({:.2}%) sharpe={}",
        result.label,
        params,
        result.trades.total,
        result.trades.won,
        result.trades.net_pnl,
        result.trades.percent_return,
        result
            .analyzers
            .sharpe_ratio
            .map_or_else(|| "n/a".to_string(), |s| format!("{s:.3}"))
    );

    Ok(BacktestRun {
        result,
        trades: broker.trades().to_vec(),
        brackets,
        equity_curve: broker.portfolio().equity_curve.clone(),
    })
}
