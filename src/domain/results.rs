//! Per-run and cross-run performance summaries built from closed trades.
//!
//! [`ResultAggregator`] keeps nothing but the raw trade list; every statistic
//! is recomputed on request.

use crate::domain::metrics::AnalyzerReport;
use crate::domain::params::StrategyParams;
use crate::domain::position::{Direction, TradeRecord};
use std::cmp::Ordering;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultAggregator {
    trades: Vec<TradeRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SideStats {
    pub total: usize,
    pub won: usize,
    pub lost: usize,
    pub net_pnl: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TradeStats {
    pub total: usize,
    pub won: usize,
    pub lost: usize,
    pub breakeven: usize,
    pub win_rate: f64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    pub percent_return: f64,
    /// Length of the run in progress: positive for wins, negative for losses.
    pub current_streak: i64,
    pub longest_win_streak: usize,
    pub longest_loss_streak: usize,
    pub avg_win: f64,
    pub max_win: f64,
    pub avg_loss: f64,
    pub max_loss: f64,
    pub long: SideStats,
    pub short: SideStats,
    pub avg_bars_held: f64,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, trade: TradeRecord) {
        self.trades.push(trade);
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn summarize(&self, starting_capital: f64) -> TradeStats {
        let mut stats = TradeStats {
            total: self.trades.len(),
            ..TradeStats::default()
        };
        let mut total_wins = 0.0;
        let mut total_losses = 0.0;
        let mut win_run = 0usize;
        let mut loss_run = 0usize;
        let mut bars = 0usize;

        for trade in &self.trades {
            let pnl = trade.net_pnl;
            stats.gross_pnl += trade.gross_pnl;
            stats.net_pnl += pnl;
            bars += trade.bars_held;

            let side = match trade.direction {
                Direction::Long => &mut stats.long,
                Direction::Short => &mut stats.short,
            };
            side.total += 1;
            side.net_pnl += pnl;

            if trade.is_win() {
                stats.won += 1;
                side.won += 1;
                total_wins += pnl;
                stats.max_win = stats.max_win.max(pnl);
                win_run += 1;
                loss_run = 0;
            } else if trade.is_loss() {
                stats.lost += 1;
                side.lost += 1;
                total_losses += pnl;
                stats.max_loss = stats.max_loss.min(pnl);
                loss_run += 1;
                win_run = 0;
            } else {
                stats.breakeven += 1;
                win_run = 0;
                loss_run = 0;
            }
            stats.longest_win_streak = stats.longest_win_streak.max(win_run);
            stats.longest_loss_streak = stats.longest_loss_streak.max(loss_run);
        }

        stats.current_streak = win_run as i64 - loss_run as i64;
        if stats.total > 0 {
            stats.win_rate = stats.won as f64 / stats.total as f64;
            stats.avg_bars_held = bars as f64 / stats.total as f64;
        }
        if stats.won > 0 {
            stats.avg_win = total_wins / stats.won as f64;
        }
        if stats.lost > 0 {
            stats.avg_loss = total_losses / stats.lost as f64;
        }
        if starting_capital > 0.0 {
            stats.percent_return = stats.net_pnl / starting_capital * 100.0;
        }
        stats
    }
}

/// Summary of one simulation over one instrument set.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyResult {
    pub label: String,
    pub params: StrategyParams,
    pub starting_cash: f64,
    pub final_value: f64,
    pub trades: TradeStats,
    pub analyzers: AnalyzerReport,
}

impl StrategyResult {
    pub fn new(
        label: String,
        params: StrategyParams,
        starting_cash: f64,
        final_value: f64,
        aggregator: &ResultAggregator,
        analyzers: AnalyzerReport,
    ) -> Self {
        Self {
            label,
            params,
            starting_cash,
            final_value,
            trades: aggregator.summarize(starting_cash),
            analyzers,
        }
    }

    pub fn net_pnl(&self) -> f64 {
        self.trades.net_pnl
    }
}

/// Sums and averages across runs. The Sharpe figure is the arithmetic mean
/// of per-run ratios, not a portfolio Sharpe.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompositeResult {
    pub runs: usize,
    pub net_pnl: f64,
    pub gross_pnl: f64,
    pub percent_return: f64,
    pub total_trades: usize,
    pub won: usize,
    pub average_sharpe: Option<f64>,
}

impl CompositeResult {
    pub fn from_results(results: &[StrategyResult]) -> Self {
        let sharpes: Vec<f64> = results
            .iter()
            .filter_map(|r| r.analyzers.sharpe_ratio)
            .collect();
        CompositeResult {
            runs: results.len(),
            net_pnl: results.iter().map(|r| r.trades.net_pnl).sum(),
            gross_pnl: results.iter().map(|r| r.trades.gross_pnl).sum(),
            percent_return: results.iter().map(|r| r.trades.percent_return).sum(),
            total_trades: results.iter().map(|r| r.trades.total).sum(),
            won: results.iter().map(|r| r.trades.won).sum(),
            average_sharpe: (!sharpes.is_empty())
                .then(|| sharpes.iter().sum::<f64>() / sharpes.len() as f64),
        }
    }
}

/// Best net PnL first.
pub fn sort_by_net_pnl(results: &mut [StrategyResult]) {
    results.sort_by(|a, b| {
        b.net_pnl()
            .partial_cmp(&a.net_pnl())
            .unwrap_or(Ordering::Equal)
    });
}
