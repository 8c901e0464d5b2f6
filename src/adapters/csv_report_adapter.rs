//! CSV report adapter implementing ReportPort.
//!
//! One row per run in the order given, then a `COMPOSITE` row whose parameter
//! columns are left empty.

use std::fs;
use std::path::Path;

use crate::domain::error::CloseHighError;
use crate::domain::results::{CompositeResult, StrategyResult};
use crate::ports::report_port::ReportPort;

const HEADER: [&str; 26] = [
    "label",
    "c_price_change",
    "c_volume_change",
    "c_from_low",
    "c_from_high",
    "take_pct",
    "stop_pct",
    "days_look_back",
    "trade_end_of_main_session",
    "trade_end_of_evening_session",
    "trade_before_weekends",
    "max_fraction_of_cash",
    "exit_next_session",
    "starting_cash",
    "final_value",
    "net_pnl",
    "gross_pnl",
    "percent_return",
    "total_trades",
    "won",
    "lost",
    "win_rate",
    "longest_win_streak",
    "longest_loss_streak",
    "sharpe_ratio",
    "max_drawdown_pct",
];

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn result_row(r: &StrategyResult) -> Vec<String> {
    let p = &r.params;
    let t = &r.trades;
    vec![
        r.label.clone(),
        p.c_price_change.to_string(),
        p.c_volume_change.to_string(),
        p.c_from_low.to_string(),
        p.c_from_high.to_string(),
        p.take_pct.to_string(),
        p.stop_pct.to_string(),
        p.days_look_back.to_string(),
        p.trade_end_of_main_session.to_string(),
        p.trade_end_of_evening_session.to_string(),
        p.trade_before_weekends.to_string(),
        p.max_fraction_of_cash.to_string(),
        p.exit_next_session.to_string(),
        r.starting_cash.to_string(),
        r.final_value.to_string(),
        t.net_pnl.to_string(),
        t.gross_pnl.to_string(),
        t.percent_return.to_string(),
        t.total.to_string(),
        t.won.to_string(),
        t.lost.to_string(),
        t.win_rate.to_string(),
        t.longest_win_streak.to_string(),
        t.longest_loss_streak.to_string(),
        optional(r.analyzers.sharpe_ratio),
        r.analyzers.drawdown.max_drawdown_pct.to_string(),
    ]
}

fn composite_row(c: &CompositeResult) -> Vec<String> {
    let mut row = vec![String::new(); HEADER.len()];
    row[0] = "COMPOSITE".to_string();
    row[15] = c.net_pnl.to_string();
    row[16] = c.gross_pnl.to_string();
    row[17] = c.percent_return.to_string();
    row[18] = c.total_trades.to_string();
    row[19] = c.won.to_string();
    row[24] = optional(c.average_sharpe);
    row
}

fn report_error(e: csv::Error) -> CloseHighError {
    CloseHighError::Report {
        reason: e.to_string(),
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        results: &[StrategyResult],
        composite: &CompositeResult,
        output_path: &Path,
    ) -> Result<(), CloseHighError> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(output_path).map_err(report_error)?;
        writer.write_record(HEADER).map_err(report_error)?;
        for result in results {
            writer.write_record(result_row(result)).map_err(report_error)?;
        }
        writer.write_record(composite_row(composite)).map_err(report_error)?;
        writer.flush()?;
        Ok(())
    }
}
