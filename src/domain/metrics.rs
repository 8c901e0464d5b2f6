//! Analyzers over the daily equity curve: Sharpe, drawdown, annual returns
//! and monthly period statistics.

use super::portfolio::EquityPoint;
use chrono::Datelike;
use std::collections::BTreeMap;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DrawdownStats {
    /// Largest peak-to-trough decline, as a percentage of the peak.
    pub max_drawdown_pct: f64,
    /// Longest run of points spent below a prior peak.
    pub max_drawdown_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PeriodStats {
    pub average: f64,
    pub stddev: f64,
    pub positive: usize,
    pub negative: usize,
    pub nochange: usize,
    pub best: f64,
    pub worst: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalyzerReport {
    pub sharpe_ratio: Option<f64>,
    pub drawdown: DrawdownStats,
    pub annual_returns: Vec<(i32, f64)>,
    pub monthly: PeriodStats,
}

impl AnalyzerReport {
    pub fn compute(equity_curve: &[EquityPoint], initial_capital: f64, risk_free_rate: f64) -> Self {
        AnalyzerReport {
            sharpe_ratio: sharpe_ratio(equity_curve, risk_free_rate),
            drawdown: compute_drawdown(equity_curve),
            annual_returns: annual_returns(equity_curve, initial_capital),
            monthly: monthly_period_stats(equity_curve, initial_capital),
        }
    }
}

fn daily_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect()
}

fn mean_and_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Annualized Sharpe ratio of daily returns. `None` with fewer than two
/// points or no variation.
pub fn sharpe_ratio(equity_curve: &[EquityPoint], risk_free_rate: f64) -> Option<f64> {
    let returns = daily_returns(equity_curve);
    if returns.is_empty() {
        return None;
    }
    let (mean, stddev) = mean_and_stddev(&returns);
    if stddev <= 0.0 {
        return None;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
    Some((mean - daily_rf) / stddev * TRADING_DAYS_PER_YEAR.sqrt())
}

pub fn compute_drawdown(equity_curve: &[EquityPoint]) -> DrawdownStats {
    let Some(first) = equity_curve.first() else {
        return DrawdownStats::default();
    };

    let mut peak = first.equity;
    let mut stats = DrawdownStats::default();
    let mut current_len = 0usize;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            current_len = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.equity) / peak * 100.0;
            stats.max_drawdown_pct = stats.max_drawdown_pct.max(dd);
            current_len += 1;
            stats.max_drawdown_len = stats.max_drawdown_len.max(current_len);
        }
    }

    stats
}

/// Return per calendar year, each measured from the previous year's last
/// value (the first year from `initial_capital`).
pub fn annual_returns(equity_curve: &[EquityPoint], initial_capital: f64) -> Vec<(i32, f64)> {
    period_returns(equity_curve, initial_capital, |p| (p.date.year(), 0))
        .into_iter()
        .map(|((year, _), r)| (year, r))
        .collect()
}

pub fn monthly_period_stats(equity_curve: &[EquityPoint], initial_capital: f64) -> PeriodStats {
    let returns: Vec<f64> = period_returns(equity_curve, initial_capital, |p| {
        (p.date.year(), p.date.month())
    })
    .into_values()
    .collect();

    if returns.is_empty() {
        return PeriodStats::default();
    }

    let (average, stddev) = mean_and_stddev(&returns);
    PeriodStats {
        average,
        stddev,
        positive: returns.iter().filter(|r| **r > 0.0).count(),
        negative: returns.iter().filter(|r| **r < 0.0).count(),
        nochange: returns.iter().filter(|r| **r == 0.0).count(),
        best: returns.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        worst: returns.iter().copied().fold(f64::INFINITY, f64::min),
    }
}

fn period_returns<K: Ord + Copy>(
    equity_curve: &[EquityPoint],
    initial_capital: f64,
    key: impl Fn(&EquityPoint) -> K,
) -> BTreeMap<K, f64> {
    let mut closing: BTreeMap<K, f64> = BTreeMap::new();
    for point in equity_curve {
        closing.insert(key(point), point.equity);
    }

    let mut out = BTreeMap::new();
    let mut base = initial_capital;
    for (period, end) in closing {
        let r = if base > 0.0 { (end - base) / base } else { 0.0 };
        out.insert(period, r);
        base = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                equity: v,
            })
            .collect()
    }

    fn point(y: i32, m: u32, d: u32, equity: f64) -> EquityPoint {
        EquityPoint {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            equity,
        }
    }

    #[test]
    fn sharpe_needs_two_points_and_variation() {
        assert_eq!(sharpe_ratio(&make_equity_curve(&[100.0]), 0.0), None);
        assert_eq!(sharpe_ratio(&make_equity_curve(&[100.0, 100.0, 100.0]), 0.0), None);
    }

    #[test]
    fn sharpe_matches_hand_computation() {
        let curve = make_equity_curve(&[100.0, 110.0, 99.0]);
        let returns = [0.1, -0.1];
        let mean = 0.0;
        let std = (returns.iter().map(|r: &f64| (r - mean).powi(2)).sum::<f64>() / 2.0).sqrt();
        let expected = (mean - 0.0) / std * 252f64.sqrt();
        assert_relative_eq!(sharpe_ratio(&curve, 0.0).unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn sharpe_positive_for_rising_curve() {
        let curve = make_equity_curve(&[100.0, 101.0, 103.0, 104.0, 107.0]);
        assert!(sharpe_ratio(&curve, 0.0).unwrap() > 0.0);
    }

    #[test]
    fn max_drawdown() {
        let dd = compute_drawdown(&make_equity_curve(&[100.0, 120.0, 90.0, 110.0, 130.0]));
        assert_relative_eq!(dd.max_drawdown_pct, 25.0, epsilon = 1e-9);
        assert_eq!(dd.max_drawdown_len, 2);
    }

    #[test]
    fn drawdown_empty_curve() {
        assert_eq!(compute_drawdown(&[]), DrawdownStats::default());
    }

    #[test]
    fn annual_returns_chain_years() {
        let curve = vec![
            point(2023, 6, 1, 105.0),
            point(2023, 12, 29, 110.0),
            point(2024, 3, 1, 99.0),
        ];
        let years = annual_returns(&curve, 100.0);
        assert_eq!(years.len(), 2);
        assert_eq!(years[0].0, 2023);
        assert_relative_eq!(years[0].1, 0.10, epsilon = 1e-12);
        assert_eq!(years[1].0, 2024);
        assert_relative_eq!(years[1].1, -0.10, epsilon = 1e-12);
    }

    #[test]
    fn monthly_stats() {
        let curve = vec![
            point(2024, 1, 31, 110.0),
            point(2024, 2, 29, 110.0),
            point(2024, 3, 29, 99.0),
        ];
        let stats = monthly_period_stats(&curve, 100.0);
        assert_eq!((stats.positive, stats.negative, stats.nochange), (1, 1, 1));
        assert_relative_eq!(stats.best, 0.10, epsilon = 1e-12);
        assert_relative_eq!(stats.worst, -0.10, epsilon = 1e-12);
        assert_relative_eq!(stats.average, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn report_on_empty_curve() {
        let report = AnalyzerReport::compute(&[], 100.0, 0.0);
        assert_eq!(report.sharpe_ratio, None);
        assert!(report.annual_returns.is_empty());
        assert_eq!(report.monthly, PeriodStats::default());
    }
}
