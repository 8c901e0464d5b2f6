//! Configuration validation and loading.
//!
//! Every key is checked before a run. Sections:
//!
//! - `[backtest]`: `data_dir`, `interval`, `tickers`, `start_date`, `end_date`,
//!   `initial_capital`, `commission_rate`, `risk_free_rate`, `workers`, `output`
//! - `[session]`: `opening_auction`, `main_close`, `evening_close`
//! - `[strategy]`: one comma separated value list per strategy parameter

use crate::domain::backtest::BacktestConfig;
use crate::domain::candle::CandleInterval;
use crate::domain::error::CloseHighError;
use crate::domain::params::{SessionSchedule, TimeWindow, parse_time};
use crate::domain::sweep::ParamGrid;
use crate::ports::config_port::{ConfigPort, parse_bool};
use chrono::NaiveDate;
use std::path::PathBuf;

/// Where the candles come from and how a sweep is executed.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub data_dir: PathBuf,
    pub interval: CandleInterval,
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub workers: usize,
    pub output: Option<PathBuf>,
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), CloseHighError> {
    build_data_settings(config)?;
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_risk_free_rate(config)?;
    Ok(())
}

pub fn validate_session_config(config: &dyn ConfigPort) -> Result<(), CloseHighError> {
    build_session_schedule(config).map(|_| ())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), CloseHighError> {
    build_param_grid(config).map(|_| ())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> CloseHighError {
    CloseHighError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> CloseHighError {
    CloseHighError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<f64, CloseHighError> {
    let value = config.get_double("backtest", "initial_capital", 0.0);
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(value)
}

fn validate_commission(config: &dyn ConfigPort) -> Result<f64, CloseHighError> {
    let value = config.get_double("backtest", "commission_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "commission_rate",
            "commission_rate must be between 0 and 1",
        ));
    }
    Ok(value)
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<f64, CloseHighError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(value)
}

fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, CloseHighError> {
    match value {
        None => Err(missing("backtest", field)),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(
                "backtest",
                field,
                format!("invalid {} format, expected YYYY-MM-DD", field),
            )
        }),
    }
}

fn required_string(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, CloseHighError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(missing(section, key)),
    }
}

pub fn build_data_settings(config: &dyn ConfigPort) -> Result<DataSettings, CloseHighError> {
    let data_dir = PathBuf::from(required_string(config, "backtest", "data_dir")?);

    let interval_raw = required_string(config, "backtest", "interval")?;
    let interval = CandleInterval::parse(&interval_raw).ok_or_else(|| {
        invalid(
            "backtest",
            "interval",
            format!("unknown interval '{}', expected 1min or day", interval_raw),
        )
    })?;

    let tickers = config
        .get_list("backtest", "tickers")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| missing("backtest", "tickers"))?;

    let start_date = parse_date(config.get_string("backtest", "start_date").as_deref(), "start_date")?;
    let end_date = parse_date(config.get_string("backtest", "end_date").as_deref(), "end_date")?;
    if start_date >= end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }

    let workers = config.get_int("backtest", "workers", 0);
    if workers < 0 {
        return Err(invalid("backtest", "workers", "workers must be non-negative"));
    }

    let output = config
        .get_string("backtest", "output")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    Ok(DataSettings {
        data_dir,
        interval,
        tickers,
        start_date,
        end_date,
        workers: workers as usize,
        output,
    })
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, CloseHighError> {
    Ok(BacktestConfig {
        initial_capital: validate_initial_capital(config)?,
        commission_rate: validate_commission(config)?,
        risk_free_rate: validate_risk_free_rate(config)?,
        schedule: build_session_schedule(config)?,
    })
}

fn window(config: &dyn ConfigPort, key: &str, default: TimeWindow) -> Result<TimeWindow, CloseHighError> {
    match config.get_string("session", key) {
        None => Ok(default),
        Some(raw) => TimeWindow::parse(&raw).ok_or_else(|| {
            invalid(
                "session",
                key,
                format!("'{}' is not a HH:MM-HH:MM window with start before end", raw.trim()),
            )
        }),
    }
}

/// Session times; keys that are absent keep the Moscow Exchange schedule.
/// An empty `opening_auction` disables the auction check.
pub fn build_session_schedule(config: &dyn ConfigPort) -> Result<SessionSchedule, CloseHighError> {
    let defaults = SessionSchedule::moex();
    let opening_auction = match config.get_string("session", "opening_auction") {
        None => defaults.opening_auction,
        Some(raw) if raw.trim().is_empty() => None,
        Some(raw) => Some(parse_time(&raw).ok_or_else(|| {
            invalid(
                "session",
                "opening_auction",
                format!("'{}' is not a HH:MM time", raw.trim()),
            )
        })?),
    };
    Ok(SessionSchedule {
        opening_auction,
        main_close: window(config, "main_close", defaults.main_close)?,
        evening_close: window(config, "evening_close", defaults.evening_close)?,
    })
}

fn parse_list<T>(
    config: &dyn ConfigPort,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
    rule: &str,
) -> Result<Vec<T>, CloseHighError> {
    let items = config
        .get_list("strategy", key)
        .ok_or_else(|| missing("strategy", key))?;
    if items.is_empty() {
        return Err(invalid("strategy", key, "no values given"));
    }
    items
        .iter()
        .map(|item| {
            parse(item).ok_or_else(|| invalid("strategy", key, format!("'{}': {}", item, rule)))
        })
        .collect()
}

fn f64_list(
    config: &dyn ConfigPort,
    key: &str,
    accept: impl Fn(f64) -> bool,
    rule: &str,
) -> Result<Vec<f64>, CloseHighError> {
    parse_list(
        config,
        key,
        |s| s.parse::<f64>().ok().filter(|v| v.is_finite() && accept(*v)),
        rule,
    )
}

fn bool_list(config: &dyn ConfigPort, key: &str) -> Result<Vec<bool>, CloseHighError> {
    parse_list(config, key, parse_bool, "expected true or false")
}

/// Value lists for every strategy parameter. `exit_next_session` may be
/// omitted and then defaults to `false`.
pub fn build_param_grid(config: &dyn ConfigPort) -> Result<ParamGrid, CloseHighError> {
    let exit_next_session = if config.get_string("strategy", "exit_next_session").is_some() {
        bool_list(config, "exit_next_session")?
    } else {
        vec![false]
    };

    Ok(ParamGrid {
        c_price_change: f64_list(config, "c_price_change", |v| v >= 0.0, "must be non-negative")?,
        c_volume_change: f64_list(config, "c_volume_change", |v| v >= 0.0, "must be non-negative")?,
        c_from_low: f64_list(
            config,
            "c_from_low",
            |v| (0.0..=1.0).contains(&v),
            "must be between 0 and 1",
        )?,
        c_from_high: f64_list(
            config,
            "c_from_high",
            |v| (0.0..1.0).contains(&v),
            "must be at least 0 and below 1",
        )?,
        take_pct: f64_list(config, "take_pct", |v| v > 0.0, "must be positive")?,
        stop_pct: f64_list(
            config,
            "stop_pct",
            |v| v > 0.0 && v < 1.0,
            "must be between 0 and 1 exclusive",
        )?,
        days_look_back: parse_list(
            config,
            "days_look_back",
            |s| s.parse::<usize>().ok().filter(|n| *n >= 1),
            "must be a whole number of at least 1",
        )?,
        trade_end_of_main_session: bool_list(config, "trade_end_of_main_session")?,
        trade_end_of_evening_session: bool_list(config, "trade_end_of_evening_session")?,
        trade_before_weekends: bool_list(config, "trade_before_weekends")?,
        max_fraction_of_cash: f64_list(
            config,
            "max_fraction_of_cash",
            |v| v > 0.0 && v <= 1.0,
            "must be in (0, 1]",
        )?,
        exit_next_session,
    })
}
