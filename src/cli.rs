//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use log::warn;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvCandleStore;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, run_backtest};
use crate::domain::config_validation::{
    DataSettings, build_backtest_config, build_data_settings, build_param_grid,
    validate_backtest_config, validate_session_config, validate_strategy_config,
};
use crate::domain::error::CloseHighError;
use crate::domain::instrument::InstrumentStream;
use crate::domain::results::{CompositeResult, StrategyResult, sort_by_net_pnl};
use crate::domain::sweep::{ParamGrid, run_sweep};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::CandleStore;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "closehigh", about = "Intraday closing-on-highs backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single backtest
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Restrict the run to these tickers
        #[arg(short, long)]
        ticker: Vec<String>,
        /// Simulate each ticker on its own instead of all together
        #[arg(long)]
        separately: bool,
    },
    /// Run every parameter combination
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        ticker: Vec<String>,
        #[arg(long)]
        separately: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show candle count and date range per ticker
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        ticker: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            ticker,
            separately,
        } => run_single(&config, &ticker, separately),
        Command::Optimize {
            config,
            output,
            ticker,
            separately,
        } => run_optimize(&config, output.as_ref(), &ticker, separately),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, ticker } => run_info(&config, ticker.as_deref()),
    }
}

fn fail(err: CloseHighError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

/// Everything a run needs from the configuration file.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub settings: DataSettings,
    pub backtest: BacktestConfig,
    pub grid: ParamGrid,
}

pub fn build_run_plan(adapter: &dyn ConfigPort) -> Result<RunPlan, CloseHighError> {
    validate_backtest_config(adapter)?;
    validate_session_config(adapter)?;
    validate_strategy_config(adapter)?;
    Ok(RunPlan {
        settings: build_data_settings(adapter)?,
        backtest: build_backtest_config(adapter)?,
        grid: build_param_grid(adapter)?,
    })
}

/// Command line tickers win over the configured list.
pub fn resolve_tickers(overrides: &[String], settings: &DataSettings) -> Vec<String> {
    let source = if overrides.is_empty() {
        &settings.tickers
    } else {
        overrides
    };
    source
        .iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Load every ticker in parallel, keeping the configured order. Tickers with
/// no usable candles are skipped with a warning.
pub fn load_streams<S: CandleStore + Sync>(
    store: &S,
    tickers: &[String],
    settings: &DataSettings,
) -> Vec<InstrumentStream> {
    let loaded: Vec<Option<InstrumentStream>> = tickers
        .par_iter()
        .map(|ticker| {
            match store.fetch_candles(
                ticker,
                settings.interval,
                settings.start_date,
                settings.end_date,
            ) {
                Ok(candles) if candles.is_empty() => {
                    warn!("skipping {}: no candles in range", ticker);
                    None
                }
                Ok(candles) => Some(InstrumentStream::new(ticker.clone(), candles)),
                Err(e) => {
                    warn!("skipping {}: {}", ticker, e);
                    None
                }
            }
        })
        .collect();
    loaded.into_iter().flatten().collect()
}

/// Instrument sets to simulate: all together, or one set per ticker.
pub fn instrument_sets(streams: Vec<InstrumentStream>, separately: bool) -> Vec<Vec<InstrumentStream>> {
    if separately {
        streams.into_iter().map(|s| vec![s]).collect()
    } else {
        vec![streams]
    }
}

fn prepare(
    config_path: &Path,
    ticker_override: &[String],
    separately: bool,
) -> Result<(RunPlan, Vec<Vec<InstrumentStream>>), ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    let plan = build_run_plan(&adapter).map_err(fail)?;

    let tickers = resolve_tickers(ticker_override, &plan.settings);
    eprintln!(
        "Loading {} candles for {} tickers from {} ({} to {})",
        plan.settings.interval,
        tickers.len(),
        plan.settings.data_dir.display(),
        plan.settings.start_date,
        plan.settings.end_date
    );
    let store = CsvCandleStore::new(plan.settings.data_dir.clone());
    let streams = load_streams(&store, &tickers, &plan.settings);
    if streams.is_empty() {
        return Err(fail(CloseHighError::NoData {
            ticker: tickers.join(","),
            interval: plan.settings.interval.to_string(),
        }));
    }
    for s in &streams {
        eprintln!("  {}: {} bars", s.ticker, s.bar_count());
    }

    let sets = instrument_sets(streams, separately);
    Ok((plan, sets))
}

pub fn print_result(result: &StrategyResult) {
    let t = &result.trades;
    let a = &result.analyzers;
    println!("=== {} ===", result.label);
    println!("Params:         {}", result.params);
    println!("Start / Final:  {:.2} / {:.2}", result.starting_cash, result.final_value);
    println!("Net PnL:        {:.2} ({:.2}%)", t.net_pnl, t.percent_return);
    println!("Gross PnL:      {:.2}", t.gross_pnl);
    println!(
        "Trades:         {} (won {}, lost {}, win rate {:.1}%)",
        t.total,
        t.won,
        t.lost,
        t.win_rate * 100.0
    );
    println!(
        "Streaks:        current {}, longest win {}, longest loss {}",
        t.current_streak, t.longest_win_streak, t.longest_loss_streak
    );
    println!("Avg/Max Win:    {:.2} / {:.2}", t.avg_win, t.max_win);
    println!("Avg/Max Loss:   {:.2} / {:.2}", t.avg_loss, t.max_loss);
    println!("Avg Bars Held:  {:.1}", t.avg_bars_held);
    match a.sharpe_ratio {
        Some(s) => println!("Sharpe Ratio:   {:.3}", s),
        None => println!("Sharpe Ratio:   n/a"),
    }
    println!(
        "Max Drawdown:   {:.2}% over {} days",
        a.drawdown.max_drawdown_pct, a.drawdown.max_drawdown_len
    );
    for (year, r) in &a.annual_returns {
        println!("  {}: {:.2}%", year, r * 100.0);
    }
}

pub fn print_composite(composite: &CompositeResult) {
    println!("=== Composite over {} runs ===", composite.runs);
    println!(
        "Net PnL:        {:.2} ({:.2}%)",
        composite.net_pnl, composite.percent_return
    );
    println!("Trades:         {} (won {})", composite.total_trades, composite.won);
    match composite.average_sharpe {
        Some(s) => println!("Mean Sharpe:    {:.3}", s),
        None => println!("Mean Sharpe:    n/a"),
    }
}

fn run_single(config_path: &Path, ticker_override: &[String], separately: bool) -> ExitCode {
    let (plan, sets) = match prepare(config_path, ticker_override, separately) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let combos = plan.grid.combinations();
    let params = match combos.as_slice() {
        [single] => single,
        _ => {
            return fail(CloseHighError::ConfigInvalid {
                section: "strategy".to_string(),
                key: "*".to_string(),
                reason: format!(
                    "run takes one value per parameter, got {} combinations (use optimize)",
                    combos.len()
                ),
            });
        }
    };

    let mut results = Vec::with_capacity(sets.len());
    let mut first_error = None;
    for streams in &sets {
        match run_backtest(streams, params, &plan.backtest) {
            Ok(run) => {
                eprintln!("{} brackets issued", run.brackets.len());
                results.push(run.result);
            }
            Err(e) => {
                eprintln!("error: run failed: {e}");
                first_error.get_or_insert(e);
            }
        }
    }

    if results.is_empty() {
        if let Some(e) = first_error {
            return (&e).into();
        }
    }

    for result in &results {
        print_result(result);
    }
    if results.len() > 1 {
        print_composite(&CompositeResult::from_results(&results));
    }
    ExitCode::SUCCESS
}

fn run_optimize(
    config_path: &Path,
    output_path: Option<&PathBuf>,
    ticker_override: &[String],
    separately: bool,
) -> ExitCode {
    let (plan, sets) = match prepare(config_path, ticker_override, separately) {
        Ok(p) => p,
        Err(code) => return code,
    };

    eprintln!(
        "Optimizing {} combinations over {} instrument sets",
        plan.grid.len(),
        sets.len()
    );

    let mut results = Vec::new();
    let mut failed = 0usize;
    for streams in &sets {
        for sweep_run in run_sweep(streams, &plan.grid, &plan.backtest, plan.settings.workers) {
            match sweep_run.result {
                Ok(result) => results.push(result),
                Err(e) if e.is_run_fatal() => failed += 1,
                Err(e) => return fail(e),
            }
        }
    }
    if failed > 0 {
        eprintln!("{} runs failed", failed);
    }

    sort_by_net_pnl(&mut results);
    for result in &results {
        print_result(result);
    }
    let composite = CompositeResult::from_results(&results);
    print_composite(&composite);

    let output = output_path
        .cloned()
        .or_else(|| plan.settings.output.clone())
        .unwrap_or_else(|| PathBuf::from("results.csv"));
    match CsvReportAdapter::new().write(&results, &composite, &output) {
        Ok(()) => {
            eprintln!("\nResults written to: {}", output.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let plan = match build_run_plan(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let s = &plan.settings;
    let schedule = &plan.backtest.schedule;
    eprintln!("\nData:");
    eprintln!("  dir:      {}", s.data_dir.display());
    eprintln!("  interval: {}", s.interval);
    eprintln!("  tickers:  {}", s.tickers.join(", "));
    eprintln!("  range:    {} to {}", s.start_date, s.end_date);
    eprintln!("\nSession:");
    match schedule.opening_auction {
        Some(t) => eprintln!("  opening auction: {}", t.format("%H:%M")),
        None => eprintln!("  opening auction: none"),
    }
    eprintln!("  main close:      {}", schedule.main_close);
    eprintln!("  evening close:   {}", schedule.evening_close);
    eprintln!("\nParameter grid: {} combinations", plan.grid.len());

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path, ticker: Option<&str>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let settings = match build_data_settings(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let overrides: Vec<String> = ticker.map(|t| vec![t.to_string()]).unwrap_or_default();
    let tickers = resolve_tickers(&overrides, &settings);
    let store = CsvCandleStore::new(settings.data_dir.clone());

    for t in &tickers {
        match store.data_range(t, settings.interval) {
            Ok(Some((first, last, count))) => {
                println!("{} ({}): {} bars, {} to {}", t, settings.interval, count, first, last);
            }
            Ok(None) => eprintln!("{} ({}): no data found", t, settings.interval),
            Err(e) => eprintln!("error querying {}: {}", t, e),
        }
    }
    ExitCode::SUCCESS
}
