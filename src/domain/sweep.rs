//! Parameter sweeps: every combination of the configured value lists is run as
//! an independent simulation on a rayon pool.

use log::{info, warn};
use rayon::prelude::*;

use crate::domain::backtest::{BacktestConfig, run_backtest};
use crate::domain::error::CloseHighError;
use crate::domain::instrument::InstrumentStream;
use crate::domain::params::StrategyParams;
use crate::domain::results::StrategyResult;

/// Value lists for each strategy parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamGrid {
    pub c_price_change: Vec<f64>,
    pub c_volume_change: Vec<f64>,
    pub c_from_low: Vec<f64>,
    pub c_from_high: Vec<f64>,
    pub take_pct: Vec<f64>,
    pub stop_pct: Vec<f64>,
    pub days_look_back: Vec<usize>,
    pub trade_end_of_main_session: Vec<bool>,
    pub trade_end_of_evening_session: Vec<bool>,
    pub trade_before_weekends: Vec<bool>,
    pub max_fraction_of_cash: Vec<f64>,
    pub exit_next_session: Vec<bool>,
}

impl ParamGrid {
    /// Grid holding exactly one combination.
    pub fn single(p: &StrategyParams) -> Self {
        Self {
            c_price_change: vec![p.c_price_change],
            c_volume_change: vec![p.c_volume_change],
            c_from_low: vec![p.c_from_low],
            c_from_high: vec![p.c_from_high],
            take_pct: vec![p.take_pct],
            stop_pct: vec![p.stop_pct],
            days_look_back: vec![p.days_look_back],
            trade_end_of_main_session: vec![p.trade_end_of_main_session],
            trade_end_of_evening_session: vec![p.trade_end_of_evening_session],
            trade_before_weekends: vec![p.trade_before_weekends],
            max_fraction_of_cash: vec![p.max_fraction_of_cash],
            exit_next_session: vec![p.exit_next_session],
        }
    }

    pub fn len(&self) -> usize {
        [
            self.c_price_change.len(),
            self.c_volume_change.len(),
            self.c_from_low.len(),
            self.c_from_high.len(),
            self.take_pct.len(),
            self.stop_pct.len(),
            self.days_look_back.len(),
            self.trade_end_of_main_session.len(),
            self.trade_end_of_evening_session.len(),
            self.trade_before_weekends.len(),
            self.max_fraction_of_cash.len(),
            self.exit_next_session.len(),
        ]
        .iter()
        .product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cross product in a stable order; the last parameter varies fastest.
    pub fn combinations(&self) -> Vec<StrategyParams> {
        let mut out = Vec::with_capacity(self.len());
        for &c_price_change in &self.c_price_change {
            for &c_volume_change in &self.c_volume_change {
                for &c_from_low in &self.c_from_low {
                    for &c_from_high in &self.c_from_high {
                        for &take_pct in &self.take_pct {
                            for &stop_pct in &self.stop_pct {
                                for &days_look_back in &self.days_look_back {
                                    for &main in &self.trade_end_of_main_session {
                                        for &evening in &self.trade_end_of_evening_session {
                                            for &weekends in &self.trade_before_weekends {
                                                for &fraction in &self.max_fraction_of_cash {
                                                    for &exit_next in &self.exit_next_session {
                                                        out.push(StrategyParams {
                                                            c_price_change,
                                                            c_volume_change,
                                                            c_from_low,
                                                            c_from_high,
                                                            take_pct,
                                                            stop_pct,
                                                            days_look_back,
                                                            trade_end_of_main_session: main,
                                                            trade_end_of_evening_session: evening,
                                                            trade_before_weekends: weekends,
                                                            max_fraction_of_cash: fraction,
                                                            exit_next_session: exit_next,
                                                        });
                                                    }
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

/// Outcome of one sweep combination.
#[derive(Debug)]
pub struct SweepRun {
    pub params: StrategyParams,
    pub result: Result<StrategyResult, CloseHighError>,
}

/// Run every combination of `grid`. `workers == 0` uses the global pool.
/// A failed combination is reported in its [`SweepRun`] and does not stop
/// the others.
pub fn run_sweep(
    streams: &[InstrumentStream],
    grid: &ParamGrid,
    config: &BacktestConfig,
    workers: usize,
) -> Vec<SweepRun> {
    let combos = grid.combinations();
    info!("sweep: {} combinations over {} instruments", combos.len(), streams.len());

    let run_all = || -> Vec<SweepRun> {
        combos
            .par_iter()
            .map(|params| {
                let result = run_backtest(streams, params, config).map(|run| run.result);
                if let Err(e) = &result {
                    warn!("run failed for {}: {}", params, e);
                }
                SweepRun {
                    params: params.clone(),
                    result,
                }
            })
            .collect()
    };

    if workers == 0 {
        return run_all();
    }
    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(run_all),
        Err(e) => {
            warn!("could not build a {}-thread pool ({}), using the global pool", workers, e);
            run_all()
        }
    }
}
