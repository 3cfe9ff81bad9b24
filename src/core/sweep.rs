use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use super::analysis::{fund_returns, quantile_summary};
use super::engine::simulate;
use super::error::{Result, SimError};
use super::types::{FundTerms, QuantileSummary, SimulationConfig};

pub const MAX_SWEEP_POINTS: usize = 1_000;

/// Inclusive range of target growth rates, in fractions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthSweep {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl GrowthSweep {
    pub fn new(start: f64, end: f64, step: f64) -> Self {
        Self { start, end, step }
    }

    pub fn growth_rates(&self) -> Result<Vec<f64>> {
        self.validate()?;
        let steps = ((self.end - self.start) / self.step + 1e-9).floor() as usize;
        let count = steps + 1;
        if count > MAX_SWEEP_POINTS {
            return Err(SimError::invalid_parameter(format!(
                "growth sweep would evaluate {count} points, limit is {MAX_SWEEP_POINTS}"
            )));
        }
        Ok((0..count)
            .map(|i| (self.start + i as f64 * self.step).min(self.end))
            .collect())
    }

    fn validate(&self) -> Result<()> {
        if !self.start.is_finite() || !self.end.is_finite() || !self.step.is_finite() {
            return Err(SimError::invalid_parameter("growth sweep bounds must be finite"));
        }
        if self.step <= 0.0 {
            return Err(SimError::invalid_parameter(format!(
                "growth sweep step must be > 0, got {}",
                self.step
            )));
        }
        if self.start > self.end {
            return Err(SimError::invalid_parameter(format!(
                "growth sweep start ({}) must not exceed end ({})",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthSweepPoint {
    pub growth_rate: f64,
    pub alpha: f64,
    pub actual: QuantileSummary,
}

/// Reruns the simulation at every growth rate in `sweep`.
///
/// Every point reuses `config.seed`, so the company categories drawn are the
/// same at each point and only the power-law multiples move with alpha.
/// Quantiles are therefore non-decreasing in growth rate.
pub fn run_growth_sweep(
    config: &SimulationConfig,
    terms: &FundTerms,
    sweep: &GrowthSweep,
) -> Result<Vec<GrowthSweepPoint>> {
    terms.validate()?;
    let rates = sweep.growth_rates()?;
    info!(
        points = rates.len(),
        start = sweep.start,
        end = sweep.end,
        runs = config.simulation_runs,
        "running growth sweep"
    );

    let points = rates
        .par_iter()
        .map(|&growth_rate| {
            let point_config = SimulationConfig {
                target_growth_rate: growth_rate,
                ..config.clone()
            };
            let dataset = simulate(&point_config)?;
            let actual: Vec<f64> = fund_returns(&dataset, terms)
                .into_iter()
                .map(|r| r.actual)
                .collect();
            let actual = quantile_summary(&actual);
            debug!(growth_rate, alpha = dataset.alpha, median = actual.p50, "sweep point");
            Ok(GrowthSweepPoint {
                growth_rate,
                alpha: dataset.alpha,
                actual,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(points)
}
