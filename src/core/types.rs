use serde::Serialize;

use super::error::{Result, SimError};

const NORMALIZATION_TOLERANCE: f64 = 1e-9;

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbabilityTriple {
    pub zero: f64,
    pub liquidation: f64,
    pub multiple: f64,
}

impl ProbabilityTriple {
    pub fn new(zero: f64, liquidation: f64, multiple: f64) -> Self {
        Self {
            zero,
            liquidation,
            multiple,
        }
    }

    pub fn sum(&self) -> f64 {
        self.zero + self.liquidation + self.multiple
    }

    /// Rescales the triple proportionally so it sums to 1.
    ///
    /// A sum other than 1 is never an error here; the original sum is kept on
    /// the result so callers can decide whether the adjustment matters.
    pub fn normalize(&self) -> Result<NormalizedProbabilities> {
        for (name, p) in [
            ("zero", self.zero),
            ("liquidation", self.liquidation),
            ("multiple", self.multiple),
        ] {
            if !p.is_finite() || p < 0.0 {
                return Err(SimError::invalid_parameter(format!(
                    "{name} probability must be finite and >= 0, got {p}"
                )));
            }
        }

        let sum = self.sum();
        if sum <= 0.0 {
            return Err(SimError::invalid_parameter(
                "at least one outcome probability must be > 0",
            ));
        }

        Ok(NormalizedProbabilities {
            zero: self.zero / sum,
            liquidation: self.liquidation / sum,
            multiple: self.multiple / sum,
            input_sum: sum,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedProbabilities {
    pub zero: f64,
    pub liquidation: f64,
    pub multiple: f64,
    pub input_sum: f64,
}

impl NormalizedProbabilities {
    pub fn was_adjusted(&self) -> bool {
        (self.input_sum - 1.0).abs() > NORMALIZATION_TOLERANCE
    }

    pub fn weights(&self) -> [f64; 3] {
        [self.zero, self.liquidation, self.multiple]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub probabilities: ProbabilityTriple,
    pub liquidation_recovery: f64,
    pub target_growth_rate: f64,
    pub target_exit_years: f64,
    pub portfolio_size: usize,
    pub simulation_runs: usize,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            probabilities: ProbabilityTriple::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0),
            liquidation_recovery: 0.8,
            target_growth_rate: 0.25,
            target_exit_years: 5.0,
            portfolio_size: 50,
            simulation_runs: 2_500,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    /// Checks every field and returns the probability distribution that will
    /// actually be sampled.
    pub fn validate(&self) -> Result<NormalizedProbabilities> {
        if !(0.0..=1.0).contains(&self.liquidation_recovery) {
            return Err(SimError::invalid_parameter(format!(
                "liquidation recovery must be between 0 and 1, got {}",
                self.liquidation_recovery
            )));
        }
        if !self.target_growth_rate.is_finite() || self.target_growth_rate <= -1.0 {
            return Err(SimError::invalid_parameter(format!(
                "target growth rate must be > -1, got {}",
                self.target_growth_rate
            )));
        }
        if !self.target_exit_years.is_finite() || self.target_exit_years <= 0.0 {
            return Err(SimError::invalid_parameter(format!(
                "target exit horizon must be > 0 years, got {}",
                self.target_exit_years
            )));
        }
        if self.portfolio_size == 0 {
            return Err(SimError::invalid_config("portfolio size must be >= 1"));
        }
        if self.simulation_runs == 0 {
            return Err(SimError::invalid_config("simulation runs must be >= 1"));
        }
        self.probabilities.normalize()
    }
}

/// Fee and benchmark terms applied after the draws are generated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundTerms {
    pub management_fee: f64,
    pub lifespan_years: f64,
    pub benchmark_annual_return: f64,
}

impl Default for FundTerms {
    fn default() -> Self {
        Self {
            management_fee: 0.02,
            lifespan_years: 10.0,
            benchmark_annual_return: 0.10,
        }
    }
}

impl FundTerms {
    pub fn validate(&self) -> Result<()> {
        if !self.management_fee.is_finite() || self.management_fee < 0.0 {
            return Err(SimError::invalid_parameter(format!(
                "management fee must be >= 0, got {}",
                self.management_fee
            )));
        }
        if !self.lifespan_years.is_finite() || self.lifespan_years <= 0.0 {
            return Err(SimError::invalid_parameter(format!(
                "fund lifespan must be > 0 years, got {}",
                self.lifespan_years
            )));
        }
        if !self.benchmark_annual_return.is_finite() || self.benchmark_annual_return <= -1.0 {
            return Err(SimError::invalid_parameter(format!(
                "benchmark annual return must be > -1, got {}",
                self.benchmark_annual_return
            )));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Outcome {
    Zero,
    Liquidation(f64),
    Multiple(f64),
}

impl Outcome {
    pub fn value(self) -> f64 {
        match self {
            Outcome::Zero => 0.0,
            Outcome::Liquidation(v) | Outcome::Multiple(v) => v,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeTally {
    pub zero: usize,
    pub liquidation: usize,
    pub multiple: usize,
}

impl OutcomeTally {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Zero => self.zero += 1,
            Outcome::Liquidation(_) => self.liquidation += 1,
            Outcome::Multiple(_) => self.multiple += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.zero + self.liquidation + self.multiple
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fund {
    pub draws: Vec<f64>,
    pub tally: OutcomeTally,
}

impl Fund {
    pub fn from_outcomes<I: IntoIterator<Item = Outcome>>(outcomes: I) -> Self {
        let mut tally = OutcomeTally::default();
        let draws = outcomes
            .into_iter()
            .map(|outcome| {
                tally.record(outcome);
                outcome.value()
            })
            .collect();
        Self { draws, tally }
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SimulationDataset {
    pub alpha: f64,
    pub probabilities: NormalizedProbabilities,
    pub funds: Vec<Fund>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundReturn {
    pub raw: f64,
    pub actual: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Failure,
    Breakeven,
    ModerateSuccess,
    Winner,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::Failure,
        Bucket::Breakeven,
        Bucket::ModerateSuccess,
        Bucket::Winner,
    ];

    /// Bucket for a return multiple: `<1`, `[1,2)`, `[2,3)`, `>=3`.
    pub fn from_multiple(multiple: f64) -> Self {
        if multiple < 1.0 {
            Bucket::Failure
        } else if multiple < 2.0 {
            Bucket::Breakeven
        } else if multiple < 3.0 {
            Bucket::ModerateSuccess
        } else {
            Bucket::Winner
        }
    }
}

/// One value per return-multiple bucket.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketBreakdown<T = f64> {
    pub under_1x: T,
    pub from_1x_to_2x: T,
    pub from_2x_to_3x: T,
    pub from_3x: T,
}

impl<T: Copy> BucketBreakdown<T> {
    pub fn splat(value: T) -> Self {
        Self {
            under_1x: value,
            from_1x_to_2x: value,
            from_2x_to_3x: value,
            from_3x: value,
        }
    }

    pub fn get(&self, bucket: Bucket) -> T {
        match bucket {
            Bucket::Failure => self.under_1x,
            Bucket::Breakeven => self.from_1x_to_2x,
            Bucket::ModerateSuccess => self.from_2x_to_3x,
            Bucket::Winner => self.from_3x,
        }
    }

    pub fn get_mut(&mut self, bucket: Bucket) -> &mut T {
        match bucket {
            Bucket::Failure => &mut self.under_1x,
            Bucket::Breakeven => &mut self.from_1x_to_2x,
            Bucket::ModerateSuccess => &mut self.from_2x_to_3x,
            Bucket::Winner => &mut self.from_3x,
        }
    }

    pub fn map<U: Copy>(&self, mut f: impl FnMut(T) -> U) -> BucketBreakdown<U> {
        BucketBreakdown {
            under_1x: f(self.under_1x),
            from_1x_to_2x: f(self.from_1x_to_2x),
            from_2x_to_3x: f(self.from_2x_to_3x),
            from_3x: f(self.from_3x),
        }
    }
}

impl BucketBreakdown<f64> {
    pub fn total(&self) -> f64 {
        self.under_1x + self.from_1x_to_2x + self.from_2x_to_3x + self.from_3x
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundAnalysis {
    pub bucket: Bucket,
    pub composition: BucketBreakdown,
    pub return_sources: BucketBreakdown,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketAverage {
    pub bucket: Bucket,
    pub fund_count: usize,
    pub composition: BucketBreakdown,
    pub return_sources: BucketBreakdown,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketAverages {
    pub buckets: [BucketAverage; 4],
}

impl BucketAverages {
    pub fn get(&self, bucket: Bucket) -> &BucketAverage {
        &self.buckets[bucket as usize]
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantileSummary {
    pub mean: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p99: f64,
}

/// CAGR at each quantile; `None` where the quantile multiple is not positive.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CagrSummary {
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p99: Option<f64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkComparison {
    pub fund_counts: BucketBreakdown<usize>,
    pub fund_shares: BucketBreakdown,
    pub public_market_multiple: f64,
    pub share_beating_public_market: f64,
    pub outlier_count: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(
    tag = "kind",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Advisory {
    ProbabilitiesRescaled { input_sum: f64 },
    ProbabilitiesExceedOne { input_sum: f64 },
    ExitBeyondLifespan { exit_years: f64, lifespan_years: f64 },
    FeeDragExceedsCapital { multiplier: f64 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub alpha: f64,
    pub probabilities: NormalizedProbabilities,
    pub fee_multiplier: f64,
    pub fee_drag_exceeds_capital: bool,
    pub fund_returns: Vec<FundReturn>,
    pub raw: QuantileSummary,
    pub actual: QuantileSummary,
    pub actual_cagr: CagrSummary,
    pub benchmark: BenchmarkComparison,
    pub bucket_averages: BucketAverages,
    pub advisories: Vec<Advisory>,
}
