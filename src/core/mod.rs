pub mod analysis;
mod engine;
mod error;
mod sweep;
mod types;

pub use engine::{
    DrawGenerator, MAX_DRAW, alpha, collect_advisories, draw, fund_rng, min_alpha, run_simulation,
    simulate,
};
pub use error::{Result, SimError};
pub use sweep::{GrowthSweep, GrowthSweepPoint, MAX_SWEEP_POINTS, run_growth_sweep};
pub use types::{
    Advisory, BenchmarkComparison, Bucket, BucketAverage, BucketAverages, BucketBreakdown,
    CagrSummary, Fund, FundAnalysis, FundReturn, FundTerms, NormalizedProbabilities, Outcome,
    OutcomeTally, ProbabilityTriple, QuantileSummary, SimulationConfig, SimulationDataset,
    SimulationReport,
};
