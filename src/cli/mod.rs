use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use crate::core::{
    Advisory, BenchmarkComparison, BucketAverages, CagrSummary, FundReturn, FundTerms,
    GrowthSweep, GrowthSweepPoint, NormalizedProbabilities, ProbabilityTriple, QuantileSummary,
    Result, SimError, SimulationConfig, run_growth_sweep, run_simulation,
};

#[derive(Parser, Debug)]
#[command(
    name = "venture-sim",
    about = "Monte Carlo simulator for venture fund returns under a power-law outcome model"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Simulate fund outcomes and summarise returns before and after fees.
    Simulate(SimulateArgs),
    /// Rerun the simulation across a range of target growth rates.
    Sweep(SweepArgs),
}

/// Portfolio and fund flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct FundArgs {
    #[arg(
        long,
        default_value_t = 33.33,
        help = "Probability a company returns nothing, in percent"
    )]
    pub zero_pct: f64,
    #[arg(
        long,
        default_value_t = 33.33,
        help = "Probability a company is liquidated, in percent"
    )]
    pub liquidation_pct: f64,
    #[arg(
        long,
        default_value_t = 33.33,
        help = "Probability a company returns a power-law multiple, in percent"
    )]
    pub multiple_pct: f64,
    #[arg(
        long,
        default_value_t = 80.0,
        help = "Capital recovered in a liquidation, in percent"
    )]
    pub liquidation_recovery_pct: f64,
    #[arg(
        long,
        default_value_t = 25.0,
        help = "Target annual growth rate of a successful company, in percent"
    )]
    pub target_growth_pct: f64,
    #[arg(long, default_value_t = 5.0, help = "Years to exit for a successful company")]
    pub target_exit_years: f64,
    #[arg(long, default_value_t = 50, help = "Companies per fund")]
    pub portfolio_size: usize,
    #[arg(long, default_value_t = 2.0, help = "Annual management fee in percent")]
    pub management_fee_pct: f64,
    #[arg(long, default_value_t = 10)]
    pub fund_lifespan_years: u32,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Annual public market return used as a benchmark, in percent"
    )]
    pub benchmark_return_pct: f64,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub fund: FundArgs,
    #[arg(long, default_value_t = 2500, help = "Number of simulated funds")]
    pub simulations: usize,
    #[arg(long, help = "Include every simulated fund's raw and actual return")]
    pub include_fund_returns: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SweepArgs {
    #[command(flatten)]
    pub fund: FundArgs,
    #[arg(long, default_value_t = 1000, help = "Number of simulated funds per growth rate")]
    pub simulations: usize,
    #[arg(long, default_value_t = 15.0)]
    pub growth_start_pct: f64,
    #[arg(long, default_value_t = 30.0)]
    pub growth_end_pct: f64,
    #[arg(long, default_value_t = 1.0)]
    pub growth_step_pct: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    config: SimulationConfig,
    terms: FundTerms,
    alpha: f64,
    probabilities: NormalizedProbabilities,
    fee_multiplier: f64,
    fee_drag_exceeds_capital: bool,
    raw: QuantileSummary,
    actual: QuantileSummary,
    actual_cagr: CagrSummary,
    benchmark: BenchmarkComparison,
    bucket_averages: BucketAverages,
    advisories: Vec<Advisory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fund_returns: Option<Vec<FundReturn>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SweepResponse {
    config: SimulationConfig,
    terms: FundTerms,
    points: Vec<GrowthSweepPoint>,
}

pub fn run(cli: Cli) -> Result<String> {
    match cli.command {
        Command::Simulate(args) => run_simulate(args),
        Command::Sweep(args) => run_sweep(args),
    }
}

fn run_simulate(args: SimulateArgs) -> Result<String> {
    let (config, terms) = build_config(&args.fund, args.simulations)?;
    let report = run_simulation(&config, &terms)?;
    info!(
        funds = report.fund_returns.len(),
        median_actual = report.actual.p50,
        advisories = report.advisories.len(),
        "simulation finished"
    );

    let response = SimulateResponse {
        config,
        terms,
        alpha: report.alpha,
        probabilities: report.probabilities,
        fee_multiplier: report.fee_multiplier,
        fee_drag_exceeds_capital: report.fee_drag_exceeds_capital,
        raw: report.raw,
        actual: report.actual,
        actual_cagr: report.actual_cagr,
        benchmark: report.benchmark,
        bucket_averages: report.bucket_averages,
        advisories: report.advisories,
        fund_returns: args.include_fund_returns.then_some(report.fund_returns),
    };
    to_json(&response)
}

fn run_sweep(args: SweepArgs) -> Result<String> {
    let (config, terms) = build_config(&args.fund, args.simulations)?;
    let sweep = build_sweep(&args)?;
    let points = run_growth_sweep(&config, &terms, &sweep)?;
    info!(points = points.len(), "growth sweep finished");
    to_json(&SweepResponse {
        config,
        terms,
        points,
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| SimError::serialization(e.to_string()))
}

fn build_sweep(args: &SweepArgs) -> Result<GrowthSweep> {
    if args.growth_step_pct <= 0.0 {
        return Err(SimError::invalid_config("--growth-step-pct must be > 0"));
    }
    if args.growth_start_pct > args.growth_end_pct {
        return Err(SimError::invalid_config(
            "--growth-start-pct must be <= --growth-end-pct",
        ));
    }
    if args.growth_start_pct <= -100.0 {
        return Err(SimError::invalid_config("--growth-start-pct must be > -100"));
    }
    Ok(GrowthSweep::new(
        args.growth_start_pct / 100.0,
        args.growth_end_pct / 100.0,
        args.growth_step_pct / 100.0,
    ))
}

/// Converts percent-denominated flags into a validated config and fund terms.
pub fn build_config(args: &FundArgs, simulations: usize) -> Result<(SimulationConfig, FundTerms)> {
    for (name, value) in [
        ("--zero-pct", args.zero_pct),
        ("--liquidation-pct", args.liquidation_pct),
        ("--multiple-pct", args.multiple_pct),
        ("--liquidation-recovery-pct", args.liquidation_recovery_pct),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(SimError::invalid_config(format!(
                "{name} must be between 0 and 100"
            )));
        }
    }
    if args.zero_pct + args.liquidation_pct + args.multiple_pct <= 0.0 {
        return Err(SimError::invalid_config(
            "--zero-pct, --liquidation-pct and --multiple-pct must not all be 0",
        ));
    }
    if !args.target_growth_pct.is_finite() || args.target_growth_pct <= -100.0 {
        return Err(SimError::invalid_config("--target-growth-pct must be > -100"));
    }
    if !args.target_exit_years.is_finite() || args.target_exit_years <= 0.0 {
        return Err(SimError::invalid_config("--target-exit-years must be > 0"));
    }
    if !(1..=10_000).contains(&args.portfolio_size) {
        return Err(SimError::invalid_config(
            "--portfolio-size must be between 1 and 10000",
        ));
    }
    if !args.management_fee_pct.is_finite() || args.management_fee_pct < 0.0 {
        return Err(SimError::invalid_config("--management-fee-pct must be >= 0"));
    }
    if !(1..=100).contains(&args.fund_lifespan_years) {
        return Err(SimError::invalid_config(
            "--fund-lifespan-years must be between 1 and 100",
        ));
    }
    if !args.benchmark_return_pct.is_finite() || args.benchmark_return_pct <= -100.0 {
        return Err(SimError::invalid_config("--benchmark-return-pct must be > -100"));
    }
    if !(1..=100_000).contains(&simulations) {
        return Err(SimError::invalid_config(
            "--simulations must be between 1 and 100000",
        ));
    }

    let config = SimulationConfig {
        probabilities: ProbabilityTriple::new(
            args.zero_pct / 100.0,
            args.liquidation_pct / 100.0,
            args.multiple_pct / 100.0,
        ),
        liquidation_recovery: args.liquidation_recovery_pct / 100.0,
        target_growth_rate: args.target_growth_pct / 100.0,
        target_exit_years: args.target_exit_years,
        portfolio_size: args.portfolio_size,
        simulation_runs: simulations,
        seed: args.seed,
    };
    let terms = FundTerms {
        management_fee: args.management_fee_pct / 100.0,
        lifespan_years: f64::from(args.fund_lifespan_years),
        benchmark_annual_return: args.benchmark_return_pct / 100.0,
    };
    Ok((config, terms))
}
