use std::f64::consts::LN_2;

use rand::Rng;
use rand::SeedableRng;
use rand::distributions::{Distribution, Open01, WeightedIndex};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use tracing::{debug, warn};

use super::analysis::{
    analyze_funds, benchmark_comparison, bucket_averages, cagr_summary, fee_multiplier,
    fund_returns, quantile_summary,
};
use super::error::{Result, SimError};
use super::types::{
    Advisory, Fund, FundTerms, NormalizedProbabilities, Outcome, SimulationConfig,
    SimulationDataset, SimulationReport,
};

/// Largest power-law multiple a single draw may reach. Leaves room to sum a
/// full portfolio, and every fund in a run, without overflowing.
pub const MAX_DRAW: f64 = f64::MAX / 1e6;

// Smallest `Open01` sample is 2^-53.
const MIN_UNIT_SAMPLE_LN: f64 = -53.0 * LN_2;

/// Smallest alpha whose tail stays below [`MAX_DRAW`] for every possible
/// uniform sample.
pub fn min_alpha() -> f64 {
    1.0 - MIN_UNIT_SAMPLE_LN / MAX_DRAW.ln()
}

/// Pareto shape for a target annual growth rate held over `exit_years`.
///
/// The annually compounded rate is converted to a continuous one, and the
/// tail exponent is chosen so the median outcome over the exit horizon
/// follows that trajectory.
pub fn alpha(growth_rate: f64, exit_years: f64) -> Result<f64> {
    if !growth_rate.is_finite() || growth_rate <= -1.0 {
        return Err(SimError::invalid_parameter(format!(
            "growth rate must be > -1, got {growth_rate}"
        )));
    }
    if growth_rate == 0.0 {
        return Err(SimError::invalid_parameter(
            "growth rate must be non-zero; alpha is undefined at 0",
        ));
    }
    if !exit_years.is_finite() || exit_years == 0.0 {
        return Err(SimError::invalid_parameter(format!(
            "exit horizon must be finite and non-zero, got {exit_years}"
        )));
    }

    let continuous_rate = growth_rate.ln_1p();
    Ok(1.0 / (continuous_rate * exit_years) + 1.0)
}

/// Samples single-company outcomes from the zero / liquidation / power-law
/// mixture. Validation happens once in [`DrawGenerator::new`].
#[derive(Debug, Clone)]
pub struct DrawGenerator {
    alpha: f64,
    inverse_tail_index: f64,
    liquidation_recovery: f64,
    categories: WeightedIndex<f64>,
}

impl DrawGenerator {
    pub fn new(
        alpha: f64,
        liquidation_recovery: f64,
        probabilities: &NormalizedProbabilities,
    ) -> Result<Self> {
        if !alpha.is_finite() || alpha <= 1.0 {
            return Err(SimError::invalid_parameter(format!(
                "alpha must be > 1 for a proper power-law tail, got {alpha}"
            )));
        }
        let inverse_tail_index = 1.0 / (alpha - 1.0);
        if -MIN_UNIT_SAMPLE_LN * inverse_tail_index > MAX_DRAW.ln() {
            return Err(SimError::invalid_parameter(format!(
                "alpha {alpha} is too close to 1: power-law draws would overflow; \
                 use a lower growth rate or shorter exit horizon (alpha must be >= {:.4})",
                min_alpha()
            )));
        }
        if !(0.0..=1.0).contains(&liquidation_recovery) {
            return Err(SimError::invalid_parameter(format!(
                "liquidation recovery must be between 0 and 1, got {liquidation_recovery}"
            )));
        }
        let categories = WeightedIndex::new(probabilities.weights()).map_err(|e| {
            SimError::invalid_parameter(format!("outcome probabilities cannot be sampled: {e}"))
        })?;

        Ok(Self {
            alpha,
            inverse_tail_index,
            liquidation_recovery,
            categories,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Outcome {
        match self.categories.sample(rng) {
            0 => Outcome::Zero,
            1 => Outcome::Liquidation(self.liquidation_recovery),
            _ => Outcome::Multiple(self.sample_multiple(rng)),
        }
    }

    // Inverse CDF of a Pareto with x_min = 1: P(X >= x) = x^-(alpha - 1).
    fn sample_multiple<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = Open01.sample(rng);
        u.powf(-self.inverse_tail_index)
    }
}

/// One company outcome as a plain multiple.
pub fn draw<R: Rng + ?Sized>(
    alpha: f64,
    liquidation_recovery: f64,
    probabilities: &NormalizedProbabilities,
    rng: &mut R,
) -> Result<f64> {
    let generator = DrawGenerator::new(alpha, liquidation_recovery, probabilities)?;
    Ok(generator.sample(rng).value())
}

/// Random stream for one fund. Streams depend only on the root seed and the
/// fund index, so a dataset is reproducible under any thread count.
pub fn fund_rng(seed: u64, fund_index: usize) -> ChaCha20Rng {
    ChaCha20Rng::seed_from_u64(derive_seed(seed, fund_index as u64))
}

fn derive_seed(base_seed: u64, stream: u64) -> u64 {
    splitmix64(base_seed ^ stream.wrapping_mul(0x9E3779B97F4A7C15))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

pub fn simulate(config: &SimulationConfig) -> Result<SimulationDataset> {
    let probabilities = config.validate()?;
    let alpha = alpha(config.target_growth_rate, config.target_exit_years)?;
    let generator = DrawGenerator::new(alpha, config.liquidation_recovery, &probabilities)?;

    debug!(
        alpha,
        runs = config.simulation_runs,
        portfolio_size = config.portfolio_size,
        seed = config.seed,
        "generating simulated funds"
    );

    let funds: Vec<Fund> = (0..config.simulation_runs)
        .into_par_iter()
        .map(|fund_index| {
            let mut rng = fund_rng(config.seed, fund_index);
            Fund::from_outcomes((0..config.portfolio_size).map(|_| generator.sample(&mut rng)))
        })
        .collect();

    debug!(funds = funds.len(), "fund generation complete");

    Ok(SimulationDataset {
        alpha,
        probabilities,
        funds,
    })
}

/// Non-fatal conditions worth surfacing alongside a run.
pub fn collect_advisories(
    config: &SimulationConfig,
    probabilities: &NormalizedProbabilities,
    terms: &FundTerms,
) -> Vec<Advisory> {
    let mut advisories = Vec::new();

    if probabilities.was_adjusted() {
        advisories.push(Advisory::ProbabilitiesRescaled {
            input_sum: probabilities.input_sum,
        });
        if probabilities.input_sum > 1.0 {
            advisories.push(Advisory::ProbabilitiesExceedOne {
                input_sum: probabilities.input_sum,
            });
        }
    }

    if config.target_exit_years > terms.lifespan_years {
        advisories.push(Advisory::ExitBeyondLifespan {
            exit_years: config.target_exit_years,
            lifespan_years: terms.lifespan_years,
        });
    }

    let multiplier = fee_multiplier(terms.management_fee, terms.lifespan_years);
    if multiplier <= 0.0 {
        advisories.push(Advisory::FeeDragExceedsCapital { multiplier });
    }

    advisories
}

pub fn run_simulation(config: &SimulationConfig, terms: &FundTerms) -> Result<SimulationReport> {
    terms.validate()?;
    let probabilities = config.validate()?;
    let advisories = collect_advisories(config, &probabilities, terms);
    for advisory in &advisories {
        warn!(?advisory, "simulation advisory");
    }

    let dataset = simulate(config)?;
    let fund_returns = fund_returns(&dataset, terms);
    let raw_returns: Vec<f64> = fund_returns.iter().map(|r| r.raw).collect();
    let actual_returns: Vec<f64> = fund_returns.iter().map(|r| r.actual).collect();

    let raw = quantile_summary(&raw_returns);
    let actual = quantile_summary(&actual_returns);
    let actual_cagr = cagr_summary(&actual, terms.lifespan_years);
    let benchmark = benchmark_comparison(&actual_returns, terms);
    let analyses = analyze_funds(&dataset, &raw_returns)?;
    let bucket_averages = bucket_averages(&analyses);
    let multiplier = fee_multiplier(terms.management_fee, terms.lifespan_years);

    debug!(
        median_raw = raw.p50,
        median_actual = actual.p50,
        winners = benchmark.fund_counts.from_3x,
        "simulation summarised"
    );

    Ok(SimulationReport {
        alpha: dataset.alpha,
        probabilities: dataset.probabilities,
        fee_multiplier: multiplier,
        fee_drag_exceeds_capital: multiplier <= 0.0,
        fund_returns,
        raw,
        actual,
        actual_cagr,
        benchmark,
        bucket_averages,
        advisories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ProbabilityTriple;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn small_config(zero: f64, liquidation: f64, multiple: f64) -> SimulationConfig {
        SimulationConfig {
            probabilities: ProbabilityTriple::new(zero, liquidation, multiple),
            liquidation_recovery: 0.8,
            target_growth_rate: 0.30,
            target_exit_years: 4.0,
            portfolio_size: 25,
            simulation_runs: 40,
            seed: 7,
        }
    }

    fn normalized(zero: f64, liquidation: f64, multiple: f64) -> NormalizedProbabilities {
        ProbabilityTriple::new(zero, liquidation, multiple)
            .normalize()
            .unwrap()
    }

    #[test]
    fn alpha_matches_closed_form_for_thirty_percent_over_four_years() {
        let value = alpha(0.30, 4.0).unwrap();
        assert_approx_tol(value, 1.0 / (1.3f64.ln() * 4.0) + 1.0, 1e-12);
        assert_approx_tol(value, 1.9533, 1e-4);
    }

    #[test]
    fn alpha_rejects_values_outside_its_domain() {
        for (growth, years) in [
            (0.0, 4.0),
            (-1.0, 4.0),
            (-1.5, 4.0),
            (0.3, 0.0),
            (f64::NAN, 4.0),
            (0.3, f64::INFINITY),
        ] {
            let err = alpha(growth, years).expect_err("must reject");
            assert!(matches!(err, SimError::InvalidParameter { .. }), "{err}");
        }
    }

    #[test]
    fn negative_growth_produces_an_improper_tail_that_the_generator_rejects() {
        let value = alpha(-0.2, 4.0).unwrap();
        assert!(value < 1.0);
        let err = DrawGenerator::new(value, 0.8, &normalized(0.0, 0.0, 1.0))
            .expect_err("alpha <= 1 must be rejected");
        assert!(matches!(err, SimError::InvalidParameter { .. }));
    }

    struct ZeroRng;

    impl rand::RngCore for ZeroRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            dest.fill(0);
            Ok(())
        }
    }

    #[test]
    fn generator_rejects_tails_heavy_enough_to_overflow() {
        let value = alpha(1.0, 100.0).unwrap();
        assert!(value > 1.0 && value < min_alpha());
        let err = DrawGenerator::new(value, 0.8, &normalized(0.0, 0.0, 1.0))
            .expect_err("overflowing tail must be rejected");
        assert!(matches!(err, SimError::InvalidParameter { .. }));
        assert!(err.to_string().contains("too close to 1"));

        let config = SimulationConfig {
            target_growth_rate: 1.0,
            target_exit_years: 100.0,
            ..small_config(0.0, 0.0, 1.0)
        };
        assert!(matches!(
            run_simulation(&config, &FundTerms::default()),
            Err(SimError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn smallest_uniform_sample_stays_finite_at_the_alpha_floor() {
        let floor = min_alpha() * (1.0 + 1e-12);
        let generator = DrawGenerator::new(floor, 0.8, &normalized(0.0, 0.0, 1.0)).unwrap();
        let extreme = generator.sample_multiple(&mut ZeroRng);
        assert!(extreme.is_finite());
        assert!(extreme <= MAX_DRAW * 1.0001, "{extreme}");
        // A full portfolio of extreme draws still sums to a finite total.
        assert!((extreme * 10_000.0).is_finite());
    }

    #[test]
    fn draw_rejects_alpha_at_or_below_one_and_bad_recovery() {
        let probabilities = normalized(1.0, 1.0, 1.0);
        let mut rng = fund_rng(1, 0);
        assert!(draw(1.0, 0.8, &probabilities, &mut rng).is_err());
        assert!(draw(0.5, 0.8, &probabilities, &mut rng).is_err());
        assert!(draw(f64::NAN, 0.8, &probabilities, &mut rng).is_err());
        assert!(draw(2.0, 1.2, &probabilities, &mut rng).is_err());
        assert!(draw(2.0, -0.1, &probabilities, &mut rng).is_err());
    }

    #[test]
    fn draw_returns_exact_values_for_degenerate_distributions() {
        let mut rng = fund_rng(3, 0);
        for _ in 0..1_000 {
            assert_eq!(draw(2.0, 0.8, &normalized(1.0, 0.0, 0.0), &mut rng).unwrap(), 0.0);
            assert_eq!(draw(2.0, 0.8, &normalized(0.0, 1.0, 0.0), &mut rng).unwrap(), 0.8);
            assert!(draw(2.0, 0.8, &normalized(0.0, 0.0, 1.0), &mut rng).unwrap() >= 1.0);
        }
    }

    #[test]
    fn categorical_selection_follows_normalized_weights() {
        let generator = DrawGenerator::new(2.0, 0.5, &normalized(5.0, 3.0, 2.0)).unwrap();
        let mut rng = fund_rng(11, 0);
        let n = 100_000;
        let fund = Fund::from_outcomes((0..n).map(|_| generator.sample(&mut rng)));

        assert_approx_tol(fund.tally.zero as f64 / n as f64, 0.5, 0.01);
        assert_approx_tol(fund.tally.liquidation as f64 / n as f64, 0.3, 0.01);
        assert_approx_tol(fund.tally.multiple as f64 / n as f64, 0.2, 0.01);
    }

    #[test]
    fn power_law_tail_matches_theoretical_survival_function() {
        let alpha = 2.5;
        let tail_index = alpha - 1.0;
        let generator = DrawGenerator::new(alpha, 0.8, &normalized(0.0, 0.0, 1.0)).unwrap();
        let mut rng = fund_rng(2024, 0);
        let n = 100_000;
        let mut samples: Vec<f64> = (0..n).map(|_| generator.sample(&mut rng).value()).collect();
        assert!(samples.iter().all(|x| *x >= 1.0));

        for x in [1.5_f64, 2.0, 4.0, 8.0, 16.0] {
            let empirical = samples.iter().filter(|s| **s >= x).count() as f64 / n as f64;
            assert_approx_tol(empirical, x.powf(-tail_index), 0.006);
        }

        // Kolmogorov-Smirnov distance against F(x) = 1 - x^-(alpha-1).
        samples.sort_by(|a, b| a.total_cmp(b));
        let mut ks = 0.0_f64;
        for (i, x) in samples.iter().enumerate() {
            let cdf = 1.0 - x.powf(-tail_index);
            let below = i as f64 / n as f64;
            let above = (i + 1) as f64 / n as f64;
            ks = ks.max((cdf - below).abs()).max((above - cdf).abs());
        }
        assert!(ks < 2.0 / (n as f64).sqrt(), "KS statistic too large: {ks}");
    }

    #[test]
    fn simulate_builds_runs_by_portfolio_size_dataset() {
        let config = small_config(1.0, 1.0, 1.0);
        let dataset = simulate(&config).unwrap();
        assert_eq!(dataset.funds.len(), config.simulation_runs);
        for fund in &dataset.funds {
            assert_eq!(fund.len(), config.portfolio_size);
            assert_eq!(fund.tally.total(), config.portfolio_size);
            assert!(fund.draws.iter().all(|d| *d >= 0.0 && d.is_finite()));
        }
        assert_approx_tol(dataset.alpha, alpha(0.30, 4.0).unwrap(), 1e-15);
    }

    #[test]
    fn simulate_is_reproducible_for_a_seed_and_varies_across_seeds() {
        let config = small_config(1.0, 1.0, 1.0);
        let first = simulate(&config).unwrap();
        let second = simulate(&config).unwrap();
        assert_eq!(first.funds, second.funds);

        let mut reseeded = config.clone();
        reseeded.seed = 8;
        let third = simulate(&reseeded).unwrap();
        assert_ne!(first.funds, third.funds);
    }

    #[test]
    fn fund_streams_do_not_depend_on_run_count() {
        let mut config = small_config(1.0, 1.0, 1.0);
        config.simulation_runs = 5;
        let short = simulate(&config).unwrap();
        config.simulation_runs = 12;
        let long = simulate(&config).unwrap();
        assert_eq!(short.funds[..], long.funds[..5]);
    }

    #[test]
    fn all_zero_and_all_liquidation_scenarios_are_exact() {
        let zeros = simulate(&small_config(1.0, 0.0, 0.0)).unwrap();
        assert!(zeros.funds.iter().flat_map(|f| &f.draws).all(|d| *d == 0.0));

        let liquidations = simulate(&small_config(0.0, 1.0, 0.0)).unwrap();
        assert!(
            liquidations
                .funds
                .iter()
                .flat_map(|f| &f.draws)
                .all(|d| *d == 0.8)
        );
    }

    #[test]
    fn advisories_flag_rescaling_long_exits_and_fee_drag() {
        let mut config = small_config(0.6, 0.6, 0.6);
        config.target_exit_years = 12.0;
        let terms = FundTerms {
            management_fee: 0.12,
            lifespan_years: 10.0,
            benchmark_annual_return: 0.10,
        };
        let probabilities = config.validate().unwrap();
        let advisories = collect_advisories(&config, &probabilities, &terms);

        assert!(advisories.iter().any(|a| matches!(
            a,
            Advisory::ProbabilitiesRescaled { input_sum } if (*input_sum - 1.8).abs() < 1e-12
        )));
        assert!(
            advisories
                .iter()
                .any(|a| matches!(a, Advisory::ProbabilitiesExceedOne { .. }))
        );
        assert!(
            advisories
                .iter()
                .any(|a| matches!(a, Advisory::ExitBeyondLifespan { .. }))
        );
        assert!(
            advisories
                .iter()
                .any(|a| matches!(a, Advisory::FeeDragExceedsCapital { .. }))
        );
    }

    #[test]
    fn clean_inputs_produce_no_advisories() {
        let config = small_config(0.5, 0.25, 0.25);
        let probabilities = config.validate().unwrap();
        assert!(collect_advisories(&config, &probabilities, &FundTerms::default()).is_empty());
    }

    #[test]
    fn run_simulation_reports_every_fund_and_consistent_aggregates() {
        let config = small_config(0.5, 0.25, 0.25);
        let terms = FundTerms::default();
        let report = run_simulation(&config, &terms).unwrap();

        assert_eq!(report.fund_returns.len(), config.simulation_runs);
        assert_approx_tol(report.fee_multiplier, 0.8, 1e-12);
        assert!(!report.fee_drag_exceeds_capital);
        for r in &report.fund_returns {
            assert_approx_tol(r.actual, r.raw * 0.8, 1e-12);
        }

        let members: usize = report
            .bucket_averages
            .buckets
            .iter()
            .map(|b| b.fund_count)
            .sum();
        assert_eq!(members, config.simulation_runs);
        assert!(report.raw.p25 <= report.raw.p50 && report.raw.p50 <= report.raw.p99);
        assert!(report.advisories.is_empty());
    }

    #[test]
    fn run_simulation_passes_negative_fee_multiplier_through() {
        let config = small_config(0.0, 1.0, 0.0);
        let terms = FundTerms {
            management_fee: 0.15,
            lifespan_years: 10.0,
            benchmark_annual_return: 0.10,
        };
        let report = run_simulation(&config, &terms).unwrap();
        assert!(report.fee_drag_exceeds_capital);
        assert_approx_tol(report.fee_multiplier, -0.5, 1e-12);
        for r in &report.fund_returns {
            assert_approx_tol(r.actual, -0.4, 1e-12);
        }
        assert_eq!(report.actual_cagr.p50, None);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_alpha_decreases_with_longer_horizons(
            growth in 0.01f64..3.0,
            years in 0.5f64..50.0,
            extra in 0.1f64..10.0,
        ) {
            prop_assert!(alpha(growth, years + extra).unwrap() < alpha(growth, years).unwrap());
        }

        #[test]
        fn prop_alpha_decreases_with_faster_growth(
            growth in 0.01f64..3.0,
            extra in 0.01f64..1.0,
            years in 0.5f64..50.0,
        ) {
            prop_assert!(alpha(growth + extra, years).unwrap() < alpha(growth, years).unwrap());
        }

        #[test]
        fn prop_alpha_exceeds_one_for_positive_growth_and_horizon(
            growth in 0.001f64..5.0,
            years in 0.1f64..100.0,
        ) {
            prop_assert!(alpha(growth, years).unwrap() > 1.0);
        }
    }
}
