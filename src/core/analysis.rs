use rayon::prelude::*;

use super::error::{Result, SimError};
use super::types::{
    BenchmarkComparison, Bucket, BucketAverage, BucketAverages, BucketBreakdown, CagrSummary,
    FundAnalysis, FundReturn, FundTerms, QuantileSummary, SimulationDataset,
};

/// Funds returning more than this multiple after fees are reported as outliers.
pub const OUTLIER_MULTIPLE: f64 = 50.0;

/// Gross multiple on invested capital: the mean of the fund's draws.
pub fn raw_return(draws: &[f64]) -> f64 {
    if draws.is_empty() {
        return f64::NAN;
    }
    draws.iter().sum::<f64>() / draws.len() as f64
}

/// Share of committed capital left for investment once management fees have
/// been charged for the whole fund life. Not clamped: a value <= 0 means the
/// fees consume the fund.
pub fn fee_multiplier(annual_fee: f64, lifespan_years: f64) -> f64 {
    1.0 - annual_fee * lifespan_years
}

pub fn actual_return(raw_return: f64, annual_fee: f64, lifespan_years: f64) -> f64 {
    raw_return * fee_multiplier(annual_fee, lifespan_years)
}

pub fn fund_returns(dataset: &SimulationDataset, terms: &FundTerms) -> Vec<FundReturn> {
    dataset
        .funds
        .par_iter()
        .map(|fund| {
            let raw = raw_return(&fund.draws);
            FundReturn {
                raw,
                actual: actual_return(raw, terms.management_fee, terms.lifespan_years),
            }
        })
        .collect()
}

/// Performance bucket of a fund, always keyed on the raw (pre-fee) return.
pub fn classify(raw_return: f64) -> Bucket {
    Bucket::from_multiple(raw_return)
}

pub fn analyze_fund(draws: &[f64], raw_return: f64) -> FundAnalysis {
    let mut counts = BucketBreakdown::splat(0usize);
    let mut sums = BucketBreakdown::splat(0.0);
    for &draw in draws {
        let bucket = Bucket::from_multiple(draw);
        *counts.get_mut(bucket) += 1;
        *sums.get_mut(bucket) += draw;
    }

    let company_count = draws.len() as f64;
    let composition = counts.map(|count| count as f64 / company_count);

    let total: f64 = draws.iter().sum();
    let return_sources = if total == 0.0 {
        BucketBreakdown::splat(0.0)
    } else {
        sums.map(|sum| sum / total)
    };

    FundAnalysis {
        bucket: classify(raw_return),
        composition,
        return_sources,
    }
}

pub fn analyze_funds(dataset: &SimulationDataset, raw_returns: &[f64]) -> Result<Vec<FundAnalysis>> {
    if dataset.funds.len() != raw_returns.len() {
        return Err(SimError::invalid_parameter(format!(
            "expected {} raw returns, got {}",
            dataset.funds.len(),
            raw_returns.len()
        )));
    }

    Ok(dataset
        .funds
        .par_iter()
        .zip(raw_returns.par_iter())
        .map(|(fund, raw)| analyze_fund(&fund.draws, *raw))
        .collect())
}

/// Per-bucket means of every composition and return-source fraction.
///
/// A bucket without members averages to NaN in every field; the member count
/// is reported alongside so callers can tell an empty bucket from a real one.
pub fn bucket_averages(analyses: &[FundAnalysis]) -> BucketAverages {
    let buckets = Bucket::ALL.map(|bucket| {
        let mut fund_count = 0usize;
        let mut composition = BucketBreakdown::splat(0.0);
        let mut return_sources = BucketBreakdown::splat(0.0);

        for analysis in analyses.iter().filter(|a| a.bucket == bucket) {
            fund_count += 1;
            for magnitude in Bucket::ALL {
                *composition.get_mut(magnitude) += analysis.composition.get(magnitude);
                *return_sources.get_mut(magnitude) += analysis.return_sources.get(magnitude);
            }
        }

        if fund_count == 0 {
            return BucketAverage {
                bucket,
                fund_count,
                composition: BucketBreakdown::splat(f64::NAN),
                return_sources: BucketBreakdown::splat(f64::NAN),
            };
        }

        let n = fund_count as f64;
        BucketAverage {
            bucket,
            fund_count,
            composition: composition.map(|sum| sum / n),
            return_sources: return_sources.map(|sum| sum / n),
        }
    });

    BucketAverages { buckets }
}

/// Compound annual growth rate equivalent to `moic` over `lifespan_years`.
pub fn to_cagr(moic: f64, lifespan_years: f64) -> Result<f64> {
    if !moic.is_finite() || moic <= 0.0 {
        return Err(SimError::invalid_parameter(format!(
            "MOIC must be finite and > 0 to convert to CAGR, got {moic}"
        )));
    }
    if !lifespan_years.is_finite() || lifespan_years <= 0.0 {
        return Err(SimError::invalid_parameter(format!(
            "lifespan must be > 0 years, got {lifespan_years}"
        )));
    }
    Ok(moic.powf(1.0 / lifespan_years) - 1.0)
}

pub fn from_cagr(cagr: f64, lifespan_years: f64) -> f64 {
    (1.0 + cagr).powf(lifespan_years)
}

pub fn cagr_summary(quantiles: &QuantileSummary, lifespan_years: f64) -> CagrSummary {
    let convert = |moic: f64| to_cagr(moic, lifespan_years).ok();
    CagrSummary {
        p25: convert(quantiles.p25),
        p50: convert(quantiles.p50),
        p75: convert(quantiles.p75),
        p90: convert(quantiles.p90),
        p99: convert(quantiles.p99),
    }
}

/// Linear-interpolation percentile, sorting `values` in place. `p` is clamped
/// to 0..=100.
pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    percentile_of_sorted(values, p)
}

fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }

    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let w = rank - lower as f64;
        sorted[lower] * (1.0 - w) + sorted[upper] * w
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn quantile_summary(values: &[f64]) -> QuantileSummary {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    QuantileSummary {
        mean: mean(values),
        p25: percentile_of_sorted(&sorted, 25.0),
        p50: percentile_of_sorted(&sorted, 50.0),
        p75: percentile_of_sorted(&sorted, 75.0),
        p90: percentile_of_sorted(&sorted, 90.0),
        p99: percentile_of_sorted(&sorted, 99.0),
    }
}

/// How funds fare after fees: bucket shares on actual returns, plus the
/// share that beats a public-market index compounded over the fund life.
pub fn benchmark_comparison(actual_returns: &[f64], terms: &FundTerms) -> BenchmarkComparison {
    let mut fund_counts = BucketBreakdown::splat(0usize);
    for &actual in actual_returns {
        *fund_counts.get_mut(Bucket::from_multiple(actual)) += 1;
    }

    let n = actual_returns.len() as f64;
    let public_market_multiple = from_cagr(terms.benchmark_annual_return, terms.lifespan_years);
    let beating = actual_returns
        .iter()
        .filter(|r| **r >= public_market_multiple)
        .count();

    BenchmarkComparison {
        fund_counts,
        fund_shares: fund_counts.map(|count| count as f64 / n),
        public_market_multiple,
        share_beating_public_market: beating as f64 / n,
        outlier_count: actual_returns
            .iter()
            .filter(|r| **r > OUTLIER_MULTIPLE)
            .count(),
    }
}
