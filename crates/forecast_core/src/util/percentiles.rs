//! Percentile and histogram utilities shared by the engine, portfolio
//! simulator, and forecast facade.

use crate::model::result::{Histogram, HistogramBin, Percentiles};

const BINS: usize = 50;

/// Nearest-rank percentile of a pre-sorted ascending slice.
///
/// `p` is in `[0, 1]`. Empty input returns `0.0`.
pub fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64) * p).ceil() as usize;
    let idx = idx.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}

/// Compute the standard percentile set over a pre-sorted ascending slice.
pub fn percentile_set(sorted: &[f64]) -> Percentiles {
    Percentiles {
        p10: nearest_rank(sorted, 0.10),
        p25: nearest_rank(sorted, 0.25),
        p50: nearest_rank(sorted, 0.50),
        p75: nearest_rank(sorted, 0.75),
        p85: nearest_rank(sorted, 0.85),
        p90: nearest_rank(sorted, 0.90),
        p95: nearest_rank(sorted, 0.95),
    }
}

/// Mean and population standard deviation, computed in one pass.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Bin a pre-sorted ascending slice into a fixed `BINS`-bucket histogram
/// covering `[min, max]` of the observed values.
pub fn histogram(sorted: &[f64]) -> Histogram {
    if sorted.is_empty() {
        return Histogram::default();
    }
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    if (max - min).abs() < f64::EPSILON {
        return Histogram {
            bins: vec![HistogramBin {
                lower: min,
                upper: max,
                count: sorted.len() as u64,
            }],
        };
    }

    let width = (max - min) / BINS as f64;
    let mut bins = vec![0u64; BINS];
    for &v in sorted {
        let idx = (((v - min) / width) as usize).min(BINS - 1);
        bins[idx] += 1;
    }

    Histogram {
        bins: bins
            .into_iter()
            .enumerate()
            .map(|(i, count)| HistogramBin {
                lower: min + i as f64 * width,
                upper: min + (i + 1) as f64 * width,
                count,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_matches_known_values() {
        let sorted: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        assert_eq!(nearest_rank(&sorted, 0.50), 50.0);
        assert_eq!(nearest_rank(&sorted, 0.85), 85.0);
        assert_eq!(nearest_rank(&sorted, 1.0), 100.0);
    }

    #[test]
    fn percentiles_are_monotone() {
        let sorted: Vec<f64> = vec![1.0, 2.0, 3.0, 7.0, 9.0, 20.0, 21.0, 22.0, 50.0, 99.0];
        let p = percentile_set(&sorted);
        assert!(p.p10 <= p.p25);
        assert!(p.p25 <= p.p50);
        assert!(p.p50 <= p.p75);
        assert!(p.p75 <= p.p85);
        assert!(p.p85 <= p.p90);
        assert!(p.p90 <= p.p95);
    }

    #[test]
    fn histogram_covers_all_observations() {
        let sorted: Vec<f64> = (0..1000).map(|x| x as f64).collect();
        let hist = histogram(&sorted);
        let total: u64 = hist.bins.iter().map(|b| b.count).sum();
        assert_eq!(total, 1000);
        assert_eq!(hist.bins.len(), BINS);
    }

    #[test]
    fn histogram_handles_constant_input() {
        let sorted = vec![5.0; 10];
        let hist = histogram(&sorted);
        assert_eq!(hist.bins.len(), 1);
        assert_eq!(hist.bins[0].count, 10);
    }

    #[test]
    fn empty_input_is_safe() {
        assert_eq!(nearest_rank(&[], 0.5), 0.0);
        assert_eq!(histogram(&[]).bins.len(), 0);
        assert_eq!(mean_std(&[]), (0.0, 0.0));
    }
}
