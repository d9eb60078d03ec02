//! Weibull throughput sampler.
//!
//! Fits a two-parameter Weibull distribution (location fixed at 0) to a
//! throughput history by maximum likelihood, then hands out pre-computed
//! batches of draws. The fit runs once per [`crate::config::SimulationConfig`]
//! and is shared across every trial — per-draw cost is dominated by reading
//! out of a pre-filled batch, not by per-call random-variate generation.
//!
//! The source this spec distills from measured a 10-16x speedup from batched
//! draws over per-call sampling, and the engine performs tens of millions of
//! draws per Monte Carlo run, so batching is not optional here.

use rand::Rng;
use rand_distr::Distribution as _;

use crate::config::ThroughputHistory;
use crate::error::SamplerError;

/// Number of draws materialized per refill. Large enough that refill
/// overhead is negligible relative to draw count in a full simulation run.
pub const BATCH_SIZE: usize = 10_000;

const MLE_MAX_ITERATIONS: usize = 100;
const MLE_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ThroughputDistribution {
    /// Every draw returns `value` exactly.
    Constant { value: f64 },
    /// Two-parameter Weibull (location = 0).
    Weibull { shape: f64, scale: f64 },
    /// Bootstrap: resample uniformly from the observed history.
    Bootstrap,
}

/// A fitted throughput sampler, producing batched non-negative draws.
///
/// `draw` and `draw_batch` take `&mut self` because they mutate the
/// internal batch cursor — callers hold one `Sampler` per trial-runner
/// thread (see `engine::run`, which splits the PRNG per substream and
/// constructs one `Sampler` clone per worker).
#[derive(Debug, Clone)]
pub struct Sampler {
    kind: ThroughputDistribution,
    bootstrap_pool: Vec<f64>,
    batch: Vec<f64>,
    cursor: usize,
}

impl Sampler {
    /// Fit a sampler to `history`. Degenerates to a constant sampler when
    /// the history has fewer than 2 points or zero variance; falls back to
    /// bootstrap if the MLE fit fails to converge numerically.
    pub fn fit(history: &ThroughputHistory) -> Result<Self, SamplerError> {
        if history.is_empty() {
            return Err(SamplerError::EmptyHistory);
        }

        if history.len() < 2 || history.variance() == 0.0 {
            return Ok(Self {
                kind: ThroughputDistribution::Constant {
                    value: history.0[0],
                },
                bootstrap_pool: Vec::new(),
                batch: Vec::new(),
                cursor: 0,
            });
        }

        match fit_weibull_mle(&history.0) {
            Some((shape, scale)) => Ok(Self {
                kind: ThroughputDistribution::Weibull { shape, scale },
                bootstrap_pool: Vec::new(),
                batch: Vec::new(),
                cursor: 0,
            }),
            None => Ok(Self {
                kind: ThroughputDistribution::Bootstrap,
                bootstrap_pool: history.0.clone(),
                batch: Vec::new(),
                cursor: 0,
            }),
        }
    }

    /// True when the fitted sampler is a genuine Weibull (not a degenerate
    /// constant or a bootstrap fallback). Used by golden tests (S1) that
    /// assert the sampler didn't silently fall back.
    pub fn is_weibull(&self) -> bool {
        matches!(self.kind, ThroughputDistribution::Weibull { .. })
    }

    fn refill<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.batch.clear();
        match &self.kind {
            ThroughputDistribution::Constant { value } => {
                self.batch.resize(BATCH_SIZE, *value);
            }
            ThroughputDistribution::Weibull { shape, scale } => {
                // rand_distr parameterizes Weibull as (scale, shape).
                let dist = rand_distr::Weibull::new(*scale, *shape)
                    .expect("fit_weibull_mle only returns finite, positive parameters");
                self.batch.extend((0..BATCH_SIZE).map(|_| dist.sample(rng)));
            }
            ThroughputDistribution::Bootstrap => {
                self.batch.extend((0..BATCH_SIZE).map(|_| {
                    let idx = rng.random_range(0..self.bootstrap_pool.len());
                    self.bootstrap_pool[idx]
                }));
            }
        }
        self.cursor = 0;
    }

    /// Draw one non-negative sample, refilling the internal batch when
    /// exhausted.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        if self.cursor >= self.batch.len() {
            self.refill(rng);
        }
        let value = self.batch[self.cursor];
        self.cursor += 1;
        value.max(0.0)
    }

    /// Draw `k` non-negative samples.
    pub fn draw_batch<R: Rng + ?Sized>(&mut self, rng: &mut R, k: usize) -> Vec<f64> {
        (0..k).map(|_| self.draw(rng)).collect()
    }
}

/// Maximum-likelihood fit of a two-parameter Weibull (location = 0) via
/// Newton's method on the shape parameter, following the standard profile
/// likelihood reduction:
///
/// shape solves `sum(x_i^k * ln(x_i)) / sum(x_i^k) - 1/k - mean(ln(x_i)) = 0`
/// scale = `(sum(x_i^k) / n) ^ (1/k)`
///
/// Returns `None` (triggering bootstrap fallback) if any sample is zero or
/// negative, or if Newton's method fails to converge within
/// `MLE_MAX_ITERATIONS`.
fn fit_weibull_mle(xs: &[f64]) -> Option<(f64, f64)> {
    if xs.iter().any(|&x| x <= 0.0) {
        return None;
    }
    let n = xs.len() as f64;
    let ln_xs: Vec<f64> = xs.iter().map(|x| x.ln()).collect();
    let mean_ln = ln_xs.iter().sum::<f64>() / n;

    let mut shape = 1.0_f64;
    for _ in 0..MLE_MAX_ITERATIONS {
        let xk: Vec<f64> = xs.iter().map(|x| x.powf(shape)).collect();
        let sum_xk: f64 = xk.iter().sum();
        if !sum_xk.is_finite() || sum_xk <= 0.0 {
            return None;
        }
        let sum_xk_lnx: f64 = xk
            .iter()
            .zip(ln_xs.iter())
            .map(|(xk_i, lnx_i)| xk_i * lnx_i)
            .sum();
        let sum_xk_lnx2: f64 = xk
            .iter()
            .zip(ln_xs.iter())
            .map(|(xk_i, lnx_i)| xk_i * lnx_i * lnx_i)
            .sum();

        let f = sum_xk_lnx / sum_xk - 1.0 / shape - mean_ln;
        // derivative of f with respect to shape
        let a = sum_xk_lnx2 / sum_xk;
        let b = (sum_xk_lnx / sum_xk).powi(2);
        let df = a - b + 1.0 / (shape * shape);

        if !f.is_finite() || !df.is_finite() || df == 0.0 {
            return None;
        }

        let next_shape = shape - f / df;
        if !next_shape.is_finite() || next_shape <= 0.0 {
            return None;
        }

        if (next_shape - shape).abs() < MLE_TOLERANCE {
            shape = next_shape;
            break;
        }
        shape = next_shape;
    }

    if !shape.is_finite() || shape <= 0.0 {
        return None;
    }

    let scale = (xs.iter().map(|x| x.powf(shape)).sum::<f64>() / n).powf(1.0 / shape);
    if !scale.is_finite() || scale <= 0.0 {
        return None;
    }

    Some((shape, scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn constant_history_degenerates_to_point_mass() {
        let history = ThroughputHistory::new(vec![5.0]);
        let mut sampler = Sampler::fit(&history).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(sampler.draw(&mut rng), 5.0);
        }
    }

    #[test]
    fn zero_variance_history_degenerates() {
        let history = ThroughputHistory::new(vec![4.0, 4.0, 4.0, 4.0]);
        let sampler = Sampler::fit(&history).unwrap();
        assert!(!sampler.is_weibull());
    }

    #[test]
    fn typical_history_fits_weibull() {
        let history = ThroughputHistory::new(vec![5.0, 6.0, 7.0, 4.0, 8.0, 6.0, 5.0, 7.0]);
        let sampler = Sampler::fit(&history).unwrap();
        assert!(sampler.is_weibull());
    }

    #[test]
    fn draws_are_always_non_negative() {
        let history = ThroughputHistory::new(vec![1.0, 2.0, 0.0, 3.0, 5.0, 1.0]);
        let mut sampler = Sampler::fit(&history).unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..(BATCH_SIZE * 2 + 17) {
            assert!(sampler.draw(&mut rng) >= 0.0);
        }
    }

    #[test]
    fn empty_history_is_an_error() {
        let history = ThroughputHistory::new(vec![]);
        assert!(matches!(
            Sampler::fit(&history),
            Err(SamplerError::EmptyHistory)
        ));
    }

    #[test]
    fn negative_samples_fall_back_to_bootstrap() {
        // fit_weibull_mle rejects non-positive samples; zero is a legal
        // throughput value (a week with no completions), so the sampler
        // must still produce something sane via bootstrap.
        let history = ThroughputHistory::new(vec![0.0, 1.0, 2.0, 0.0, 3.0]);
        let sampler = Sampler::fit(&history).unwrap();
        assert!(!sampler.is_weibull());
    }

    #[test]
    fn refill_is_deterministic_for_fixed_seed() {
        let history = ThroughputHistory::new(vec![5.0, 6.0, 7.0, 4.0, 8.0, 6.0, 5.0, 7.0]);
        let mut s1 = Sampler::fit(&history).unwrap();
        let mut s2 = Sampler::fit(&history).unwrap();
        let mut r1 = SmallRng::seed_from_u64(7);
        let mut r2 = SmallRng::seed_from_u64(7);
        let b1 = s1.draw_batch(&mut r1, 50);
        let b2 = s2.draw_batch(&mut r2, 50);
        assert_eq!(b1, b2);
    }
}
