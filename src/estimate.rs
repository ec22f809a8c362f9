//! # Orchestration
//!
//! $$
//! \text{config} \to \text{matrix functions} \to \text{chains} \to \text{merge}
//! $$
//!
//! The public operations live here: validate shapes, build the matrix
//! functions once (O(n³)), run independent chains in parallel (O(n²) per
//! step), merge the per-chain accumulators in deterministic order and
//! finalize. Ten times the samples costs roughly ten times the sampling
//! time; the setup is amortized.

use ndarray::Array1;
use ndarray::Array2;
use ndarray_linalg::Eigh;
use ndarray_linalg::UPLO;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::debug;

use crate::error::EstimateError;
use crate::error::Result;
use crate::estimator::CovarianceEstimator;
use crate::estimator::LaggedCovarianceEstimator;
use crate::estimator::MeanEstimator;
use crate::matfn::MatrixFunctionCache;
use crate::matfn::PSD_TOL;
use crate::process::ExactOU;
use crate::process::OUTransition;
use crate::traits::OnlineEstimatorExt;

/// Tolerance for the symmetry check on the diffusion matrix.
const SYM_TOL: f64 = 1e-12;

/// Knobs of one estimation call.
///
/// The estimate is a pure function of the inputs and this configuration:
/// identical seed, chain count and sample budget reproduce results bit for
/// bit.
#[derive(Debug, Clone)]
pub struct EstimateConfig {
  /// Step size of the exact transition. Larger steps decorrelate
  /// consecutive samples but push `Q = Σ − ΦΣΦᵀ` towards the limits of
  /// floating-point positive-semidefiniteness.
  pub dt: f64,
  /// Total number of accumulated samples, split across chains.
  pub num_samples: usize,
  /// Discarded warm-up steps per chain before accumulation begins.
  pub burn_in: usize,
  /// Autocovariance lag in steps; `expnegm` estimates `exp(-A·lag·dt)`.
  pub lag: usize,
  /// Independent chains sampled in parallel and merged at finalization.
  pub chains: usize,
  /// Seed the per-chain RNGs are derived from.
  pub seed: u64,
}

impl Default for EstimateConfig {
  fn default() -> Self {
    Self {
      dt: crate::DT,
      num_samples: crate::NUM_SAMPLES,
      burn_in: crate::BURN_IN,
      lag: crate::LAG,
      chains: crate::CHAINS,
      seed: 0,
    }
  }
}

/// Monte Carlo estimate of the solution of `Ax = b`: the stationary mean of
/// the process with drift `b − Ax`. Exact in expectation for any stationary
/// drift, independent of `D`.
pub fn solve(
  a: &Array2<f64>,
  b: &Array1<f64>,
  d: Option<&Array2<f64>>,
  cfg: &EstimateConfig,
) -> Result<Array1<f64>> {
  let eye;
  let d = match d {
    Some(d) => d,
    None => {
      eye = Array2::eye(a.nrows());
      &eye
    }
  };
  validate(a, Some(b), d)?;
  let mut cache = MatrixFunctionCache::new(a, d)?;
  solve_with_cache(&mut cache, b, cfg)
}

/// [`solve`] against a caller-held cache, skipping the O(n³) setup.
pub fn solve_with_cache(
  cache: &mut MatrixFunctionCache,
  b: &Array1<f64>,
  cfg: &EstimateConfig,
) -> Result<Array1<f64>> {
  if b.len() != cache.dim() {
    return Err(EstimateError::ShapeMismatch(format!(
      "offset vector has length {}, drift dimension is {}",
      b.len(),
      cache.dim()
    )));
  }
  check_budget(cfg, 1, "mean")?;

  let transition = OUTransition::new(cache, b, cfg.dt, None)?;
  run_chains(&transition, cfg, MeanEstimator::new).finalize()
}

/// Monte Carlo estimate of `A⁻¹`: the stationary covariance under the
/// `D = I` convention, where `AΣ + ΣAᵀ = 2I` gives `Σ = A⁻¹` for symmetric
/// drift. For a non-symmetric drift (or another `D`) the returned matrix is
/// the solution of the Lyapunov equation.
pub fn inv(a: &Array2<f64>, d: Option<&Array2<f64>>, cfg: &EstimateConfig) -> Result<Array2<f64>> {
  let eye;
  let d = match d {
    Some(d) => d,
    None => {
      eye = Array2::eye(a.nrows());
      &eye
    }
  };
  validate(a, None, d)?;
  let mut cache = MatrixFunctionCache::new(a, d)?;
  inv_with_cache(&mut cache, cfg)
}

/// [`inv`] against a caller-held cache.
pub fn inv_with_cache(cache: &mut MatrixFunctionCache, cfg: &EstimateConfig) -> Result<Array2<f64>> {
  check_budget(cfg, 2, "covariance")?;

  let b = Array1::zeros(cache.dim());
  let transition = OUTransition::new(cache, &b, cfg.dt, None)?;
  run_chains(&transition, cfg, CovarianceEstimator::new).finalize()
}

/// Monte Carlo estimate of `exp(-A·τ)` with `τ = lag·dt`: the lag-τ
/// autocovariance equals `exp(-Aτ)·Σ`, and the cache's exact `Σ⁻¹` divides
/// the normalization out. Exact in expectation for any stationary drift.
pub fn expnegm(
  a: &Array2<f64>,
  d: Option<&Array2<f64>>,
  cfg: &EstimateConfig,
) -> Result<Array2<f64>> {
  let eye;
  let d = match d {
    Some(d) => d,
    None => {
      eye = Array2::eye(a.nrows());
      &eye
    }
  };
  validate(a, None, d)?;
  let mut cache = MatrixFunctionCache::new(a, d)?;
  expnegm_with_cache(&mut cache, cfg)
}

/// [`expnegm`] against a caller-held cache.
pub fn expnegm_with_cache(
  cache: &mut MatrixFunctionCache,
  cfg: &EstimateConfig,
) -> Result<Array2<f64>> {
  check_budget(cfg, cfg.lag + 1, "lagged covariance")?;

  let dim = cache.dim();
  let b = Array1::zeros(dim);
  let transition = OUTransition::new(cache, &b, cfg.dt, None)?;
  let lag = cfg.lag;
  let est = run_chains(&transition, cfg, move |dim| {
    LaggedCovarianceEstimator::new(dim, lag, Array1::zeros(dim))
  });
  Ok(est.finalize()?.dot(&cache.sigma_inv()?))
}

/// Fail fast on dimension inconsistencies and a non-symmetric or indefinite
/// diffusion, before any simulation starts.
fn validate(a: &Array2<f64>, b: Option<&Array1<f64>>, d: &Array2<f64>) -> Result<()> {
  if !a.is_square() {
    return Err(EstimateError::ShapeMismatch(format!(
      "drift matrix must be square, got {}x{}",
      a.nrows(),
      a.ncols()
    )));
  }
  let n = a.nrows();

  if let Some(b) = b {
    if b.len() != n {
      return Err(EstimateError::ShapeMismatch(format!(
        "offset vector has length {}, drift dimension is {}",
        b.len(),
        n
      )));
    }
  }

  if d.dim() != (n, n) {
    return Err(EstimateError::ShapeMismatch(format!(
      "diffusion matrix is {}x{}, drift dimension is {}",
      d.nrows(),
      d.ncols(),
      n
    )));
  }
  for i in 0..n {
    for j in (i + 1)..n {
      if (d[[i, j]] - d[[j, i]]).abs() > SYM_TOL {
        return Err(EstimateError::ShapeMismatch(format!(
          "diffusion matrix is not symmetric at ({i}, {j})"
        )));
      }
    }
  }

  let (vals, _) = d.eigh(UPLO::Lower)?;
  let scale = vals.iter().fold(1.0f64, |m, v| m.max(v.abs()));
  for &v in vals.iter() {
    if v < -PSD_TOL * scale {
      return Err(EstimateError::NumericalInstability {
        matrix: "diffusion matrix",
        eigenvalue: v,
      });
    }
  }

  Ok(())
}

/// The budget must cover every chain's per-chain minimum; a chain that can
/// never produce a defined statistic would silently bias the merge.
fn check_budget(cfg: &EstimateConfig, per_chain: usize, estimator: &'static str) -> Result<()> {
  assert!(cfg.dt > 0.0, "dt must be positive");
  assert!(cfg.chains >= 1, "at least one chain is required");
  assert!(cfg.lag >= 1, "lag must be at least 1");

  let needed = per_chain * cfg.chains;
  if cfg.num_samples < needed {
    return Err(EstimateError::InsufficientSamples {
      estimator,
      needed,
      got: cfg.num_samples,
    });
  }
  Ok(())
}

/// Run `cfg.chains` independent chains in parallel and merge their
/// accumulators in chain order, so the result is deterministic for a fixed
/// seed and chain count.
fn run_chains<E, F>(transition: &OUTransition, cfg: &EstimateConfig, make: F) -> E
where
  E: OnlineEstimatorExt,
  F: Fn(usize) -> E + Sync,
{
  debug!(
    dim = transition.dim(),
    chains = cfg.chains,
    num_samples = cfg.num_samples,
    burn_in = cfg.burn_in,
    dt = cfg.dt,
    "sampling OU chains"
  );

  let mut parts: Vec<E> = (0..cfg.chains)
    .into_par_iter()
    .map(|chain| {
      let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(chain as u64));
      let mut ou = ExactOU::new(transition);
      let mut est = make(transition.dim());

      for _ in 0..cfg.burn_in {
        ou.advance(&mut rng);
      }
      for _ in 0..chain_samples(cfg, chain) {
        est.fold(ou.advance(&mut rng));
      }
      est
    })
    .collect();

  let mut merged = parts.remove(0);
  for part in parts {
    merged.merge(part);
  }
  merged
}

/// Split the sample budget across chains; the first `num_samples % chains`
/// chains take one extra.
fn chain_samples(cfg: &EstimateConfig, chain: usize) -> usize {
  let base = cfg.num_samples / cfg.chains;
  let extra = cfg.num_samples % cfg.chains;
  base + usize::from(chain < extra)
}

#[cfg(test)]
mod tests {
  use ndarray::array;
  use ndarray::Array2;
  use ndarray_linalg::Solve;

  use super::expnegm;
  use super::inv;
  use super::solve;
  use super::EstimateConfig;
  use crate::error::EstimateError;

  fn cfg(num_samples: usize) -> EstimateConfig {
    EstimateConfig {
      dt: 1.0,
      num_samples,
      burn_in: 100,
      lag: 1,
      chains: 4,
      seed: 42,
    }
  }

  #[test]
  fn solve_diagonal_drift() {
    // Ax = b with A = diag(2, 3), b = (1, 1): x = (0.5, 1/3).
    let a = array![[2.0, 0.0], [0.0, 3.0]];
    let b = array![1.0, 1.0];
    let x = solve(&a, &b, None, &cfg(100_000)).unwrap();

    assert!((x[0] - 0.5).abs() < 2e-2);
    assert!((x[1] - 1.0 / 3.0).abs() < 2e-2);
  }

  #[test]
  fn solve_matches_a_direct_solver() {
    let a = array![[3.0, 1.0], [1.0, 2.0]];
    let b = array![1.0, 2.0];
    let direct = a.solve(&b).unwrap();
    let x = solve(&a, &b, None, &cfg(100_000)).unwrap();

    assert!((x[0] - direct[0]).abs() < 2e-2);
    assert!((x[1] - direct[1]).abs() < 2e-2);
  }

  #[test]
  fn inv_identity() {
    let a = Array2::eye(2);
    let est = inv(&a, None, &cfg(200_000)).unwrap();

    for i in 0..2 {
      for j in 0..2 {
        let expected = if i == j { 1.0 } else { 0.0 };
        assert!((est[[i, j]] - expected).abs() < 5e-2);
      }
    }
  }

  #[test]
  fn inv_symmetric_drift() {
    // A = [[2,1],[1,2]], A⁻¹ = [[2/3,-1/3],[-1/3,2/3]].
    let a = array![[2.0, 1.0], [1.0, 2.0]];
    let est = inv(&a, None, &cfg(200_000)).unwrap();
    let residual = a.dot(&est) - Array2::<f64>::eye(2);

    assert!(residual.iter().all(|v| v.abs() < 1e-1));
  }

  #[test]
  fn expnegm_diagonal_drift() {
    let a = array![[0.5, 0.0], [0.0, 1.5]];
    let mut c = cfg(200_000);
    c.dt = 0.5;
    c.lag = 2;
    let est = expnegm(&a, None, &c).unwrap();

    // τ = lag · dt = 1.
    assert!((est[[0, 0]] - (-0.5f64).exp()).abs() < 5e-2);
    assert!((est[[1, 1]] - (-1.5f64).exp()).abs() < 5e-2);
    assert!(est[[0, 1]].abs() < 5e-2);
    assert!(est[[1, 0]].abs() < 5e-2);
  }

  #[test]
  fn fixed_seed_reproduces_bit_for_bit() {
    let a = array![[2.0, 0.5], [0.5, 3.0]];
    let b = array![1.0, -1.0];
    let c = cfg(5_000);

    assert_eq!(
      solve(&a, &b, None, &c).unwrap(),
      solve(&a, &b, None, &c).unwrap()
    );
    assert_eq!(inv(&a, None, &c).unwrap(), inv(&a, None, &c).unwrap());
    assert_eq!(expnegm(&a, None, &c).unwrap(), expnegm(&a, None, &c).unwrap());
  }

  #[test]
  fn non_stationary_drift_fails_every_operation() {
    let a = array![[1.0, 0.0], [0.0, -0.5]];
    let b = array![1.0, 1.0];
    let c = cfg(1_000);

    assert!(matches!(
      solve(&a, &b, None, &c),
      Err(EstimateError::NonStationaryDrift { .. })
    ));
    assert!(matches!(
      inv(&a, None, &c),
      Err(EstimateError::NonStationaryDrift { .. })
    ));
    assert!(matches!(
      expnegm(&a, None, &c),
      Err(EstimateError::NonStationaryDrift { .. })
    ));
  }

  #[test]
  fn shape_mismatches_fail_fast() {
    let a = array![[2.0, 0.0], [0.0, 3.0]];
    let c = cfg(1_000);

    let b = array![1.0, 1.0, 1.0];
    assert!(matches!(
      solve(&a, &b, None, &c),
      Err(EstimateError::ShapeMismatch(_))
    ));

    let d = Array2::eye(3);
    assert!(matches!(
      inv(&a, Some(&d), &c),
      Err(EstimateError::ShapeMismatch(_))
    ));

    let skew = array![[1.0, 0.5], [-0.5, 1.0]];
    assert!(matches!(
      inv(&a, Some(&skew), &c),
      Err(EstimateError::ShapeMismatch(_))
    ));
  }

  #[test]
  fn indefinite_diffusion_fails_fast() {
    let a = array![[2.0, 0.0], [0.0, 3.0]];
    let d = array![[1.0, 0.0], [0.0, -1.0]];

    assert!(matches!(
      inv(&a, Some(&d), &cfg(1_000)),
      Err(EstimateError::NumericalInstability { .. })
    ));
  }

  #[test]
  fn budget_below_the_lag_fails() {
    let a = array![[2.0, 0.0], [0.0, 3.0]];
    let mut c = cfg(8);
    c.lag = 5;

    assert!(matches!(
      expnegm(&a, None, &c),
      Err(EstimateError::InsufficientSamples { .. })
    ));
  }
}
