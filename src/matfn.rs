//! # Matrix functions of the drift
//!
//! $$
//! A = V\Lambda V^{-1},\qquad A\Sigma+\Sigma A^\top=2D,\qquad \Phi=e^{-A\,dt}
//! $$
//!
//! One eigendecomposition of the drift matrix pays for everything else: the
//! stationary covariance drops out of the Lyapunov equation as a scalar
//! divide per entry in eigencoordinates, and `exp(-Aτ)` for any lag is an
//! O(n²) rescale of the eigenbasis. Matrix exponentials are memoized per lag,
//! so reusing one cache across `solve`/`inv`/`expnegm` calls on the same
//! drift skips the O(n³) setup.

use std::collections::HashMap;

use ndarray::Array1;
use ndarray::Array2;
use ndarray_linalg::Cholesky;
use ndarray_linalg::Eig;
use ndarray_linalg::Eigh;
use ndarray_linalg::Inverse;
use ndarray_linalg::UPLO;
use num_complex::Complex64;
use ordered_float::OrderedFloat;

use crate::error::EstimateError;
use crate::error::Result;

/// Relative tolerance below which a negative eigenvalue of a derived
/// covariance is treated as roundoff and clamped to zero.
pub(crate) const PSD_TOL: f64 = 1e-10;

/// Eigendecomposition of the drift plus everything derived from it.
///
/// Owned by one estimation call and shared read-only by all of its chains,
/// or held by the caller to amortize the O(n³) setup across calls on the
/// same drift. Invalidation is explicit: drop the cache (or [`clear`] the
/// lag table) when the drift changes.
///
/// [`clear`]: MatrixFunctionCache::clear
#[derive(Debug)]
pub struct MatrixFunctionCache {
  /// Eigenvalues of the drift, all with positive real part.
  eigvals: Array1<Complex64>,
  vecs: Array2<Complex64>,
  vecs_inv: Array2<Complex64>,
  /// Stationary covariance, solution of `AΣ + ΣAᵀ = 2D`.
  sigma: Array2<f64>,
  /// Memoized `exp(-Aτ)` keyed by lag.
  expm: HashMap<OrderedFloat<f64>, Array2<f64>>,
}

impl MatrixFunctionCache {
  /// Decompose the drift `a` and solve the Lyapunov equation for the
  /// diffusion `d`.
  pub fn new(a: &Array2<f64>, d: &Array2<f64>) -> Result<Self> {
    if !a.is_square() {
      return Err(EstimateError::ShapeMismatch(format!(
        "drift matrix must be square, got {}x{}",
        a.nrows(),
        a.ncols()
      )));
    }

    let (eigvals, vecs) = a.eig()?;
    for lam in eigvals.iter() {
      if lam.re <= 0.0 {
        return Err(EstimateError::NonStationaryDrift {
          re: lam.re,
          im: lam.im,
        });
      }
    }
    let vecs_inv = vecs.inv()?;

    // Lyapunov solve in eigencoordinates: with G = V⁻¹ (2D) V⁻ᵀ the
    // equation ΛΣ̃ + Σ̃Λ = G is a scalar divide per entry, and Σ = V Σ̃ Vᵀ.
    let n = a.nrows();
    let two_d = d.mapv(|v| Complex64::new(2.0 * v, 0.0));
    let g = vecs_inv.dot(&two_d).dot(&vecs_inv.t());
    let sigma_tilde =
      Array2::from_shape_fn((n, n), |(i, j)| g[[i, j]] / (eigvals[i] + eigvals[j]));
    let sigma = sym(&vecs.dot(&sigma_tilde).dot(&vecs.t()).mapv(|v| v.re));

    let (vals, _) = sigma.eigh(UPLO::Lower)?;
    let scale = vals.iter().fold(1.0f64, |m, v| m.max(v.abs()));
    for &v in vals.iter() {
      if v < -PSD_TOL * scale {
        return Err(EstimateError::NumericalInstability {
          matrix: "stationary covariance",
          eigenvalue: v,
        });
      }
    }

    Ok(Self {
      eigvals,
      vecs,
      vecs_inv,
      sigma,
      expm: HashMap::new(),
    })
  }

  pub fn dim(&self) -> usize {
    self.eigvals.len()
  }

  /// Stationary covariance `Σ`.
  pub fn sigma(&self) -> &Array2<f64> {
    &self.sigma
  }

  /// `Σ⁻¹`, used to divide the normalization out of lagged autocovariances.
  pub fn sigma_inv(&self) -> Result<Array2<f64>> {
    Ok(self.sigma.inv()?)
  }

  /// `exp(-Aτ)`, O(n²) after the one-time decomposition, memoized per `τ`.
  pub fn expm_neg(&mut self, tau: f64) -> Array2<f64> {
    if let Some(m) = self.expm.get(&OrderedFloat(tau)) {
      return m.clone();
    }
    let phase = Array2::from_diag(&self.eigvals.mapv(|lam| (-lam * tau).exp()));
    let m = self.vecs.dot(&phase).dot(&self.vecs_inv).mapv(|v| v.re);
    self.expm.insert(OrderedFloat(tau), m.clone());
    m
  }

  /// Exact one-step transition pair for step `dt`: the mean-reversion factor
  /// `Φ = exp(-A·dt)` and a square root of the finite-step noise covariance
  /// `Q = Σ − ΦΣΦᵀ`.
  pub fn transition(&mut self, dt: f64) -> Result<(Array2<f64>, Array2<f64>)> {
    let phi = self.expm_neg(dt);
    let q = sym(&(&self.sigma - &phi.dot(&self.sigma).dot(&phi.t())));
    let sqrt_q = psd_sqrt(&q)?;
    Ok((phi, sqrt_q))
  }

  /// `(I − exp(-A·dt)) A⁻¹ b`, the constant drive of the exact transition
  /// mean. Evaluated as `V ψ(Λ) V⁻¹ b` with `ψ(λ) = (1 − e^{-λ·dt})/λ`, so
  /// `A⁻¹` is never formed.
  pub fn mean_drive(&self, b: &Array1<f64>, dt: f64) -> Array1<f64> {
    let one = Complex64::new(1.0, 0.0);
    let psi = self.eigvals.mapv(|lam| (one - (-lam * dt).exp()) / lam);
    let y = &self.vecs_inv.dot(&b.mapv(|v| Complex64::new(v, 0.0))) * &psi;
    self.vecs.dot(&y).mapv(|v| v.re)
  }

  /// Drop the memoized matrix exponentials.
  pub fn clear(&mut self) {
    self.expm.clear();
  }
}

fn sym(m: &Array2<f64>) -> Array2<f64> {
  (m + &m.t()) * 0.5
}

/// Square root of a numerically PSD matrix: Cholesky when it succeeds,
/// otherwise an eigenvalue square root with roundoff-negative eigenvalues
/// clamped to zero. A negative eigenvalue beyond tolerance is a hard error.
fn psd_sqrt(q: &Array2<f64>) -> Result<Array2<f64>> {
  if let Ok(l) = q.cholesky(UPLO::Lower) {
    return Ok(l);
  }

  let (vals, vecs) = q.eigh(UPLO::Lower)?;
  let scale = vals.iter().fold(1.0f64, |m, v| m.max(v.abs()));
  for &v in vals.iter() {
    if v < -PSD_TOL * scale {
      return Err(EstimateError::NumericalInstability {
        matrix: "step covariance",
        eigenvalue: v,
      });
    }
  }
  let root = Array2::from_diag(&vals.mapv(|v| v.max(0.0).sqrt()));
  Ok(vecs.dot(&root))
}
