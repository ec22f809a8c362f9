//! # Online estimators
//!
//! $$
//! \hat\mu,\;\hat\Sigma,\;\hat C(\tau)\ \text{ in one pass, } O(n^2)\text{ memory}
//! $$
//!
//! Each estimator folds one sampled state at a time and never re-reads the
//! past; the accumulated sums are exact, so chains merged in any grouping
//! finalize to the same value.
//!
//! | Estimator                     | Statistic                        | Estimates          |
//! |-------------------------------|----------------------------------|--------------------|
//! | [`MeanEstimator`]             | running mean                     | `A⁻¹b`             |
//! | [`CovarianceEstimator`]       | Welford single-pass covariance   | `Σ` (=`A⁻¹`, `D=I`, symmetric `A`) |
//! | [`LaggedCovarianceEstimator`] | lag-τ autocovariance             | `exp(-Aτ)·Σ`       |

pub mod covariance;
pub mod lagged;
pub mod mean;

pub use self::covariance::CovarianceEstimator;
pub use self::lagged::LaggedCovarianceEstimator;
pub use self::mean::MeanEstimator;

use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;

/// Outer product `x yᵀ`.
pub(crate) fn outer(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Array2<f64> {
  let x = x.insert_axis(Axis(1));
  let y = y.insert_axis(Axis(0));
  x.dot(&y)
}

#[cfg(test)]
mod tests {
  use ndarray::array;

  use super::outer;

  #[test]
  fn outer_product() {
    let m = outer(array![1.0, 2.0].view(), array![3.0, 4.0].view());
    assert_eq!(m, array![[3.0, 4.0], [6.0, 8.0]]);
  }
}
