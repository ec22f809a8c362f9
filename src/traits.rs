//! # Traits
//!
//! $$
//! \hat\theta_k = f(x_1,\dots,x_k),\qquad \text{memory } O(n^2)
//! $$
//!

use ndarray::ArrayView1;

use crate::error::Result;

/// Single-pass accumulator over a stream of sampled process states.
///
/// Implementations hold exact accumulated sums, so `finalize` yields the same
/// estimate no matter how the stream was chunked across chains, and memory
/// stays O(n²) regardless of how many states were folded.
pub trait OnlineEstimatorExt: Sized + Send {
  type Output;

  /// Fold one sampled state into the running statistic.
  fn fold(&mut self, x: ArrayView1<'_, f64>);

  /// Number of states folded so far.
  fn count(&self) -> usize;

  /// Absorb the accumulator of an independent chain.
  fn merge(&mut self, other: Self);

  /// Produce the estimate, or `InsufficientSamples` if too few states were
  /// folded for the statistic to be defined.
  fn finalize(self) -> Result<Self::Output>;
}
