//! # Linear Algebra Helpers
//!
//! $$
//! \Sigma = V\Lambda V^\top,\qquad G=\Lambda_+^{1/2}V^\top,\qquad \Sigma = G^\top G
//! $$
//!
//! Dense helpers on row-major `Vec<Vec<f64>>` plus the symmetric
//! eigendecomposition used for PSD checks, repair and conic factors.

use nalgebra::DMatrix;

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub(crate) fn mat_vec_mul(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
  mat.iter().map(|row| dot(row, v)).collect()
}

/// `w' Σ w`, clamped at zero against round-off.
pub(crate) fn portfolio_variance(w: &[f64], cov: &[Vec<f64>]) -> f64 {
  dot(w, &mat_vec_mul(cov, w)).max(0.0)
}

fn to_dmatrix(rows: &[Vec<f64>]) -> DMatrix<f64> {
  let n = rows.len();
  DMatrix::from_fn(n, n, |i, j| rows[i][j])
}

/// Eigenvalues and eigenvectors (as columns) of a symmetric matrix.
pub(crate) struct Spectrum {
  pub values: Vec<f64>,
  vectors: DMatrix<f64>,
}

impl Spectrum {
  pub fn of(rows: &[Vec<f64>]) -> Self {
    let eig = to_dmatrix(rows).symmetric_eigen();
    Self {
      values: eig.eigenvalues.iter().copied().collect(),
      vectors: eig.eigenvectors,
    }
  }

  /// Eigenvalues below `-tolerance()` make the matrix indefinite.
  pub fn tolerance(&self) -> f64 {
    let scale = self.values.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
    1e-8 * scale
  }

  pub fn min_value(&self) -> f64 {
    self.values.iter().copied().fold(f64::INFINITY, f64::min)
  }

  pub fn is_psd(&self) -> bool {
    self.values.is_empty() || self.min_value() >= -self.tolerance()
  }

  /// `V max(Λ, 0) V'`, symmetrized.
  pub fn clipped(&self) -> Vec<Vec<f64>> {
    let n = self.values.len();
    let mut out = vec![vec![0.0; n]; n];
    for (k, &lambda) in self.values.iter().enumerate() {
      if lambda <= 0.0 {
        continue;
      }
      for i in 0..n {
        let vi = self.vectors[(i, k)] * lambda;
        for j in 0..n {
          out[i][j] += vi * self.vectors[(j, k)];
        }
      }
    }
    for i in 0..n {
      for j in (i + 1)..n {
        let avg = 0.5 * (out[i][j] + out[j][i]);
        out[i][j] = avg;
        out[j][i] = avg;
      }
    }
    out
  }

  /// Rows of `G` with `Σ = G'G`; directions with non-positive eigenvalue are
  /// skipped.
  pub fn factor(&self) -> Vec<Vec<f64>> {
    let n = self.values.len();
    self
      .values
      .iter()
      .enumerate()
      .filter(|(_, lambda)| **lambda > 0.0)
      .map(|(k, lambda)| {
        let s = lambda.sqrt();
        (0..n).map(|i| s * self.vectors[(i, k)]).collect()
      })
      .collect()
  }
}

/// Whether a symmetric matrix is positive semi-definite up to round-off.
pub fn is_positive_semidefinite(rows: &[Vec<f64>]) -> bool {
  Spectrum::of(rows).is_psd()
}
