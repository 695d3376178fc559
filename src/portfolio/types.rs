//! # Portfolio Types
//!
//! $$
//! \mathbf{w}\in\Delta^{n-1}=\{\mathbf{w}\ge 0,\ \mathbf 1^\top\mathbf{w}=1\}
//! $$
//!
//! Value types passed between the estimator, optimizer, evaluator and allocator.
//! Every vector-like type carries its asset identifiers so that stages can be
//! checked against each other before any arithmetic happens.

use serde::Deserialize;
use serde::Serialize;

use crate::error::PortfolioError;
use crate::error::Result;

/// Largest violation of `w >= 0` accepted in a solved weight vector.
pub const NONNEGATIVITY_TOLERANCE: f64 = 1e-8;

/// Default tolerance on `sum(w) = 1`.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Annualized expected return per asset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeanReturns {
  assets: Vec<String>,
  values: Vec<f64>,
}

impl MeanReturns {
  /// Build a mean-return vector, checking lengths and finiteness.
  pub fn new(assets: Vec<String>, values: Vec<f64>) -> Result<Self> {
    if assets.len() != values.len() {
      return Err(PortfolioError::invalid(
        "mean_returns",
        format!("{} assets but {} values", assets.len(), values.len()),
      ));
    }
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
      return Err(PortfolioError::invalid(
        "mean_returns",
        format!("non-finite expected return for {}", assets[i]),
      ));
    }
    Ok(Self { assets, values })
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn values(&self) -> &[f64] {
    &self.values
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Expected return of a single asset.
  pub fn get(&self, asset: &str) -> Option<f64> {
    self
      .assets
      .iter()
      .position(|a| a == asset)
      .map(|i| self.values[i])
  }
}

/// Annualized covariance of asset returns.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CovarianceMatrix {
  assets: Vec<String>,
  values: Vec<Vec<f64>>,
}

impl CovarianceMatrix {
  /// Build a covariance matrix.
  ///
  /// The matrix must be square, finite, symmetric and have a non-negative
  /// diagonal. Positive semi-definiteness is checked by the optimizer, since
  /// the evaluator does not need it.
  pub fn new(assets: Vec<String>, values: Vec<Vec<f64>>) -> Result<Self> {
    let n = assets.len();
    if values.len() != n {
      return Err(PortfolioError::invalid(
        "covariance_matrix",
        format!("expected {n} rows, got {}", values.len()),
      ));
    }
    for (i, row) in values.iter().enumerate() {
      if row.len() != n {
        return Err(PortfolioError::invalid(
          "covariance_matrix",
          format!("row {i} has {} columns, expected {n}", row.len()),
        ));
      }
      if row.iter().any(|v| !v.is_finite()) {
        return Err(PortfolioError::invalid(
          "covariance_matrix",
          format!("row {i} contains a non-finite value"),
        ));
      }
      if row[i] < 0.0 {
        return Err(PortfolioError::invalid(
          "covariance_matrix",
          format!("negative variance {} for {}", row[i], assets[i]),
        ));
      }
    }

    for i in 0..n {
      for j in (i + 1)..n {
        let scale = values[i][j].abs().max(values[j][i].abs()).max(1.0);
        if (values[i][j] - values[j][i]).abs() > 1e-10 * scale {
          return Err(PortfolioError::invalid(
            "covariance_matrix",
            format!(
              "not symmetric: [{i},{j}]={} != [{j},{i}]={}",
              values[i][j], values[j][i]
            ),
          ));
        }
      }
    }

    Ok(Self { assets, values })
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  /// Row-major matrix entries.
  pub fn rows(&self) -> &[Vec<f64>] {
    &self.values
  }

  pub fn len(&self) -> usize {
    self.assets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.assets.is_empty()
  }

  /// Covariance between two assets.
  pub fn get(&self, a: &str, b: &str) -> Option<f64> {
    let i = self.assets.iter().position(|x| x == a)?;
    let j = self.assets.iter().position(|x| x == b)?;
    Some(self.values[i][j])
  }

  /// Per-asset volatilities, `sqrt(diag)`.
  pub fn volatilities(&self) -> Vec<f64> {
    (0..self.len())
      .map(|i| self.values[i][i].max(0.0).sqrt())
      .collect()
  }
}

/// Long-only portfolio weights summing to one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WeightVector {
  assets: Vec<String>,
  weights: Vec<f64>,
}

impl WeightVector {
  /// Build a weight vector, enforcing the budget and long-only constraints
  /// within `sum_tolerance`.
  pub fn new(assets: Vec<String>, weights: Vec<f64>, sum_tolerance: f64) -> Result<Self> {
    if assets.len() != weights.len() {
      return Err(PortfolioError::invalid(
        "weights",
        format!("{} assets but {} weights", assets.len(), weights.len()),
      ));
    }
    if let Some(i) = weights
      .iter()
      .position(|w| !w.is_finite() || *w < -NONNEGATIVITY_TOLERANCE || *w > 1.0 + sum_tolerance)
    {
      return Err(PortfolioError::invalid(
        "weights",
        format!("weight {} for {} is outside [0, 1]", weights[i], assets[i]),
      ));
    }
    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > sum_tolerance {
      return Err(PortfolioError::invalid(
        "weights",
        format!("weights sum to {total}, expected 1"),
      ));
    }
    Ok(Self { assets, weights })
  }

  /// Turn raw solver output into weights: clip solver noise below zero and
  /// renormalize onto the simplex.
  pub(crate) fn from_solver(assets: Vec<String>, raw: &[f64], sum_tolerance: f64) -> Result<Self> {
    let clipped: Vec<f64> = raw
      .iter()
      .map(|&w| if w < NONNEGATIVITY_TOLERANCE { 0.0 } else { w })
      .collect();
    let total: f64 = clipped.iter().sum();
    if !total.is_finite() || total <= 0.0 {
      return Err(PortfolioError::Optimization(format!(
        "solver returned degenerate weights (sum {total})"
      )));
    }
    let weights = clipped.iter().map(|w| w / total).collect();
    Self::new(assets, weights, sum_tolerance)
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn weights(&self) -> &[f64] {
    &self.weights
  }

  pub fn len(&self) -> usize {
    self.weights.len()
  }

  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }

  /// Weight of a single asset.
  pub fn get(&self, asset: &str) -> Option<f64> {
    self
      .assets
      .iter()
      .position(|a| a == asset)
      .map(|i| self.weights[i])
  }

  /// Iterate `(asset, weight)` pairs in asset order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .assets
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }
}

/// Expected return, volatility and Sharpe ratio of a portfolio.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Performance {
  pub expected_return: f64,
  pub volatility: f64,
  /// `(expected_return - risk_free) / volatility`; NaN only when produced by
  /// [`evaluate_lenient`](super::performance::evaluate_lenient) on a
  /// zero-volatility portfolio.
  pub sharpe_ratio: f64,
}

/// A point of the efficient frontier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
  pub volatility: f64,
  pub expected_return: f64,
  pub weights: Vec<f64>,
}

/// Whole-share position in one asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
  pub asset: String,
  pub shares: u64,
}

/// Integer share counts plus uninvested cash.
///
/// Assets allocated zero shares are omitted from `holdings`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscreteAllocation {
  pub holdings: Vec<Holding>,
  pub leftover: f64,
}

impl DiscreteAllocation {
  /// Share count for an asset, zero when it was not bought.
  pub fn shares(&self, asset: &str) -> u64 {
    self
      .holdings
      .iter()
      .find(|h| h.asset == asset)
      .map(|h| h.shares)
      .unwrap_or(0)
  }
}

pub(crate) fn ensure_same_assets(what: &str, expected: &[String], got: &[String]) -> Result<()> {
  if expected != got {
    return Err(PortfolioError::invalid(
      what,
      format!("asset order {got:?} does not match {expected:?}"),
    ));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn names(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn covariance_rejects_asymmetry() {
    let err = CovarianceMatrix::new(names(&["A", "B"]), vec![vec![0.04, 0.01], vec![0.02, 0.09]]);
    assert!(matches!(err, Err(PortfolioError::InvalidInput { .. })));
  }

  #[test]
  fn covariance_rejects_negative_variance() {
    let err = CovarianceMatrix::new(names(&["A"]), vec![vec![-0.01]]);
    assert!(err.is_err());
  }

  #[test]
  fn covariance_volatilities_are_sqrt_of_diagonal() {
    let cov = CovarianceMatrix::new(names(&["A", "B"]), vec![vec![0.04, 0.0], vec![0.0, 0.09]])
      .unwrap();
    let vols = cov.volatilities();
    assert!((vols[0] - 0.2).abs() < 1e-12);
    assert!((vols[1] - 0.3).abs() < 1e-12);
    assert_eq!(cov.get("A", "B"), Some(0.0));
  }

  #[test]
  fn weights_must_sum_to_one() {
    let err = WeightVector::new(names(&["A", "B"]), vec![0.5, 0.4], WEIGHT_SUM_TOLERANCE);
    assert!(err.is_err());
    let ok = WeightVector::new(names(&["A", "B"]), vec![0.6, 0.4], WEIGHT_SUM_TOLERANCE).unwrap();
    assert_eq!(ok.get("A"), Some(0.6));
    assert_eq!(ok.get("C"), None);
  }

  #[test]
  fn solver_noise_is_clipped_and_renormalized() {
    let w = WeightVector::from_solver(
      names(&["A", "B", "C"]),
      &[0.7, -1e-10, 0.3000001],
      WEIGHT_SUM_TOLERANCE,
    )
    .unwrap();
    assert_eq!(w.weights()[1], 0.0);
    let total: f64 = w.weights().iter().sum();
    assert!((total - 1.0).abs() < 1e-12);
  }

  #[test]
  fn allocation_reports_zero_for_absent_assets() {
    let alloc = DiscreteAllocation {
      holdings: vec![Holding {
        asset: "A".to_string(),
        shares: 3,
      }],
      leftover: 1.5,
    };
    assert_eq!(alloc.shares("A"), 3);
    assert_eq!(alloc.shares("B"), 0);
  }
}
