//! # Portfolio Performance
//!
//! $$
//! R_p=\mu^\top\mathbf w,\qquad \sigma_p=\sqrt{\mathbf w^\top\Sigma\mathbf w},\qquad
//! S=\frac{R_p-r_f}{\sigma_p}
//! $$
//!
//! Expected return, volatility and Sharpe ratio of a weight vector.

use super::linalg::dot;
use super::linalg::portfolio_variance;
use super::types::CovarianceMatrix;
use super::types::MeanReturns;
use super::types::Performance;
use super::types::WeightVector;
use super::types::ensure_same_assets;
use crate::error::PortfolioError;
use crate::error::Result;

/// Volatility at or below which the Sharpe ratio is undefined.
pub const DEGENERATE_VOLATILITY: f64 = 1e-12;

/// Evaluate a portfolio, failing on zero volatility.
pub fn evaluate(
  weights: &WeightVector,
  mu: &MeanReturns,
  sigma: &CovarianceMatrix,
  risk_free_rate: f64,
) -> Result<Performance> {
  let perf = evaluate_lenient(weights, mu, sigma, risk_free_rate)?;
  if perf.sharpe_ratio.is_nan() {
    return Err(PortfolioError::DegenerateVolatility {
      expected_return: perf.expected_return,
    });
  }
  Ok(perf)
}

/// Evaluate a portfolio, reporting a NaN Sharpe ratio on zero volatility.
pub fn evaluate_lenient(
  weights: &WeightVector,
  mu: &MeanReturns,
  sigma: &CovarianceMatrix,
  risk_free_rate: f64,
) -> Result<Performance> {
  ensure_same_assets("mean_returns", weights.assets(), mu.assets())?;
  ensure_same_assets("covariance_matrix", weights.assets(), sigma.assets())?;
  if !risk_free_rate.is_finite() {
    return Err(PortfolioError::invalid("risk_free_rate", "must be finite"));
  }

  let expected_return = dot(weights.weights(), mu.values());
  let volatility = portfolio_variance(weights.weights(), sigma.rows()).sqrt();
  let sharpe_ratio = if volatility <= DEGENERATE_VOLATILITY {
    f64::NAN
  } else {
    (expected_return - risk_free_rate) / volatility
  };

  Ok(Performance {
    expected_return,
    volatility,
    sharpe_ratio,
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::portfolio::types::WEIGHT_SUM_TOLERANCE;

  fn names() -> Vec<String> {
    vec!["A".to_string(), "B".to_string()]
  }

  #[test]
  fn computes_return_volatility_and_sharpe() {
    let w = WeightVector::new(names(), vec![0.5, 0.5], WEIGHT_SUM_TOLERANCE).unwrap();
    let mu = MeanReturns::new(names(), vec![0.1, 0.05]).unwrap();
    let sigma = CovarianceMatrix::new(names(), vec![vec![0.04, 0.0], vec![0.0, 0.01]]).unwrap();
    let perf = evaluate(&w, &mu, &sigma, 0.02).unwrap();
    assert_abs_diff_eq!(perf.expected_return, 0.075, epsilon = 1e-12);
    assert_abs_diff_eq!(perf.volatility, 0.0125_f64.sqrt(), epsilon = 1e-12);
    assert_abs_diff_eq!(perf.sharpe_ratio, 0.055 / 0.0125_f64.sqrt(), epsilon = 1e-12);
  }

  #[test]
  fn zero_volatility_is_degenerate() {
    let w = WeightVector::new(names(), vec![1.0, 0.0], WEIGHT_SUM_TOLERANCE).unwrap();
    let mu = MeanReturns::new(names(), vec![0.03, 0.05]).unwrap();
    let sigma = CovarianceMatrix::new(names(), vec![vec![0.0, 0.0], vec![0.0, 0.01]]).unwrap();

    match evaluate(&w, &mu, &sigma, 0.01) {
      Err(PortfolioError::DegenerateVolatility { expected_return }) => {
        assert_abs_diff_eq!(expected_return, 0.03, epsilon = 1e-12)
      }
      other => panic!("expected degenerate volatility, got {other:?}"),
    }

    let lenient = evaluate_lenient(&w, &mu, &sigma, 0.01).unwrap();
    assert!(lenient.sharpe_ratio.is_nan());
    assert_eq!(lenient.volatility, 0.0);
  }

  #[test]
  fn asset_mismatch_is_invalid_input() {
    let w = WeightVector::new(names(), vec![0.5, 0.5], WEIGHT_SUM_TOLERANCE).unwrap();
    let mu = MeanReturns::new(vec!["A".into(), "C".into()], vec![0.1, 0.05]).unwrap();
    let sigma = CovarianceMatrix::new(names(), vec![vec![0.04, 0.0], vec![0.0, 0.01]]).unwrap();
    assert!(matches!(
      evaluate(&w, &mu, &sigma, 0.0),
      Err(PortfolioError::InvalidInput { .. })
    ));
  }
}
