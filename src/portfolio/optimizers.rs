//! # Efficient Frontier Optimizers
//!
//! $$
//! \max_{\mathbf w}\ \mu^\top\mathbf w\ \ \text{s.t.}\ \ \|G\mathbf w\|_2\le\sigma^\*,\quad
//! \min_{\mathbf y}\ \mathbf y^\top\Sigma\mathbf y\ \ \text{s.t.}\ \ (\mu-r_f)^\top\mathbf y=1
//! $$
//!
//! Long-only mean-variance optimizers on the simplex, solved as conic programs.
//! The max-Sharpe problem is homogenized so that it becomes a convex QP; the
//! risk-constrained problem is a second-order cone program over the factor
//! `G` of `Σ = G'G`.

use tracing::debug;
use tracing::info;

use super::linalg::Spectrum;
use super::linalg::dot;
use super::linalg::portfolio_variance;
use super::solver::ConicProblem;
use super::solver::SolveOutcome;
use super::solver::SolverSettings;
use super::types::CovarianceMatrix;
use super::types::FrontierPoint;
use super::types::MeanReturns;
use super::types::WEIGHT_SUM_TOLERANCE;
use super::types::WeightVector;
use super::types::ensure_same_assets;
use crate::error::PortfolioError;
use crate::error::Result;

/// Volatility slack separating "exactly the minimum" from "below the minimum".
const VOLATILITY_SLACK: f64 = 1e-7;

/// Mean-variance problem data with the covariance factor precomputed.
#[derive(Clone, Debug)]
pub struct EfficientFrontier<'a> {
  mu: &'a MeanReturns,
  sigma: &'a CovarianceMatrix,
  factor: Vec<Vec<f64>>,
  settings: SolverSettings,
  weight_sum_tolerance: f64,
}

impl<'a> EfficientFrontier<'a> {
  /// Check that `mu` and `sigma` describe the same assets and that `sigma`
  /// is positive semi-definite.
  pub fn new(mu: &'a MeanReturns, sigma: &'a CovarianceMatrix) -> Result<Self> {
    if mu.is_empty() {
      return Err(PortfolioError::Optimization(
        "no assets to optimize".to_string(),
      ));
    }
    ensure_same_assets("covariance_matrix", mu.assets(), sigma.assets())
      .map_err(|e| PortfolioError::Optimization(e.to_string()))?;

    let spectrum = Spectrum::of(sigma.rows());
    if !spectrum.is_psd() {
      return Err(PortfolioError::Optimization(format!(
        "covariance matrix is not positive semi-definite (smallest eigenvalue {:.3e})",
        spectrum.min_value()
      )));
    }

    Ok(Self {
      mu,
      sigma,
      factor: spectrum.factor(),
      settings: SolverSettings::default(),
      weight_sum_tolerance: WEIGHT_SUM_TOLERANCE,
    })
  }

  pub fn with_settings(mut self, settings: SolverSettings) -> Self {
    self.settings = settings;
    self
  }

  pub fn with_weight_sum_tolerance(mut self, tolerance: f64) -> Self {
    self.weight_sum_tolerance = tolerance;
    self
  }

  fn n(&self) -> usize {
    self.mu.len()
  }

  fn weights_from(&self, raw: &[f64]) -> Result<WeightVector> {
    WeightVector::from_solver(
      self.mu.assets().to_vec(),
      &raw[..self.n()],
      self.weight_sum_tolerance,
    )
  }

  /// Volatility of a weight vector over this problem's covariance.
  pub fn volatility(&self, w: &WeightVector) -> f64 {
    portfolio_variance(w.weights(), self.sigma.rows()).sqrt()
  }

  /// Global minimum-volatility long-only portfolio.
  pub fn min_volatility(&self) -> Result<WeightVector> {
    let n = self.n();
    let outcome = ConicProblem::new(n)
      .quadratic(self.sigma.rows())
      .equal(vec![1.0; n], 1.0)
      .nonnegative(n)
      .solve(&self.settings)?;

    match outcome {
      SolveOutcome::Optimal { x, .. } => self.weights_from(&x),
      SolveOutcome::Infeasible => Err(PortfolioError::Optimization(
        "minimum-volatility problem reported infeasible".to_string(),
      )),
    }
  }

  /// Maximize expected return with volatility at most `max_volatility`.
  pub fn efficient_risk(&self, max_volatility: f64) -> Result<WeightVector> {
    if !max_volatility.is_finite() || max_volatility < 0.0 {
      return Err(PortfolioError::Optimization(format!(
        "volatility target must be a non-negative number, got {max_volatility}"
      )));
    }

    let min_w = self.min_volatility()?;
    let min_vol = self.volatility(&min_w);
    if max_volatility < min_vol - VOLATILITY_SLACK {
      return Err(PortfolioError::InfeasibleRiskTarget {
        requested: max_volatility,
        minimum: min_vol,
      });
    }
    if max_volatility <= min_vol + VOLATILITY_SLACK || self.factor.is_empty() {
      return Ok(min_w);
    }

    let n = self.n();
    let neg_mu: Vec<f64> = self.mu.values().iter().map(|m| -m).collect();
    let outcome = ConicProblem::new(n)
      .linear(neg_mu)
      .equal(vec![1.0; n], 1.0)
      .nonnegative(n)
      .norm_at_most(self.factor.clone(), max_volatility)
      .solve(&self.settings)?;

    match outcome {
      SolveOutcome::Optimal { x, .. } => {
        let w = self.weights_from(&x)?;
        debug!(
          target = max_volatility,
          volatility = self.volatility(&w),
          "solved risk-constrained portfolio"
        );
        Ok(w)
      }
      SolveOutcome::Infeasible => Err(PortfolioError::InfeasibleRiskTarget {
        requested: max_volatility,
        minimum: min_vol,
      }),
    }
  }

  /// Tangency portfolio maximizing `(mu'w - rf) / sqrt(w' Σ w)`.
  pub fn max_sharpe(&self, risk_free_rate: f64) -> Result<WeightVector> {
    if !risk_free_rate.is_finite() {
      return Err(PortfolioError::Optimization(format!(
        "risk-free rate must be finite, got {risk_free_rate}"
      )));
    }
    let excess: Vec<f64> = self.mu.values().iter().map(|m| m - risk_free_rate).collect();
    if excess.iter().all(|e| *e <= 0.0) {
      return Err(PortfolioError::Optimization(format!(
        "no asset has an expected return above the risk-free rate {risk_free_rate}"
      )));
    }

    let n = self.n();
    let outcome = ConicProblem::new(n)
      .quadratic(self.sigma.rows())
      .equal(excess, 1.0)
      .nonnegative(n)
      .solve(&self.settings)?;

    match outcome {
      SolveOutcome::Optimal { x, .. } => self.weights_from(&x),
      SolveOutcome::Infeasible => Err(PortfolioError::Optimization(
        "max-Sharpe problem reported infeasible".to_string(),
      )),
    }
  }

  /// Sweep `points` volatility targets from the minimum-volatility portfolio
  /// to the least volatile highest-return asset.
  pub fn frontier(&self, points: usize) -> Result<Vec<FrontierPoint>> {
    let min_w = self.min_volatility()?;
    let min_vol = self.volatility(&min_w);
    let mut out = Vec::with_capacity(points.max(1));
    out.push(self.point(&min_w));

    let max_mu = self
      .mu
      .values()
      .iter()
      .copied()
      .fold(f64::NEG_INFINITY, f64::max);
    let vols = self.sigma.volatilities();
    let end_vol = self
      .mu
      .values()
      .iter()
      .zip(vols.iter())
      .filter(|(m, _)| **m >= max_mu - 1e-12)
      .map(|(_, v)| *v)
      .fold(f64::INFINITY, f64::min);

    if points <= 1 || end_vol <= min_vol + VOLATILITY_SLACK {
      return Ok(out);
    }

    let step = (end_vol - min_vol) / (points - 1) as f64;
    for k in 1..points {
      let target = min_vol + step * k as f64;
      let w = self.efficient_risk(target)?;
      out.push(self.point(&w));
    }

    info!(points = out.len(), min_vol, end_vol, "computed efficient frontier");
    Ok(out)
  }

  fn point(&self, w: &WeightVector) -> FrontierPoint {
    FrontierPoint {
      volatility: self.volatility(w),
      expected_return: dot(w.weights(), self.mu.values()),
      weights: w.weights().to_vec(),
    }
  }
}

/// Long-only portfolio of minimum volatility.
pub fn solve_min_volatility(sigma: &CovarianceMatrix) -> Result<WeightVector> {
  let flat = MeanReturns::new(sigma.assets().to_vec(), vec![0.0; sigma.len()])?;
  EfficientFrontier::new(&flat, sigma)?.min_volatility()
}

/// Maximize expected return subject to `volatility <= max_volatility`.
pub fn solve_risk_constrained(
  mu: &MeanReturns,
  sigma: &CovarianceMatrix,
  max_volatility: f64,
) -> Result<WeightVector> {
  EfficientFrontier::new(mu, sigma)?.efficient_risk(max_volatility)
}

/// Maximize the Sharpe ratio.
pub fn solve_max_sharpe(
  mu: &MeanReturns,
  sigma: &CovarianceMatrix,
  risk_free_rate: f64,
) -> Result<WeightVector> {
  EfficientFrontier::new(mu, sigma)?.max_sharpe(risk_free_rate)
}

/// Frontier curve as `(volatility, return)` points.
pub fn efficient_frontier(
  mu: &MeanReturns,
  sigma: &CovarianceMatrix,
  points: usize,
) -> Result<Vec<FrontierPoint>> {
  EfficientFrontier::new(mu, sigma)?.frontier(points)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn names(n: usize) -> Vec<String> {
    (0..n).map(|i| ((b'A' + i as u8) as char).to_string()).collect()
  }

  fn two_asset() -> (MeanReturns, CovarianceMatrix) {
    (
      MeanReturns::new(names(2), vec![0.1, 0.05]).unwrap(),
      CovarianceMatrix::new(names(2), vec![vec![0.04, 0.0], vec![0.0, 0.01]]).unwrap(),
    )
  }

  fn three_asset() -> (MeanReturns, CovarianceMatrix) {
    (
      MeanReturns::new(names(3), vec![0.08, 0.1, 0.12]).unwrap(),
      CovarianceMatrix::new(
        names(3),
        vec![
          vec![0.04, 0.01, 0.0],
          vec![0.01, 0.09, 0.02],
          vec![0.0, 0.02, 0.16],
        ],
      )
      .unwrap(),
    )
  }

  fn assert_on_simplex(w: &WeightVector) {
    let total: f64 = w.weights().iter().sum();
    assert!((total - 1.0).abs() <= 1e-6, "weights sum to {total}");
    assert!(w.weights().iter().all(|x| *x >= -1e-8));
  }

  #[test]
  fn min_volatility_matches_closed_form_for_diagonal_covariance() {
    let (_, sigma) = two_asset();
    let w = solve_min_volatility(&sigma).unwrap();
    // w_i proportional to 1 / var_i: (25, 100) / 125
    assert_abs_diff_eq!(w.weights()[0], 0.2, epsilon = 1e-5);
    assert_abs_diff_eq!(w.weights()[1], 0.8, epsilon = 1e-5);
  }

  #[test]
  fn risk_constrained_respects_volatility_ceiling() {
    let (mu, sigma) = two_asset();
    let w = solve_risk_constrained(&mu, &sigma, 0.1).unwrap();
    assert_on_simplex(&w);
    let ef = EfficientFrontier::new(&mu, &sigma).unwrap();
    assert!(ef.volatility(&w) <= 0.1 + 1e-6);
    // 0.04 a^2 + 0.01 (1 - a)^2 = 0.01  ->  a = 0.4
    assert_abs_diff_eq!(w.get("A").unwrap(), 0.4, epsilon = 1e-5);
    assert!(w.get("B").unwrap() > w.get("A").unwrap());
  }

  #[test]
  fn risk_constrained_binds_at_target_between_min_and_max() {
    let (mu, sigma) = three_asset();
    let ef = EfficientFrontier::new(&mu, &sigma).unwrap();
    let w = ef.efficient_risk(0.25).unwrap();
    assert_on_simplex(&w);
    assert_abs_diff_eq!(ef.volatility(&w), 0.25, epsilon = 1e-5);
  }

  #[test]
  fn target_below_minimum_is_infeasible() {
    let (mu, sigma) = two_asset();
    match solve_risk_constrained(&mu, &sigma, 0.05 / 2.0) {
      Err(PortfolioError::InfeasibleRiskTarget { requested, minimum }) => {
        assert_eq!(requested, 0.025);
        // min vol = sqrt(0.2^2 * 0.04 + 0.8^2 * 0.01) = sqrt(0.008)
        assert_abs_diff_eq!(minimum, 0.008_f64.sqrt(), epsilon = 1e-5);
      }
      other => panic!("expected infeasible target, got {other:?}"),
    }
  }

  #[test]
  fn loose_target_picks_highest_return_asset() {
    let (mu, sigma) = two_asset();
    let w = solve_risk_constrained(&mu, &sigma, 1.0).unwrap();
    assert_abs_diff_eq!(w.weights()[0], 1.0, epsilon = 1e-5);
  }

  #[test]
  fn max_sharpe_beats_risk_constrained_portfolios() {
    let (mu, sigma) = three_asset();
    let rf = 0.02;
    let ef = EfficientFrontier::new(&mu, &sigma).unwrap();
    let sharpe = |w: &WeightVector| (dot(w.weights(), mu.values()) - rf) / ef.volatility(w);
    let best = ef.max_sharpe(rf).unwrap();
    assert_on_simplex(&best);
    for target in [0.18, 0.2, 0.25, 0.3, 0.4] {
      let w = ef.efficient_risk(target).unwrap();
      assert!(sharpe(&best) >= sharpe(&w) - 1e-6);
    }
  }

  #[test]
  fn max_sharpe_closed_form_for_uncorrelated_assets() {
    let (mu, sigma) = two_asset();
    let w = solve_max_sharpe(&mu, &sigma, 0.0).unwrap();
    // y = Σ^-1 mu = (2.5, 5) -> (1/3, 2/3)
    assert_abs_diff_eq!(w.weights()[0], 1.0 / 3.0, epsilon = 1e-5);
  }

  #[test]
  fn max_sharpe_needs_positive_excess_return() {
    let (mu, sigma) = two_asset();
    assert!(matches!(
      solve_max_sharpe(&mu, &sigma, 0.2),
      Err(PortfolioError::Optimization(_))
    ));
  }

  #[test]
  fn solvers_are_idempotent() {
    let (mu, sigma) = three_asset();
    let a = solve_risk_constrained(&mu, &sigma, 0.22).unwrap();
    let b = solve_risk_constrained(&mu, &sigma, 0.22).unwrap();
    for (x, y) in a.weights().iter().zip(b.weights()) {
      assert_abs_diff_eq!(*x, *y, epsilon = 1e-9);
    }
  }

  #[test]
  fn indefinite_covariance_is_rejected() {
    let mu = MeanReturns::new(names(2), vec![0.1, 0.05]).unwrap();
    let sigma = CovarianceMatrix::new(names(2), vec![vec![0.01, 0.05], vec![0.05, 0.01]]).unwrap();
    assert!(matches!(
      EfficientFrontier::new(&mu, &sigma),
      Err(PortfolioError::Optimization(_))
    ));
  }

  #[test]
  fn mismatched_assets_are_rejected() {
    let mu = MeanReturns::new(vec!["X".into(), "Y".into()], vec![0.1, 0.05]).unwrap();
    let (_, sigma) = two_asset();
    assert!(matches!(
      EfficientFrontier::new(&mu, &sigma),
      Err(PortfolioError::Optimization(_))
    ));
  }

  #[test]
  fn frontier_is_monotone() {
    let (mu, sigma) = three_asset();
    let points = efficient_frontier(&mu, &sigma, 8).unwrap();
    assert_eq!(points.len(), 8);
    for pair in points.windows(2) {
      assert!(pair[1].volatility >= pair[0].volatility - 1e-6);
      assert!(pair[1].expected_return >= pair[0].expected_return - 1e-6);
    }
    assert_abs_diff_eq!(points[7].expected_return, 0.12, epsilon = 1e-5);
  }
}
