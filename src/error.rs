//! # Errors
//!
//! $$
//! \text{input} \mapsto \text{value} \;|\; \text{PortfolioError}
//! $$
//!
//! Every stage of the pipeline reports failure through [`PortfolioError`].

use thiserror::Error;

/// Error type for estimation, optimization and allocation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PortfolioError {
  /// Price data is insufficient or degenerate.
  #[error("estimation error: {0}")]
  Estimation(String),

  /// Requested volatility is below the minimum achievable volatility.
  #[error(
    "volatility target {requested:.6} is infeasible, the minimum achievable volatility is {minimum:.6}"
  )]
  InfeasibleRiskTarget { requested: f64, minimum: f64 },

  /// Solver failure, invalid covariance or unsolvable problem.
  #[error("optimization error: {0}")]
  Optimization(String),

  /// Sharpe ratio is undefined because the portfolio has no volatility.
  #[error("portfolio volatility is zero (expected return {expected_return:.6}), Sharpe ratio undefined")]
  DegenerateVolatility { expected_return: f64 },

  /// Allocation was requested for an asset without a latest price.
  #[error("no latest price for asset {asset}")]
  MissingPrice { asset: String },

  /// Malformed argument (dimension mismatch, non-finite value, ...).
  #[error("invalid input: {field}: {reason}")]
  InvalidInput { field: String, reason: String },

  /// Market-data collaborator failed to produce prices.
  #[error("market data error: {0}")]
  MarketData(String),
}

impl PortfolioError {
  pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::InvalidInput {
      field: field.into(),
      reason: reason.into(),
    }
  }
}

impl From<csv::Error> for PortfolioError {
  fn from(e: csv::Error) -> Self {
    PortfolioError::MarketData(e.to_string())
  }
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, PortfolioError>;
