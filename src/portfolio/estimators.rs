//! # Return and Risk Estimators
//!
//! $$
//! \hat\mu_i = f\,\bar r_i,\qquad
//! \hat\Sigma_{ij} = \frac{f}{T_{ij}-1}\sum_{t}(r_{it}-\bar r_i)(r_{jt}-\bar r_j)
//! $$
//!
//! Annualized mean returns and sample covariance from a [`PriceSeries`].

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::data::PriceSeries;
use super::data::align_complete;
use super::data::simple_returns;
use super::linalg::Spectrum;
use super::types::CovarianceMatrix;
use super::types::MeanReturns;
use crate::error::PortfolioError;
use crate::error::Result;

/// Trading days per year.
pub const TRADING_DAYS: f64 = 252.0;

/// How periodic returns are annualized into an expected return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReturnsMethod {
  /// `frequency * mean(r)`.
  #[default]
  Arithmetic,
  /// `prod(1 + r)^(frequency / n) - 1`.
  Compounded,
}

/// Which observations enter each covariance entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alignment {
  /// Each pair uses the periods where both assets have a return.
  #[default]
  Pairwise,
  /// Only periods where every asset has a return are used.
  Complete,
}

/// Estimator settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
  /// Return periods per year.
  pub frequency: f64,
  pub returns_method: ReturnsMethod,
  pub alignment: Alignment,
  /// Clip negative eigenvalues of an indefinite sample covariance.
  pub repair_psd: bool,
}

impl Default for EstimatorConfig {
  fn default() -> Self {
    Self {
      frequency: TRADING_DAYS,
      returns_method: ReturnsMethod::Arithmetic,
      alignment: Alignment::Pairwise,
      repair_psd: true,
    }
  }
}

/// Estimate mean returns and covariance with default settings.
pub fn estimate(prices: &PriceSeries) -> Result<(MeanReturns, CovarianceMatrix)> {
  estimate_with(prices, &EstimatorConfig::default())
}

/// Estimate annualized mean returns and covariance.
///
/// The covariance is unbiased (ddof = 1), so every asset needs at least two
/// returns, which means three observed closes.
pub fn estimate_with(
  prices: &PriceSeries,
  config: &EstimatorConfig,
) -> Result<(MeanReturns, CovarianceMatrix)> {
  if !(config.frequency.is_finite() && config.frequency > 0.0) {
    return Err(PortfolioError::invalid(
      "frequency",
      format!("must be positive, got {}", config.frequency),
    ));
  }
  if prices.assets().is_empty() {
    return Err(PortfolioError::Estimation(
      "no assets with price data".to_string(),
    ));
  }

  let returns: Vec<Vec<Option<f64>>> = prices
    .columns()
    .iter()
    .map(|col| simple_returns(col))
    .collect();
  for (asset, column) in prices.assets().iter().zip(&returns) {
    let count = column.iter().flatten().count();
    if count < 2 {
      return Err(PortfolioError::Estimation(format!(
        "{asset} has {count} return observation(s), at least 2 are required"
      )));
    }
  }

  let mu = mean_historical_return(prices.assets(), &returns, config)?;
  let cov = sample_covariance(prices.assets(), &returns, config)?;
  debug!(
    assets = prices.assets().len(),
    periods = prices.len().saturating_sub(1),
    "estimated mean returns and covariance"
  );
  Ok((mu, cov))
}

fn mean_historical_return(
  assets: &[String],
  returns: &[Vec<Option<f64>>],
  config: &EstimatorConfig,
) -> Result<MeanReturns> {
  let values = returns
    .iter()
    .map(|r| {
      let obs: Vec<f64> = r.iter().flatten().copied().collect();
      let n = obs.len() as f64;
      match config.returns_method {
        ReturnsMethod::Arithmetic => config.frequency * obs.iter().sum::<f64>() / n,
        ReturnsMethod::Compounded => {
          let growth: f64 = obs.iter().map(|x| 1.0 + x).product();
          growth.powf(config.frequency / n) - 1.0
        }
      }
    })
    .collect();

  MeanReturns::new(assets.to_vec(), values)
}

fn sample_covariance(
  assets: &[String],
  returns: &[Vec<Option<f64>>],
  config: &EstimatorConfig,
) -> Result<CovarianceMatrix> {
  let n = assets.len();
  let mut cov = vec![vec![0.0; n]; n];

  match config.alignment {
    Alignment::Pairwise => {
      for i in 0..n {
        for j in i..n {
          let pairs: Vec<(f64, f64)> = returns[i]
            .iter()
            .zip(returns[j].iter())
            .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
            .collect();
          let c = pair_covariance(&pairs).ok_or_else(|| {
            PortfolioError::Estimation(format!(
              "{} and {} share fewer than 2 return observations",
              assets[i], assets[j]
            ))
          })?;
          cov[i][j] = config.frequency * c;
          cov[j][i] = cov[i][j];
        }
      }
    }
    Alignment::Complete => {
      let aligned = align_complete(returns);
      let periods = aligned.first().map(Vec::len).unwrap_or(0);
      if periods < 2 {
        return Err(PortfolioError::Estimation(format!(
          "only {periods} period(s) where every asset has a return"
        )));
      }
      for i in 0..n {
        for j in i..n {
          let pairs: Vec<(f64, f64)> = aligned[i]
            .iter()
            .copied()
            .zip(aligned[j].iter().copied())
            .collect();
          let c = pair_covariance(&pairs).unwrap_or(0.0);
          cov[i][j] = config.frequency * c;
          cov[j][i] = cov[i][j];
        }
      }
    }
  }

  if cov.iter().flatten().all(|v| v.abs() < f64::EPSILON) {
    return Err(PortfolioError::Estimation(
      "covariance matrix is zero, prices never move".to_string(),
    ));
  }

  if config.repair_psd {
    let spectrum = Spectrum::of(&cov);
    if !spectrum.is_psd() {
      warn!(
        min_eigenvalue = spectrum.min_value(),
        "sample covariance is not positive semi-definite, clipping negative eigenvalues"
      );
      cov = spectrum.clipped();
      for (i, row) in cov.iter_mut().enumerate() {
        row[i] = row[i].max(0.0);
      }
    }
  }

  CovarianceMatrix::new(assets.to_vec(), cov)
}

/// Unbiased covariance of paired observations, `None` below two pairs.
fn pair_covariance(pairs: &[(f64, f64)]) -> Option<f64> {
  if pairs.len() < 2 {
    return None;
  }
  let n = pairs.len() as f64;
  let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
  let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
  let acc: f64 = pairs.iter().map(|(x, y)| (x - mx) * (y - my)).sum();
  Some(acc / (n - 1.0))
}
