//! # Portfolio Engine
//!
//! $$
//! P \xrightarrow{\text{estimate}} (\mu,\Sigma) \xrightarrow{\text{optimize}} \mathbf w^\*
//! \xrightarrow{\text{allocate}} (\mathbf n, C-\mathbf p^\top\mathbf n)
//! $$
//!
//! High-level orchestration of estimation, optimization, evaluation and
//! allocation.

use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use super::allocation::AllocationMethod;
use super::allocation::DEFAULT_MAX_NODES;
use super::allocation::allocate_with;
use super::data::LatestPrices;
use super::data::PriceSeries;
use super::estimators::Alignment;
use super::estimators::EstimatorConfig;
use super::estimators::ReturnsMethod;
use super::estimators::TRADING_DAYS;
use super::estimators::estimate_with;
use super::market_data::MarketData;
use super::optimizers::EfficientFrontier;
use super::performance::evaluate;
use super::solver::SolverSettings;
use super::types::DiscreteAllocation;
use super::types::FrontierPoint;
use super::types::MeanReturns;
use super::types::Performance;
use super::types::WEIGHT_SUM_TOLERANCE;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioEngineConfig {
  /// Risk-free rate used in Sharpe computations.
  pub risk_free_rate: f64,
  /// Volatility ceiling of the risk-constrained portfolio; `None` leaves it
  /// unconstrained, which yields the highest-return portfolio.
  pub max_volatility: Option<f64>,
  /// Only `true` is supported.
  pub long_only: bool,
  /// Tolerance on `sum(w) = 1` for solved weights.
  pub weight_sum_tolerance: f64,
  /// Return periods per year.
  pub frequency: f64,
  pub returns_method: ReturnsMethod,
  pub alignment: Alignment,
  /// Clip negative eigenvalues of an indefinite sample covariance.
  pub repair_psd: bool,
  /// Points on the reported frontier curve, zero to skip it.
  pub frontier_points: usize,
  pub allocation_method: AllocationMethod,
  /// Node budget of the integer allocation search.
  pub max_branch_nodes: usize,
  pub solver: SolverSettings,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.0434,
      max_volatility: Some(0.5),
      long_only: true,
      weight_sum_tolerance: WEIGHT_SUM_TOLERANCE,
      frequency: TRADING_DAYS,
      returns_method: ReturnsMethod::Arithmetic,
      alignment: Alignment::Pairwise,
      repair_psd: true,
      frontier_points: 20,
      allocation_method: AllocationMethod::Greedy,
      max_branch_nodes: DEFAULT_MAX_NODES,
      solver: SolverSettings::default(),
    }
  }
}

impl PortfolioEngineConfig {
  /// Estimator settings carried by this configuration.
  pub fn estimator(&self) -> EstimatorConfig {
    EstimatorConfig {
      frequency: self.frequency,
      returns_method: self.returns_method,
      alignment: self.alignment,
      repair_psd: self.repair_psd,
    }
  }

  /// Reject settings the pipeline cannot honour.
  pub fn validate(&self) -> Result<()> {
    if !self.long_only {
      return Err(PortfolioError::invalid(
        "long_only",
        "only long-only portfolios are supported",
      ));
    }
    if !self.risk_free_rate.is_finite() {
      return Err(PortfolioError::invalid("risk_free_rate", "must be finite"));
    }
    if let Some(v) = self.max_volatility {
      if !(0.0..=1.0).contains(&v) {
        return Err(PortfolioError::invalid(
          "max_volatility",
          format!("must lie in [0, 1], got {v}"),
        ));
      }
    }
    if !(self.weight_sum_tolerance > 0.0 && self.weight_sum_tolerance < 1.0) {
      return Err(PortfolioError::invalid(
        "weight_sum_tolerance",
        format!("must lie in (0, 1), got {}", self.weight_sum_tolerance),
      ));
    }
    Ok(())
  }
}

/// Inputs of a run against a [`MarketData`] source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRequest {
  pub tickers: Vec<String>,
  pub start: Option<NaiveDate>,
  pub end: Option<NaiveDate>,
  pub capital: f64,
}

/// Weights of one optimized portfolio with its performance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptimizedPortfolio {
  pub weights: WeightVector,
  pub performance: Performance,
}

/// Everything one pipeline run produces.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortfolioReport {
  /// Assets that had price data and entered the optimization.
  pub assets: Vec<String>,
  /// Requested assets without any price data.
  pub dropped: Vec<String>,
  pub mean_returns: MeanReturns,
  /// Volatility ceiling actually applied.
  pub max_volatility: f64,
  pub risk_free_rate: f64,
  pub risk_constrained: OptimizedPortfolio,
  pub max_sharpe: OptimizedPortfolio,
  /// Whole-share allocation of the risk-constrained weights.
  pub allocation: DiscreteAllocation,
  pub frontier: Vec<FrontierPoint>,
}

/// Single entry point for the estimate / optimize / allocate pipeline.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Fetch prices from `source` and run the pipeline.
  pub fn run_request(
    &self,
    source: &dyn MarketData,
    request: &PortfolioRequest,
  ) -> Result<PortfolioReport> {
    if request.tickers.is_empty() {
      return Err(PortfolioError::invalid("tickers", "at least one ticker is required"));
    }
    let prices = source.fetch_closing_prices(&request.tickers, request.start, request.end)?;
    let latest = source.fetch_latest_prices(&request.tickers)?;
    self.run_with_latest(&prices, &latest, request.capital)
  }

  /// Run the pipeline, allocating at the last close of each asset.
  pub fn run(&self, prices: &PriceSeries, capital: f64) -> Result<PortfolioReport> {
    self.run_with_latest(prices, &prices.latest_prices(), capital)
  }

  /// Run the pipeline, allocating at `latest` prices.
  pub fn run_with_latest(
    &self,
    prices: &PriceSeries,
    latest: &LatestPrices,
    capital: f64,
  ) -> Result<PortfolioReport> {
    let config = &self.config;
    config.validate()?;
    if !capital.is_finite() || capital <= 0.0 {
      return Err(PortfolioError::invalid(
        "capital",
        format!("must be a positive amount, got {capital}"),
      ));
    }

    let (prices, dropped) = prices.drop_empty();
    info!(
      assets = prices.assets().len(),
      dropped = dropped.len(),
      dates = prices.len(),
      "estimating returns and covariance"
    );
    let (mu, sigma) = estimate_with(&prices, &config.estimator())?;

    let ef = EfficientFrontier::new(&mu, &sigma)?
      .with_settings(config.solver)
      .with_weight_sum_tolerance(config.weight_sum_tolerance);

    let max_volatility = match config.max_volatility {
      Some(v) => v,
      None => sigma.volatilities().into_iter().fold(0.0, f64::max),
    };
    let risk_weights = ef.efficient_risk(max_volatility)?;
    let risk_perf = evaluate(&risk_weights, &mu, &sigma, config.risk_free_rate)?;
    info!(
      max_volatility,
      expected_return = risk_perf.expected_return,
      volatility = risk_perf.volatility,
      sharpe = risk_perf.sharpe_ratio,
      "risk-constrained portfolio"
    );

    let sharpe_weights = ef.max_sharpe(config.risk_free_rate)?;
    let sharpe_perf = evaluate(&sharpe_weights, &mu, &sigma, config.risk_free_rate)?;
    info!(
      expected_return = sharpe_perf.expected_return,
      volatility = sharpe_perf.volatility,
      sharpe = sharpe_perf.sharpe_ratio,
      "max-Sharpe portfolio"
    );

    let allocation = allocate_with(
      &risk_weights,
      latest,
      capital,
      config.allocation_method,
      config.max_branch_nodes,
    )?;
    info!(
      method = ?config.allocation_method,
      positions = allocation.holdings.len(),
      leftover = allocation.leftover,
      "allocated capital"
    );

    let frontier = if config.frontier_points > 0 {
      ef.frontier(config.frontier_points)?
    } else {
      Vec::new()
    };

    Ok(PortfolioReport {
      assets: prices.assets().to_vec(),
      dropped,
      mean_returns: mu.clone(),
      max_volatility,
      risk_free_rate: config.risk_free_rate,
      risk_constrained: OptimizedPortfolio {
        weights: risk_weights,
        performance: risk_perf,
      },
      max_sharpe: OptimizedPortfolio {
        weights: sharpe_weights,
        performance: sharpe_perf,
      },
      allocation,
      frontier,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use tracing_test::traced_test;

  use super::*;
  use crate::portfolio::market_data::CsvMarketData;

  /// Deterministic trending prices with asset-specific oscillation.
  fn synthetic_prices(days: usize) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let dates = (0..days).map(|t| start + Duration::days(t as i64)).collect();
    let params = [
      ("AAA", 100.0, 0.0012, 0.012, 0.9),
      ("BBB", 40.0, 0.0006, 0.006, 1.7),
      ("CCC", 250.0, 0.0003, 0.004, 2.3),
    ];
    let mut assets = Vec::new();
    let mut closes = Vec::new();
    for (name, p0, drift, amp, freq) in params {
      let mut p = p0;
      let mut col = Vec::with_capacity(days);
      for t in 0..days {
        if t > 0 {
          p *= 1.0 + drift + amp * (t as f64 * freq).sin();
        }
        col.push(Some(p));
      }
      assets.push(name.to_string());
      closes.push(col);
    }
    assets.push("EMPTY".to_string());
    closes.push(vec![None; days]);
    PriceSeries::new(dates, assets, closes).unwrap()
  }

  #[test]
  fn default_config_matches_documented_values() {
    let config = PortfolioEngineConfig::default();
    assert_eq!(config.risk_free_rate, 0.0434);
    assert_eq!(config.max_volatility, Some(0.5));
    assert_eq!(config.allocation_method, AllocationMethod::Greedy);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn config_deserializes_partial_json() {
    let config: PortfolioEngineConfig =
      serde_json::from_str(r#"{"risk_free_rate": 0.01, "allocation_method": "integer-program"}"#)
        .unwrap();
    assert_eq!(config.risk_free_rate, 0.01);
    assert_eq!(config.allocation_method, AllocationMethod::IntegerProgram);
    assert_eq!(config.frontier_points, 20);
  }

  #[test]
  fn short_selling_is_rejected() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      long_only: false,
      ..Default::default()
    });
    assert!(matches!(
      engine.run(&synthetic_prices(60), 1000.0),
      Err(PortfolioError::InvalidInput { .. })
    ));
  }

  #[test]
  #[traced_test]
  fn engine_runs_full_pipeline() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      risk_free_rate: 0.01,
      frontier_points: 5,
      ..Default::default()
    });
    let prices = synthetic_prices(120);
    let report = engine.run(&prices, 10_000.0).unwrap();
    let latest = prices.latest_prices();
    let held_min = report
      .risk_constrained
      .weights
      .iter()
      .filter(|(_, w)| *w > 1e-12)
      .filter_map(|(a, _)| latest.get(a))
      .fold(f64::INFINITY, f64::min);

    assert_eq!(report.dropped, vec!["EMPTY".to_string()]);
    assert_eq!(report.assets.len(), 3);
    assert!(report.risk_constrained.performance.volatility <= 0.5 + 1e-6);
    assert!(
      report.max_sharpe.performance.sharpe_ratio
        >= report.risk_constrained.performance.sharpe_ratio - 1e-6
    );
    assert!(report.allocation.leftover >= 0.0);
    assert!(report.allocation.leftover < held_min);
    assert_eq!(report.frontier.len(), 5);
    assert!(logs_contain("dropping asset without price data"));
    assert!(logs_contain("allocated capital"));
  }

  #[test]
  fn tight_ceiling_reports_minimum() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      max_volatility: Some(0.0),
      frontier_points: 0,
      ..Default::default()
    });
    match engine.run(&synthetic_prices(120), 10_000.0) {
      Err(PortfolioError::InfeasibleRiskTarget { requested, minimum }) => {
        assert_eq!(requested, 0.0);
        assert!(minimum > 0.0);
      }
      other => panic!("expected infeasible target, got {other:?}"),
    }
  }

  #[test]
  fn runs_against_market_data_source() {
    let mut csv = String::from("date,AAA,BBB\n");
    let series = synthetic_prices(80);
    for (t, d) in series.dates().iter().enumerate() {
      let a = series.closes("AAA").unwrap()[t].unwrap();
      let b = series.closes("BBB").unwrap()[t].unwrap();
      csv.push_str(&format!("{d},{a},{b}\n"));
    }
    let source = CsvMarketData::from_reader(csv.as_bytes()).unwrap();
    let request = PortfolioRequest {
      tickers: vec!["AAA".into(), "BBB".into(), "NOPE".into()],
      start: None,
      end: None,
      capital: 5_000.0,
    };
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      risk_free_rate: 0.0,
      frontier_points: 0,
      ..Default::default()
    });
    let report = engine.run_request(&source, &request).unwrap();
    assert_eq!(report.dropped, vec!["NOPE".to_string()]);
    assert!(report.frontier.is_empty());
    let total: f64 = report.risk_constrained.weights.weights().iter().sum();
    assert!((total - 1.0).abs() <= 1e-6);
  }

  #[test]
  #[traced_test]
  fn unknown_tickers_are_an_estimation_error() {
    let csv = "date,AAA,BBB\n2024-01-02,10,20\n2024-01-03,10.5,19.5\n2024-01-04,10.2,20.4\n";
    let source = CsvMarketData::from_reader(csv.as_bytes()).unwrap();
    let request = PortfolioRequest {
      tickers: vec!["NOPE".into(), "GONE".into()],
      start: None,
      end: None,
      capital: 5_000.0,
    };
    let engine = PortfolioEngine::new(PortfolioEngineConfig::default());
    match engine.run_request(&source, &request) {
      Err(PortfolioError::Estimation(msg)) => assert!(msg.contains("no assets"), "{msg}"),
      other => panic!("expected estimation error, got {other:?}"),
    }
    assert!(logs_contain("dropping asset without price data"));
  }
}
