//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Return/risk estimation, efficient-frontier optimization, performance
//! evaluation and discrete share allocation.

pub mod allocation;
pub mod data;
pub mod engine;
pub mod estimators;
pub mod linalg;
pub mod market_data;
pub mod optimizers;
pub mod performance;
pub mod solver;
pub mod types;

pub use allocation::AllocationMethod;
pub use allocation::allocate;
pub use allocation::allocate_with;
pub use data::LatestPrices;
pub use data::PriceSeries;
pub use engine::OptimizedPortfolio;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use engine::PortfolioReport;
pub use engine::PortfolioRequest;
pub use estimators::Alignment;
pub use estimators::EstimatorConfig;
pub use estimators::ReturnsMethod;
pub use estimators::estimate;
pub use estimators::estimate_with;
pub use linalg::is_positive_semidefinite;
pub use market_data::CsvMarketData;
pub use market_data::MarketData;
pub use optimizers::EfficientFrontier;
pub use optimizers::efficient_frontier;
pub use optimizers::solve_max_sharpe;
pub use optimizers::solve_min_volatility;
pub use optimizers::solve_risk_constrained;
pub use performance::evaluate;
pub use performance::evaluate_lenient;
pub use solver::SolverSettings;
pub use types::CovarianceMatrix;
pub use types::DiscreteAllocation;
pub use types::FrontierPoint;
pub use types::Holding;
pub use types::MeanReturns;
pub use types::Performance;
pub use types::WeightVector;
