//! # frontier-rs
//!
//! $$
//! \max_{\mathbf w\in\Delta}\ \mu^\top\mathbf w \quad\text{s.t.}\quad \sqrt{\mathbf w^\top\Sigma\mathbf w}\le\sigma^\*
//! $$
//!
//! Efficient-frontier portfolio optimization with whole-share allocation.

pub mod error;
pub mod portfolio;

pub use error::PortfolioError;
pub use error::Result;
