//! # Portfolio Data
//!
//! $$
//! r_t = \frac{P_t}{P_{t-1}} - 1
//! $$
//!
//! Price containers and return preprocessing.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::error::PortfolioError;
use crate::error::Result;

/// Daily closing prices of several assets on a shared date index.
///
/// `closes[i][t]` is the close of asset `i` on `dates[t]`, `None` when the
/// market-data source had nothing for that day.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PriceSeries {
  dates: Vec<NaiveDate>,
  assets: Vec<String>,
  closes: Vec<Vec<Option<f64>>>,
}

impl PriceSeries {
  /// Build a price series, one column per asset.
  pub fn new(
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    closes: Vec<Vec<Option<f64>>>,
  ) -> Result<Self> {
    if assets.len() != closes.len() {
      return Err(PortfolioError::invalid(
        "prices",
        format!("{} assets but {} price columns", assets.len(), closes.len()),
      ));
    }
    if dates.windows(2).any(|w| w[0] >= w[1]) {
      return Err(PortfolioError::invalid(
        "prices",
        "dates must be strictly increasing",
      ));
    }
    for (i, asset) in assets.iter().enumerate() {
      if assets[..i].contains(asset) {
        return Err(PortfolioError::invalid(
          "prices",
          format!("duplicate asset {asset}"),
        ));
      }
      let col = &closes[i];
      if col.len() != dates.len() {
        return Err(PortfolioError::invalid(
          "prices",
          format!(
            "{asset} has {} prices for {} dates",
            col.len(),
            dates.len()
          ),
        ));
      }
      if let Some(p) = col.iter().flatten().find(|p| !p.is_finite() || **p <= 0.0) {
        return Err(PortfolioError::invalid(
          "prices",
          format!("{asset} has invalid close {p}"),
        ));
      }
    }

    Ok(Self {
      dates,
      assets,
      closes,
    })
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  /// Number of dates.
  pub fn len(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  /// Price column of one asset.
  pub fn closes(&self, asset: &str) -> Option<&[Option<f64>]> {
    self
      .assets
      .iter()
      .position(|a| a == asset)
      .map(|i| self.closes[i].as_slice())
  }

  pub(crate) fn columns(&self) -> &[Vec<Option<f64>>] {
    &self.closes
  }

  /// Remove assets that have no data at all, returning the cleaned series and
  /// the identifiers that were dropped.
  pub fn drop_empty(&self) -> (PriceSeries, Vec<String>) {
    let mut assets = Vec::with_capacity(self.assets.len());
    let mut closes = Vec::with_capacity(self.assets.len());
    let mut dropped = Vec::new();

    for (asset, col) in self.assets.iter().zip(self.closes.iter()) {
      if col.iter().all(Option::is_none) {
        warn!(asset = %asset, "dropping asset without price data");
        dropped.push(asset.clone());
      } else {
        assets.push(asset.clone());
        closes.push(col.clone());
      }
    }

    let cleaned = PriceSeries {
      dates: self.dates.clone(),
      assets,
      closes,
    };
    (cleaned, dropped)
  }

  /// Restrict to dates within `[start, end]`; open bounds keep everything.
  pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> PriceSeries {
    let keep: Vec<usize> = self
      .dates
      .iter()
      .enumerate()
      .filter(|(_, d)| start.map_or(true, |s| **d >= s) && end.map_or(true, |e| **d <= e))
      .map(|(t, _)| t)
      .collect();

    PriceSeries {
      dates: keep.iter().map(|&t| self.dates[t]).collect(),
      assets: self.assets.clone(),
      closes: self
        .closes
        .iter()
        .map(|col| keep.iter().map(|&t| col[t]).collect())
        .collect(),
    }
  }

  /// Project onto `tickers`, in that order. Tickers unknown to the series
  /// become all-missing columns, to be removed by [`PriceSeries::drop_empty`].
  /// Repeated tickers are kept once.
  pub fn select(&self, tickers: &[String]) -> PriceSeries {
    let mut assets: Vec<String> = Vec::with_capacity(tickers.len());
    for t in tickers {
      if !assets.contains(t) {
        assets.push(t.clone());
      }
    }
    let closes = assets
      .iter()
      .map(|t| match self.closes(t) {
        Some(col) => col.to_vec(),
        None => vec![None; self.dates.len()],
      })
      .collect();

    PriceSeries {
      dates: self.dates.clone(),
      assets,
      closes,
    }
  }

  /// Most recent close of every asset that has one.
  pub fn latest_prices(&self) -> LatestPrices {
    let mut assets = Vec::with_capacity(self.assets.len());
    let mut prices = Vec::with_capacity(self.assets.len());
    for (asset, col) in self.assets.iter().zip(self.closes.iter()) {
      if let Some(p) = col.iter().rev().flatten().next() {
        assets.push(asset.clone());
        prices.push(*p);
      }
    }
    LatestPrices { assets, prices }
  }
}

/// Most recent close per asset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LatestPrices {
  assets: Vec<String>,
  prices: Vec<f64>,
}

impl LatestPrices {
  /// Build a snapshot; every price must be finite and positive.
  pub fn new(assets: Vec<String>, prices: Vec<f64>) -> Result<Self> {
    if assets.len() != prices.len() {
      return Err(PortfolioError::invalid(
        "latest_prices",
        format!("{} assets but {} prices", assets.len(), prices.len()),
      ));
    }
    if let Some(i) = prices.iter().position(|p| !p.is_finite() || *p <= 0.0) {
      return Err(PortfolioError::invalid(
        "latest_prices",
        format!("{} has invalid price {}", assets[i], prices[i]),
      ));
    }
    Ok(Self { assets, prices })
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn prices(&self) -> &[f64] {
    &self.prices
  }

  pub fn get(&self, asset: &str) -> Option<f64> {
    self
      .assets
      .iter()
      .position(|a| a == asset)
      .map(|i| self.prices[i])
  }

  pub fn len(&self) -> usize {
    self.prices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.prices.is_empty()
  }
}

/// Simple returns of a forward-filled close column.
///
/// The output has one entry per date after the first; an entry is `None`
/// until the asset has two observations to compare.
pub fn simple_returns(closes: &[Option<f64>]) -> Vec<Option<f64>> {
  let mut out = Vec::with_capacity(closes.len().saturating_sub(1));
  let mut last: Option<f64> = closes.first().copied().flatten();
  for close in closes.iter().skip(1) {
    let current = close.or(last);
    out.push(match (last, current) {
      (Some(prev), Some(cur)) => Some(cur / prev - 1.0),
      _ => None,
    });
    last = current;
  }
  out
}

/// Keep only the periods where every asset has a return.
pub fn align_complete(returns: &[Vec<Option<f64>>]) -> Vec<Vec<f64>> {
  let n_periods = returns.iter().map(Vec::len).min().unwrap_or(0);
  let keep: Vec<usize> = (0..n_periods)
    .filter(|&t| returns.iter().all(|r| r[t].is_some()))
    .collect();

  returns
    .iter()
    .map(|r| keep.iter().filter_map(|&t| r[t]).collect())
    .collect()
}
