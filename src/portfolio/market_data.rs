//! # Market Data
//!
//! $$
//! (\text{tickers}, t_0, t_1) \mapsto \{P_{i,t}\}_{t_0\le t\le t_1}
//! $$
//!
//! Source of closing prices. [`CsvMarketData`] reads a wide file with a
//! `date` column followed by one column per ticker; empty cells are missing
//! closes.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::debug;

use super::data::LatestPrices;
use super::data::PriceSeries;
use crate::error::PortfolioError;
use crate::error::Result;

/// Provider of historical and latest closing prices.
pub trait MarketData {
  /// Daily closes of `tickers` between `start` and `end`, inclusive.
  /// Tickers the source does not know come back as all-missing columns.
  fn fetch_closing_prices(
    &self,
    tickers: &[String],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
  ) -> Result<PriceSeries>;

  /// Most recent close of each ticker that has one.
  fn fetch_latest_prices(&self, tickers: &[String]) -> Result<LatestPrices>;
}

/// Prices loaded once from a wide CSV file.
#[derive(Clone, Debug)]
pub struct CsvMarketData {
  series: PriceSeries,
}

impl CsvMarketData {
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let file = File::open(&path)
      .map_err(|e| PortfolioError::MarketData(format!("cannot open {}: {e}", path.display())))?;
    let source = Self::from_reader(file)?;
    debug!(
      path = %path.display(),
      assets = source.series.assets().len(),
      dates = source.series.len(),
      "loaded price file"
    );
    Ok(source)
  }

  pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
    let mut reader = csv::ReaderBuilder::new()
      .trim(csv::Trim::All)
      .from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
      return Err(PortfolioError::MarketData("price file has no header".to_string()));
    }
    let assets: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut rows: Vec<(NaiveDate, Vec<Option<f64>>)> = Vec::new();
    for (idx, record) in reader.records().enumerate() {
      let record = record?;
      let line = idx + 2;
      let date = parse_date(record.get(0).unwrap_or_default())
        .ok_or_else(|| PortfolioError::MarketData(format!("line {line}: invalid date")))?;

      let mut closes = Vec::with_capacity(assets.len());
      for (col, asset) in assets.iter().enumerate() {
        let cell = record.get(col + 1).unwrap_or_default();
        if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
          closes.push(None);
          continue;
        }
        let price = cell.parse::<f64>().map_err(|e| {
          PortfolioError::MarketData(format!("line {line}: {asset} close {cell:?}: {e}"))
        })?;
        closes.push(Some(price));
      }
      rows.push((date, closes));
    }

    rows.sort_by_key(|(d, _)| *d);
    if let Some(w) = rows.windows(2).find(|w| w[0].0 == w[1].0) {
      return Err(PortfolioError::MarketData(format!(
        "date {} appears more than once",
        w[0].0
      )));
    }

    let dates = rows.iter().map(|(d, _)| *d).collect();
    let columns = (0..assets.len())
      .map(|col| rows.iter().map(|(_, r)| r[col]).collect())
      .collect();
    let series = PriceSeries::new(dates, assets, columns)
      .map_err(|e| PortfolioError::MarketData(e.to_string()))?;
    Ok(Self { series })
  }

  /// Full contents of the file.
  pub fn series(&self) -> &PriceSeries {
    &self.series
  }
}

impl MarketData for CsvMarketData {
  fn fetch_closing_prices(
    &self,
    tickers: &[String],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
  ) -> Result<PriceSeries> {
    if let (Some(s), Some(e)) = (start, end) {
      if s > e {
        return Err(PortfolioError::invalid(
          "date_range",
          format!("start {s} is after end {e}"),
        ));
      }
    }
    Ok(self.series.select(tickers).between(start, end))
  }

  fn fetch_latest_prices(&self, tickers: &[String]) -> Result<LatestPrices> {
    Ok(self.series.select(tickers).latest_prices())
  }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .ok()
    .or_else(|| raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}
