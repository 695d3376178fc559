use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use frontier_rs::portfolio::AllocationMethod;
use frontier_rs::portfolio::CsvMarketData;
use frontier_rs::portfolio::OptimizedPortfolio;
use frontier_rs::portfolio::PortfolioEngine;
use frontier_rs::portfolio::PortfolioEngineConfig;
use frontier_rs::portfolio::PortfolioReport;
use frontier_rs::portfolio::PortfolioRequest;
use prettytable::Table;
use prettytable::row;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "frontier")]
#[command(about = "Efficient-frontier portfolio optimization and share allocation")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Optimize a portfolio from a price file and allocate capital
  Run(RunArgs),
  /// Print the version
  Version,
}

#[derive(clap::Args)]
struct RunArgs {
  /// Wide CSV of closing prices: `date,TICKER1,TICKER2,...`
  #[arg(long)]
  prices: PathBuf,

  /// Tickers to include, comma separated (default: every column)
  #[arg(long, value_delimiter = ',')]
  tickers: Vec<String>,

  /// First date to use, YYYY-MM-DD
  #[arg(long)]
  start: Option<NaiveDate>,

  /// Last date to use, YYYY-MM-DD
  #[arg(long)]
  end: Option<NaiveDate>,

  /// Cash to invest
  #[arg(long)]
  capital: f64,

  /// Maximum annualized volatility, between 0 and 1
  #[arg(long)]
  max_risk: Option<f64>,

  /// Annual risk-free rate
  #[arg(long)]
  risk_free: Option<f64>,

  /// Share allocation algorithm
  #[arg(long, value_enum)]
  method: Option<Method>,

  /// Number of efficient-frontier points to report
  #[arg(long)]
  frontier_points: Option<usize>,

  /// JSON file with engine settings; flags override it
  #[arg(long)]
  config: Option<PathBuf>,

  #[arg(long, value_enum, default_value_t = Output::Table)]
  output: Output,
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
  Greedy,
  Lp,
}

impl From<Method> for AllocationMethod {
  fn from(m: Method) -> Self {
    match m {
      Method::Greedy => AllocationMethod::Greedy,
      Method::Lp => AllocationMethod::IntegerProgram,
    }
  }
}

#[derive(Clone, Copy, ValueEnum)]
enum Output {
  Table,
  Json,
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();
  match cli.command {
    Commands::Run(args) => run(args),
    Commands::Version => {
      println!("frontier {}", env!("CARGO_PKG_VERSION"));
      Ok(())
    }
  }
}

fn load_config(args: &RunArgs) -> anyhow::Result<PortfolioEngineConfig> {
  let mut config = match &args.config {
    Some(path) => {
      let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
      serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
    }
    None => PortfolioEngineConfig::default(),
  };

  if let Some(v) = args.max_risk {
    config.max_volatility = Some(v);
  }
  if let Some(r) = args.risk_free {
    config.risk_free_rate = r;
  }
  if let Some(m) = args.method {
    config.allocation_method = m.into();
  }
  if let Some(p) = args.frontier_points {
    config.frontier_points = p;
  }
  Ok(config)
}

fn run(args: RunArgs) -> anyhow::Result<()> {
  let config = load_config(&args)?;
  let source = CsvMarketData::open(&args.prices)
    .with_context(|| format!("loading prices from {}", args.prices.display()))?;

  let tickers = if args.tickers.is_empty() {
    source.series().assets().to_vec()
  } else {
    args.tickers.clone()
  };
  let request = PortfolioRequest {
    tickers,
    start: args.start,
    end: args.end,
    capital: args.capital,
  };

  let engine = PortfolioEngine::new(config);
  let report = engine
    .run_request(&source, &request)
    .context("portfolio optimization failed")?;

  match args.output {
    Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    Output::Table => print_report(&report),
  }
  Ok(())
}

fn portfolio_table(p: &OptimizedPortfolio) -> Table {
  let mut table = Table::new();
  table.set_titles(row!["asset", "weight"]);
  for (asset, w) in p.weights.iter() {
    if w > 0.0 {
      table.add_row(row![asset, r->format!("{:.2}%", w * 100.0)]);
    }
  }
  table.add_row(row![
    "expected return",
    r->format!("{:.2}%", p.performance.expected_return * 100.0)
  ]);
  table.add_row(row![
    "volatility",
    r->format!("{:.2}%", p.performance.volatility * 100.0)
  ]);
  table.add_row(row!["sharpe", r->format!("{:.3}", p.performance.sharpe_ratio)]);
  table
}

fn print_report(report: &PortfolioReport) {
  if !report.dropped.is_empty() {
    println!("no price data: {}", report.dropped.join(", "));
  }

  println!(
    "Risk-constrained portfolio (volatility <= {:.2}%)",
    report.max_volatility * 100.0
  );
  portfolio_table(&report.risk_constrained).printstd();

  println!(
    "Max-Sharpe portfolio (risk-free {:.2}%)",
    report.risk_free_rate * 100.0
  );
  portfolio_table(&report.max_sharpe).printstd();

  println!("Allocation");
  let mut alloc = Table::new();
  alloc.set_titles(row!["asset", "shares"]);
  for h in &report.allocation.holdings {
    alloc.add_row(row![h.asset, r->h.shares]);
  }
  alloc.add_row(row!["leftover", r->format!("{:.2}", report.allocation.leftover)]);
  alloc.printstd();

  if !report.frontier.is_empty() {
    println!("Efficient frontier");
    let mut curve = Table::new();
    curve.set_titles(row!["volatility", "return"]);
    for p in &report.frontier {
      curve.add_row(row![
        r->format!("{:.2}%", p.volatility * 100.0),
        r->format!("{:.2}%", p.expected_return * 100.0)
      ]);
    }
    curve.printstd();
  }
}
