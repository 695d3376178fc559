//! # Discrete Allocation
//!
//! $$
//! \min_{\mathbf n\in\mathbb Z_{\ge 0}^k}\ \sum_i \left|w_iC-n_ip_i\right| + \left(C-\mathbf p^\top\mathbf n\right)
//! \quad\text{s.t.}\quad \mathbf p^\top\mathbf n\le C
//! $$
//!
//! Turns target weights into whole-share counts under a cash budget.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::data::LatestPrices;
use super::solver::ConicProblem;
use super::solver::SolveOutcome;
use super::solver::SolverSettings;
use super::types::DiscreteAllocation;
use super::types::Holding;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

/// Weights at or below this are treated as absent.
pub const MIN_WEIGHT: f64 = 1e-12;

/// Default node budget of the branch-and-bound search.
pub const DEFAULT_MAX_NODES: usize = 5_000;

const INTEGRALITY_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationMethod {
  /// Floor pass followed by largest-deficit top-up.
  #[default]
  Greedy,
  /// Branch-and-bound on the deviation-plus-cash linear program.
  IntegerProgram,
}

/// Allocate with the greedy method.
pub fn allocate(
  weights: &WeightVector,
  latest: &LatestPrices,
  capital: f64,
) -> Result<DiscreteAllocation> {
  allocate_with(
    weights,
    latest,
    capital,
    AllocationMethod::Greedy,
    DEFAULT_MAX_NODES,
  )
}

/// Allocate with an explicit method; `max_nodes` bounds the integer search.
pub fn allocate_with(
  weights: &WeightVector,
  latest: &LatestPrices,
  capital: f64,
  method: AllocationMethod,
  max_nodes: usize,
) -> Result<DiscreteAllocation> {
  if !capital.is_finite() || capital <= 0.0 {
    return Err(PortfolioError::invalid(
      "capital",
      format!("must be a positive amount, got {capital}"),
    ));
  }

  let book = Book::new(weights, latest, capital)?;
  if book.is_empty() || capital < book.min_price() {
    debug!(capital, "capital below the cheapest share, nothing to buy");
    return Ok(DiscreteAllocation {
      holdings: Vec::new(),
      leftover: capital,
    });
  }

  let shares = match method {
    AllocationMethod::Greedy => {
      let floor = book.floor_pass();
      book.top_up(floor)
    }
    AllocationMethod::IntegerProgram => {
      let seed = book.top_up(book.floor_pass());
      let search = branch_and_bound(&book, seed, max_nodes)?;
      if search.hit_limit {
        warn!(
          max_nodes,
          explored = search.explored,
          "allocation search hit its node limit, keeping best found"
        );
      }
      book.top_up(search.shares)
    }
  };

  Ok(book.finish(&shares))
}

/// Assets with positive target weight, their prices and cash targets.
struct Book {
  assets: Vec<String>,
  prices: Vec<f64>,
  targets: Vec<f64>,
  /// `floor(t_i / p_i)`.
  whole: Vec<f64>,
  /// `t_i - p_i floor(t_i / p_i)`, the cash left under the target.
  remainders: Vec<f64>,
  capital: f64,
  eps: f64,
}

impl Book {
  fn new(weights: &WeightVector, latest: &LatestPrices, capital: f64) -> Result<Self> {
    let mut assets = Vec::new();
    let mut prices = Vec::new();
    let mut targets = Vec::new();
    for (asset, w) in weights.iter() {
      if w <= MIN_WEIGHT {
        continue;
      }
      let price = latest
        .get(asset)
        .ok_or_else(|| PortfolioError::MissingPrice {
          asset: asset.to_string(),
        })?;
      assets.push(asset.to_string());
      prices.push(price);
      targets.push(w * capital);
    }
    let whole: Vec<f64> = targets
      .iter()
      .zip(prices.iter())
      .map(|(t, p)| (t / p).floor())
      .collect();
    let remainders = targets
      .iter()
      .zip(prices.iter().zip(whole.iter()))
      .map(|(t, (p, a))| (t - p * a).max(0.0))
      .collect();
    Ok(Self {
      assets,
      prices,
      targets,
      whole,
      remainders,
      capital,
      eps: 1e-9 * capital.max(1.0),
    })
  }

  fn is_empty(&self) -> bool {
    self.assets.is_empty()
  }

  fn min_price(&self) -> f64 {
    self.prices.iter().copied().fold(f64::INFINITY, f64::min)
  }

  fn spent(&self, shares: &[u64]) -> f64 {
    shares
      .iter()
      .zip(self.prices.iter())
      .map(|(n, p)| *n as f64 * p)
      .sum()
  }

  /// Deviation-plus-cash objective.
  fn objective(&self, shares: &[u64]) -> f64 {
    let deviation: f64 = shares
      .iter()
      .zip(self.prices.iter().zip(self.targets.iter()))
      .map(|(n, (p, t))| (t - *n as f64 * p).abs())
      .sum();
    deviation + (self.capital - self.spent(shares))
  }

  /// Whole shares under each target, largest weight first.
  fn floor_pass(&self) -> Vec<u64> {
    let mut order: Vec<usize> = (0..self.assets.len()).collect();
    order.sort_by(|&a, &b| self.targets[b].total_cmp(&self.targets[a]));

    let mut shares = vec![0_u64; self.assets.len()];
    let mut remaining = self.capital;
    for i in order {
      let wanted = ((self.targets[i] + self.eps) / self.prices[i]).floor();
      let affordable = ((remaining + self.eps) / self.prices[i]).floor();
      let n = wanted.min(affordable).max(0.0);
      shares[i] = n as u64;
      remaining -= n * self.prices[i];
    }
    shares
  }

  /// Buy one share at a time of the affordable asset furthest below its
  /// target until no share fits in the remaining cash.
  fn top_up(&self, mut shares: Vec<u64>) -> Vec<u64> {
    let mut remaining = self.capital - self.spent(&shares);
    loop {
      let pick = (0..self.assets.len())
        .filter(|&i| self.prices[i] <= remaining + self.eps)
        .map(|i| (i, self.targets[i] - shares[i] as f64 * self.prices[i]))
        .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
          Some((_, bd)) if bd >= d => best,
          _ => Some((i, d)),
        });
      match pick {
        Some((i, _)) => {
          shares[i] += 1;
          remaining -= self.prices[i];
        }
        None => break,
      }
    }
    shares
  }

  fn finish(&self, shares: &[u64]) -> DiscreteAllocation {
    let holdings = self
      .assets
      .iter()
      .zip(shares.iter())
      .filter(|(_, n)| **n > 0)
      .map(|(asset, n)| Holding {
        asset: asset.clone(),
        shares: *n,
      })
      .collect();
    DiscreteAllocation {
      holdings,
      leftover: (self.capital - self.spent(shares)).max(0.0),
    }
  }
}

/// Per-variable share bounds of a search node.
#[derive(Clone, Debug)]
struct Node {
  lower: Vec<f64>,
  upper: Vec<Option<f64>>,
}

/// Open node keyed by its parent's relaxation bound, lowest first.
struct Pending {
  bound: f64,
  node: Node,
}

impl PartialEq for Pending {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Pending {
  fn cmp(&self, other: &Self) -> Ordering {
    other.bound.total_cmp(&self.bound)
  }
}

/// Result of the integer search.
#[derive(Clone, Debug)]
struct Search {
  shares: Vec<u64>,
  explored: usize,
  hit_limit: bool,
}

/// Best-first branch-and-bound over LP relaxations with `x = [n, u]`.
///
/// Every relaxation is also rounded down and topped up into a candidate.
fn branch_and_bound(book: &Book, incumbent: Vec<u64>, max_nodes: usize) -> Result<Search> {
  let k = book.assets.len();
  let settings = SolverSettings::default();
  let mut best_obj = book.objective(&incumbent);
  let mut best = incumbent;

  // more than ceil(t_i / p_i) shares never lowers the objective
  let root = Node {
    lower: vec![0.0; k],
    upper: (0..k)
      .map(|i| Some(book.whole[i] + if book.remainders[i] > 0.0 { 1.0 } else { 0.0 }))
      .collect(),
  };
  let mut open = BinaryHeap::new();
  open.push(Pending {
    bound: f64::NEG_INFINITY,
    node: root,
  });
  let mut explored = 0;
  let mut hit_limit = false;

  while let Some(Pending { bound, node }) = open.pop() {
    if bound >= best_obj - book.eps {
      // every remaining node has a bound at least this large
      break;
    }
    if explored >= max_nodes {
      hit_limit = true;
      break;
    }
    explored += 1;

    let (x, bound) = match relaxation(book, &node).solve(&settings)? {
      SolveOutcome::Optimal { x, objective } => (x, objective + book.capital),
      SolveOutcome::Infeasible => continue,
    };
    if bound >= best_obj - book.eps {
      continue;
    }

    if let Some(shares) = round_relaxation(book, &node, &x[..k]) {
      let obj = book.objective(&shares);
      if obj < best_obj - book.eps {
        best_obj = obj;
        best = shares;
      }
    }

    let fractional = (0..k)
      .map(|i| (i, x[i] - x[i].floor()))
      .filter(|(_, f)| *f > INTEGRALITY_TOLERANCE && *f < 1.0 - INTEGRALITY_TOLERANCE)
      .max_by(|a, b| (0.5 - (a.1 - 0.5).abs()).total_cmp(&(0.5 - (b.1 - 0.5).abs())));

    match fractional {
      None => {
        let shares: Vec<u64> = x[..k].iter().map(|v| v.round().max(0.0) as u64).collect();
        if book.spent(&shares) <= book.capital + book.eps {
          let obj = book.objective(&shares);
          if obj < best_obj - book.eps {
            best_obj = obj;
            best = shares;
          }
        }
      }
      Some((i, _)) => {
        let mut down = node.clone();
        down.upper[i] = Some(x[i].floor());
        let mut up = node;
        up.lower[i] = x[i].ceil();
        open.push(Pending { bound, node: up });
        open.push(Pending { bound, node: down });
      }
    }
  }

  debug!(explored, objective = best_obj, "integer allocation search finished");
  Ok(Search {
    shares: best,
    explored,
    hit_limit,
  })
}

/// Floor a relaxed solution inside the node's bounds and top it up, or `None`
/// when the floored counts already overspend.
fn round_relaxation(book: &Book, node: &Node, relaxed: &[f64]) -> Option<Vec<u64>> {
  let shares: Vec<u64> = relaxed
    .iter()
    .zip(node.lower.iter())
    .map(|(x, lo)| (x + INTEGRALITY_TOLERANCE).floor().max(*lo).max(0.0) as u64)
    .collect();
  if book.spent(&shares) > book.capital + book.eps {
    return None;
  }
  Some(book.top_up(shares))
}

/// LP relaxation of a node; the objective omits the constant `C`.
///
/// Besides `u_i >= |t_i - p_i n_i|`, each deviation carries the chord through
/// its values at `a_i = floor(t_i / p_i)` and `a_i + 1`. The chord holds at
/// every whole share count, and with it the relaxation of each asset is the
/// convex hull of its integer points.
fn relaxation(book: &Book, node: &Node) -> ConicProblem {
  let k = book.assets.len();
  let mut q = vec![0.0; 2 * k];
  for i in 0..k {
    q[i] = -book.prices[i];
    q[k + i] = 1.0;
  }

  let mut problem = ConicProblem::new(2 * k).linear(q);

  let mut budget = vec![0.0; 2 * k];
  budget[..k].copy_from_slice(&book.prices);
  problem = problem.at_most(budget, book.capital);

  for i in 0..k {
    let (p, t) = (book.prices[i], book.targets[i]);
    // u_i >= t_i - p_i n_i and u_i >= p_i n_i - t_i
    let mut below = vec![0.0; 2 * k];
    below[i] = -p;
    below[k + i] = -1.0;
    let mut above = vec![0.0; 2 * k];
    above[i] = p;
    above[k + i] = -1.0;
    problem = problem.at_most(below, -t).at_most(above, t);

    // u_i >= s_i + (p_i - 2 s_i)(n_i - a_i)
    let (a, r) = (book.whole[i], book.remainders[i]);
    let slope = p - 2.0 * r;
    let mut chord = vec![0.0; 2 * k];
    chord[i] = slope;
    chord[k + i] = -1.0;
    problem = problem.at_most(chord, slope * a - r);

    let mut lower = vec![0.0; 2 * k];
    lower[i] = -1.0;
    problem = problem.at_most(lower, -node.lower[i]);
    if let Some(hi) = node.upper[i] {
      let mut upper = vec![0.0; 2 * k];
      upper[i] = 1.0;
      problem = problem.at_most(upper, hi);
    }
  }

  problem
}
