//! # Conic Solver Bridge
//!
//! $$
//! \min_x \tfrac12 x^\top P x + q^\top x \quad\text{s.t.}\quad Ax + s = b,\ s\in\mathcal K
//! $$
//!
//! Dense problem builder on top of the Clarabel interior-point solver. Rows are
//! stacked in cone order: equalities, then inequalities, then second-order
//! cone blocks.

use clarabel::algebra::CscMatrix;
use clarabel::solver::DefaultSettingsBuilder;
use clarabel::solver::DefaultSolver;
use clarabel::solver::IPSolver;
use clarabel::solver::SolverStatus;
use clarabel::solver::SupportedConeT;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::error::PortfolioError;
use crate::error::Result;

/// Interior-point settings shared by every solve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
  pub max_iter: u32,
  /// Absolute/relative duality gap and feasibility tolerance.
  pub tolerance: f64,
}

impl Default for SolverSettings {
  fn default() -> Self {
    Self {
      max_iter: 200,
      tolerance: 1e-9,
    }
  }
}

/// Terminal state of a solve that did not hit a numerical failure.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SolveOutcome {
  Optimal { x: Vec<f64>, objective: f64 },
  Infeasible,
}

/// Quadratic / linear / second-order cone program over `n` variables.
#[derive(Clone, Debug)]
pub(crate) struct ConicProblem {
  n: usize,
  p: Vec<Vec<f64>>,
  q: Vec<f64>,
  eq_rows: Vec<Vec<f64>>,
  eq_rhs: Vec<f64>,
  le_rows: Vec<Vec<f64>>,
  le_rhs: Vec<f64>,
  soc_blocks: Vec<(f64, Vec<Vec<f64>>)>,
}

impl ConicProblem {
  pub fn new(n: usize) -> Self {
    Self {
      n,
      p: vec![vec![0.0; n]; n],
      q: vec![0.0; n],
      eq_rows: Vec::new(),
      eq_rhs: Vec::new(),
      le_rows: Vec::new(),
      le_rhs: Vec::new(),
      soc_blocks: Vec::new(),
    }
  }

  /// Objective `0.5 x' P x`, `P` given in full symmetric form on the
  /// leading block of variables.
  pub fn quadratic(mut self, p: &[Vec<f64>]) -> Self {
    for (i, row) in p.iter().enumerate() {
      for (j, v) in row.iter().enumerate() {
        self.p[i][j] = *v;
      }
    }
    self
  }

  /// Objective `q' x`.
  pub fn linear(mut self, q: Vec<f64>) -> Self {
    self.q = q;
    self
  }

  /// `a' x = rhs`.
  pub fn equal(mut self, a: Vec<f64>, rhs: f64) -> Self {
    self.eq_rows.push(a);
    self.eq_rhs.push(rhs);
    self
  }

  /// `a' x <= rhs`.
  pub fn at_most(mut self, a: Vec<f64>, rhs: f64) -> Self {
    self.le_rows.push(a);
    self.le_rhs.push(rhs);
    self
  }

  /// `x_i >= 0` for the first `count` variables.
  pub fn nonnegative(mut self, count: usize) -> Self {
    for i in 0..count {
      let mut row = vec![0.0; self.n];
      row[i] = -1.0;
      self.le_rows.push(row);
      self.le_rhs.push(0.0);
    }
    self
  }

  /// `|| G x ||_2 <= t`.
  pub fn norm_at_most(mut self, g: Vec<Vec<f64>>, t: f64) -> Self {
    self.soc_blocks.push((t, g));
    self
  }

  /// Run Clarabel on the assembled problem.
  pub fn solve(&self, settings: &SolverSettings) -> Result<SolveOutcome> {
    let n = self.n;
    if self.q.len() != n
      || self
        .eq_rows
        .iter()
        .chain(self.le_rows.iter())
        .any(|r| r.len() != n)
    {
      return Err(PortfolioError::Optimization(
        "constraint row length does not match variable count".to_string(),
      ));
    }

    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut b: Vec<f64> = Vec::new();
    let mut cones: Vec<SupportedConeT<f64>> = Vec::new();

    if !self.eq_rows.is_empty() {
      rows.extend(self.eq_rows.iter().cloned());
      b.extend(self.eq_rhs.iter().copied());
      cones.push(SupportedConeT::ZeroConeT(self.eq_rows.len()));
    }
    if !self.le_rows.is_empty() {
      rows.extend(self.le_rows.iter().cloned());
      b.extend(self.le_rhs.iter().copied());
      cones.push(SupportedConeT::NonnegativeConeT(self.le_rows.len()));
    }
    for (t, g) in &self.soc_blocks {
      if g.iter().any(|r| r.len() > n) {
        return Err(PortfolioError::Optimization(
          "cone factor wider than variable count".to_string(),
        ));
      }
      rows.push(vec![0.0; n]);
      b.push(*t);
      for g_row in g {
        let mut row = vec![0.0; n];
        for (j, v) in g_row.iter().enumerate() {
          row[j] = -v;
        }
        rows.push(row);
        b.push(0.0);
      }
      cones.push(SupportedConeT::SecondOrderConeT(g.len() + 1));
    }

    let p = dense_to_csc(&self.p, n, true);
    let a = dense_to_csc(&rows, n, false);

    let clarabel_settings = DefaultSettingsBuilder::default()
      .verbose(false)
      .max_iter(settings.max_iter)
      .tol_gap_abs(settings.tolerance)
      .tol_gap_rel(settings.tolerance)
      .tol_feas(settings.tolerance)
      .build()
      .map_err(|e| PortfolioError::Optimization(format!("invalid solver settings: {e}")))?;

    let mut solver = DefaultSolver::new(&p, &self.q, &a, &b, &cones, clarabel_settings);
    solver.solve();

    let status = solver.solution.status;
    debug!(
      ?status,
      iterations = solver.info.iterations,
      variables = n,
      constraints = b.len(),
      "clarabel finished"
    );

    match status {
      SolverStatus::Solved | SolverStatus::AlmostSolved => {
        let x = solver.solution.x.clone();
        if x.iter().any(|v| !v.is_finite()) {
          return Err(PortfolioError::Optimization(
            "solver returned non-finite values".to_string(),
          ));
        }
        Ok(SolveOutcome::Optimal {
          x,
          objective: solver.solution.obj_val,
        })
      }
      SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
        Ok(SolveOutcome::Infeasible)
      }
      other => Err(PortfolioError::Optimization(format!(
        "solver did not converge: {other:?}"
      ))),
    }
  }
}

/// Column-compressed copy of a dense matrix; `upper` keeps only `i <= j`.
fn dense_to_csc(rows: &[Vec<f64>], ncols: usize, upper: bool) -> CscMatrix<f64> {
  let nrows = rows.len();
  let mut colptr = Vec::with_capacity(ncols + 1);
  let mut rowval = Vec::new();
  let mut nzval = Vec::new();

  colptr.push(0);
  for j in 0..ncols {
    for (i, row) in rows.iter().enumerate() {
      if upper && i > j {
        break;
      }
      let v = row.get(j).copied().unwrap_or(0.0);
      if v != 0.0 {
        rowval.push(i);
        nzval.push(v);
      }
    }
    colptr.push(rowval.len());
  }

  CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn optimal(outcome: SolveOutcome) -> (Vec<f64>, f64) {
    match outcome {
      SolveOutcome::Optimal { x, objective } => (x, objective),
      SolveOutcome::Infeasible => panic!("expected optimal outcome"),
    }
  }

  #[test]
  fn csc_upper_triangle_drops_lower_entries() {
    let m = dense_to_csc(&[vec![2.0, 1.0], vec![1.0, 3.0]], 2, true);
    assert_eq!(m.colptr, vec![0, 1, 3]);
    assert_eq!(m.rowval, vec![0, 0, 1]);
    assert_eq!(m.nzval, vec![2.0, 1.0, 3.0]);
  }

  #[test]
  fn solves_small_lp() {
    // max x + 2y  s.t. x + y = 1, x, y >= 0  ->  y = 1
    let outcome = ConicProblem::new(2)
      .linear(vec![-1.0, -2.0])
      .equal(vec![1.0, 1.0], 1.0)
      .nonnegative(2)
      .solve(&SolverSettings::default())
      .unwrap();
    let (x, objective) = optimal(outcome);
    assert!((x[1] - 1.0).abs() < 1e-6);
    assert!((objective + 2.0).abs() < 1e-6);
  }

  #[test]
  fn solves_qp_on_simplex() {
    // min 0.5 (x^2 + y^2) s.t. x + y = 1 -> (0.5, 0.5)
    let outcome = ConicProblem::new(2)
      .quadratic(&[vec![1.0, 0.0], vec![0.0, 1.0]])
      .equal(vec![1.0, 1.0], 1.0)
      .nonnegative(2)
      .solve(&SolverSettings::default())
      .unwrap();
    let (x, _) = optimal(outcome);
    assert!((x[0] - 0.5).abs() < 1e-6);
    assert!((x[1] - 0.5).abs() < 1e-6);
  }

  #[test]
  fn second_order_cone_limits_norm() {
    // max x  s.t. ||(x, y)|| <= 2, x + y = 0  ->  x = sqrt(2)
    let outcome = ConicProblem::new(2)
      .linear(vec![-1.0, 0.0])
      .equal(vec![1.0, 1.0], 0.0)
      .norm_at_most(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 2.0)
      .solve(&SolverSettings::default())
      .unwrap();
    let (x, _) = optimal(outcome);
    assert!((x[0] - 2.0_f64.sqrt()).abs() < 1e-5);
  }

  #[test]
  fn reports_infeasibility() {
    let outcome = ConicProblem::new(1)
      .equal(vec![1.0], 1.0)
      .at_most(vec![1.0], 0.5)
      .solve(&SolverSettings::default())
      .unwrap();
    assert_eq!(outcome, SolveOutcome::Infeasible);
  }
}
