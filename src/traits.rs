use crate::common::IterationRecord;
use anyhow::{format_err, Result};
use sparsetools::csr::CSR;

/// Evaluation of the nonlinear program
///
/// ```txt
///       min F(x)
///        x
/// ```
///
/// subject to
///
/// ```txt
///       lbg <= g(x) <= ubg   (nonlinear constraints)
///       lbx <= x <= ubx      (variable bounds)
/// ```
///
/// The Jacobian and Hessian sparsity patterns must not change between
/// calls. The Hessian pattern must contain every diagonal entry.
///
/// Evaluation failures (domain errors and the like) are reported as
/// `Err`. The solver recovers from failures at line-search trial
/// points by backtracking; failures anywhere else abort the solve.
pub trait Nlp {
    /// Objective function value at `x`.
    fn eval_f(&self, x: &[f64]) -> Result<f64>;

    /// Constraint function values at `x`. Never called when the
    /// problem has no constraints.
    fn eval_g(&self, x: &[f64]) -> Result<Vec<f64>>;

    /// Objective function value and gradient at `x`.
    fn eval_grad_f(&self, x: &[f64]) -> Result<(f64, Vec<f64>)>;

    /// Constraint function values and Jacobian at `x`. Never called
    /// when the problem has no constraints.
    fn eval_jac_g(&self, x: &[f64]) -> Result<(Vec<f64>, CSR<usize, f64>)>;

    /// Hessian of the Lagrangian `sigma*F + mu'g` at `x`. Only
    /// required for [HessianApproximation::Exact](crate::HessianApproximation).
    fn eval_hess_lag(&self, _x: &[f64], _mu: &[f64], _sigma: f64) -> Result<CSR<usize, f64>> {
        Err(format_err!("exact Lagrangian Hessian not provided"))
    }
}

/// Solves the quadratic subproblem
///
/// ```txt
///       min 1/2 x'*H*x + g'*x
///        x
/// ```
///
/// subject to
///
/// ```txt
///       lba <= A*x <= uba    (linear constraints)
///       lbx <= x <= ubx      (variable bounds)
/// ```
///
/// starting from `x0`. Returns the solution along with the multipliers
/// on the variable bounds and on the linear constraints. Multipliers
/// are positive for binding upper limits and negative for binding
/// lower limits.
pub trait QpSolver {
    fn solve(
        &self,
        h_mat: &CSR<usize, f64>,
        g: &[f64],
        lbx: &[f64],
        ubx: &[f64],
        a_mat: &CSR<usize, f64>,
        lba: &[f64],
        uba: &[f64],
        x0: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)>;
}

/// Called once per iteration of the solver with the scalars of the
/// iteration and the full current iterate. Return `true` to request
/// termination.
pub trait ProgressMonitor {
    fn update(
        &self,
        record: &IterationRecord,
        x: &[f64],
        g: &[f64],
        mu: &[f64],
        mu_x: &[f64],
    ) -> bool;
}
