/// Hessian information used for the quadratic subproblems.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HessianApproximation {
    /// Evaluate the Hessian of the Lagrangian exactly each iteration.
    Exact,
    /// Maintain a damped BFGS approximation with periodic diagonal resets.
    LimitedMemory,
}

/// Reason the solver stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Primal and dual infeasibility both below tolerance.
    Converged,
    /// Iteration budget exhausted without convergence.
    MaxIterationsExceeded,
    /// Search direction became smaller than `min_step_size`.
    StepTooSmall,
    /// The progress monitor requested termination.
    UserRequestedStop,
}

pub struct Options {
    /// Maximum number of SQP iterations.
    pub max_iter: usize,
    /// Maximum number of line-search trials per iteration.
    /// Zero disables the line search and forces full steps.
    pub max_iter_ls: usize,

    /// Stopping tolerance for primal infeasibility.
    pub tol_pr: f64,
    /// Stopping tolerance for dual infeasibility.
    pub tol_du: f64,

    /// Armijo condition, coefficient of decrease in merit.
    pub c1: f64,
    /// Line-search backtracking factor, `0 < beta < 1`.
    pub beta: f64,
    /// Number of merit function values kept for the non-monotone
    /// acceptance test.
    pub merit_memory: usize,
    /// The Hessian approximation is reset to its diagonal every
    /// `lbfgs_memory` iterations.
    pub lbfgs_memory: usize,

    /// Convexify the Hessian using a Gershgorin eigenvalue bound.
    pub regularize: bool,
    /// Exits when the inf-norm of the step falls below this value
    /// without the convergence criteria being met.
    pub min_step_size: f64,

    pub hessian_approximation: HessianApproximation,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_iter: 50,
            max_iter_ls: 3,

            tol_pr: 1e-6,
            tol_du: 1e-6,

            c1: 1e-4,
            beta: 0.8,
            merit_memory: 4,
            lbfgs_memory: 10,

            regularize: false,
            min_step_size: 1e-10,

            hessian_approximation: HessianApproximation::Exact,
        }
    }
}

/// Scalars describing one iteration of the main loop.
///
/// `ls_trials` and `ls_success` describe the line search that produced
/// the current iterate, i.e. the one run during the previous iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationRecord {
    /// Iteration index, starting at zero.
    pub iter: usize,
    /// Primal infeasibility (inf-norm over violated bounds and constraints).
    pub inf_pr: f64,
    /// Dual infeasibility (inf-norm of the Lagrangian gradient).
    pub inf_du: f64,
    /// Inf-norm of the last search direction.
    pub step_norm: f64,
    /// Diagonal shift applied to the Hessian.
    pub reg: f64,
    /// Number of line-search trials.
    pub ls_trials: usize,
    /// Whether the line search found a point satisfying the Armijo test.
    pub ls_success: bool,
    /// Objective function value.
    pub obj: f64,
    /// Merit function penalty parameter.
    pub sigma: f64,
}

/// Result of a solve: the last accepted iterate, the reason for
/// stopping and the per-iteration log.
#[derive(Clone, Debug)]
pub struct Solution {
    /// Primal point.
    pub x: Vec<f64>,
    /// Objective function value.
    pub f: f64,
    /// Constraint function values.
    pub g: Vec<f64>,
    /// Multipliers on the constraints.
    pub mu: Vec<f64>,
    /// Multipliers on the variable bounds.
    pub mu_x: Vec<f64>,

    pub status: Termination,
    pub records: Vec<IterationRecord>,
}
