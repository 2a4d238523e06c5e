use crate::common::{HessianApproximation, IterationRecord, Options, Solution, Termination};
use crate::hessian::{
    add_to_diagonal, bfgs_update, drop_off_diagonal, gershgorin_regularization, initial_hessian,
};
use crate::linesearch::{line_search, primal_infeasibility, MeritHistory};
use crate::math::{dot, norm_inf};
use crate::traits::{Nlp, ProgressMonitor, QpSolver};
use anyhow::{bail, Context, Result};
use itertools::{izip, Itertools};
use log::{debug, trace, warn};
use sparsetools::csr::CSR;

/// Sequential Quadratic Programming method for NLP (nonlinear
/// programming). Minimize a function F(x) beginning from a starting
/// point x0, subject to optional nonlinear constraints and variable
/// bounds.
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
/// Each iteration linearizes the constraints and minimizes a
/// quadratic model of the objective over `qpsol`, globalized by a
/// non-monotone backtracking line search on an L1 merit function.
/// The Hessian of the Lagrangian is either evaluated exactly or
/// approximated with damped BFGS updates, according to
/// `opt.hessian_approximation`.
pub fn nlp<Q: QpSolver>(
    problem: &dyn Nlp,
    x0: &[f64],
    lbx: &[f64],
    ubx: &[f64],
    lbg: &[f64],
    ubg: &[f64],
    qpsol: &Q,
    opt: &Options,
    progress: Option<&dyn ProgressMonitor>,
) -> Result<Solution> {
    let nx = x0.len();
    let ng = lbg.len();

    if lbx.len() != nx || ubx.len() != nx {
        bail!("variable bounds must have length {}", nx);
    }
    if ubg.len() != ng {
        bail!("constraint limits must have length {}", ng);
    }
    if opt.beta <= 0.0 || opt.beta >= 1.0 {
        bail!("beta ({}) must be between 0 and 1", opt.beta);
    }
    if opt.merit_memory < 1 {
        bail!("merit_memory must be at least 1");
    }
    if opt.lbfgs_memory < 1 {
        bail!("lbfgs_memory must be at least 1");
    }
    let exact = opt.hessian_approximation == HessianApproximation::Exact;

    let mut st = SolverState::new(x0, nx, ng, opt);

    // Initial constraint Jacobian, objective gradient and Lagrangian
    // gradient. Failures here are fatal.
    st.evaluate(problem, ng)?;
    if exact {
        st.eval_hessian(problem, opt.regularize)?;
    }

    if exact {
        debug!("using exact Hessian");
    } else {
        debug!("using limited memory BFGS Hessian approximation");
    }
    debug!(
        "number of variables: {}, constraints: {}, Jacobian nnz: {}, Hessian nnz: {}",
        nx,
        ng,
        st.jac.nnz(),
        st.bk.nnz()
    );

    let status = loop {
        let inf_pr = primal_infeasibility(&st.x, lbx, ubx, &st.g, lbg, ubg);
        let inf_du = norm_inf(&st.glag);
        let step_norm = norm_inf(&st.dx);

        if st.iter % 10 == 0 {
            debug!(
                "{:>4} {:>15} {:>10} {:>10} {:>10} {:>7} {:>3}",
                "iter", "objective", "inf_pr", "inf_du", "||d||", "lg(rg)", "ls"
            );
        }
        let record = IterationRecord {
            iter: st.iter,
            inf_pr,
            inf_du,
            step_norm,
            reg: st.reg,
            ls_trials: st.ls_trials,
            ls_success: st.ls_success,
            obj: st.f,
            sigma: st.sigma,
        };
        debug!(
            "{:>4} {:>15.6e} {:>10.2e} {:>10.2e} {:>10.2e} {:>7} {:>3}{}",
            record.iter,
            record.obj,
            record.inf_pr,
            record.inf_du,
            record.step_norm,
            if record.reg > 0.0 {
                format!("{:.2}", record.reg.log10())
            } else {
                "-".to_string()
            },
            record.ls_trials,
            if record.ls_success { ' ' } else { 'F' }
        );
        st.records.push(record.clone());

        if let Some(monitor) = progress {
            if monitor.update(&record, &st.x, &st.g, &st.mu, &st.mu_x) {
                debug!("aborted by progress monitor");
                break Termination::UserRequestedStop;
            }
        }

        // Checking convergence criteria.
        if inf_pr < opt.tol_pr && inf_du < opt.tol_du {
            debug!("convergence achieved after {} iterations", st.iter);
            break Termination::Converged;
        }
        if st.iter >= opt.max_iter {
            debug!("maximum number of iterations reached");
            break Termination::MaxIterationsExceeded;
        }
        if st.iter > 0 && step_norm <= opt.min_step_size {
            debug!("search direction becomes too small without convergence criteria being met");
            break Termination::StepTooSmall;
        }

        // Start a new iteration.
        st.iter += 1;

        // Formulate the QP limits as deviations from the iterate.
        trace!("formulating QP");
        let qp_lbx = izip!(lbx, &st.x).map(|(l, x)| l - x).collect_vec();
        let qp_ubx = izip!(ubx, &st.x).map(|(u, x)| u - x).collect_vec();
        let qp_lba = izip!(lbg, &st.g).map(|(l, g)| l - g).collect_vec();
        let qp_uba = izip!(ubg, &st.g).map(|(u, g)| u - g).collect_vec();

        // Solve the QP, warm starting from the previous step.
        let (dx, dual_x, dual_a) = qpsol
            .solve(
                &st.bk, &st.grad_f, &qp_lbx, &qp_ubx, &st.jac, &qp_lba, &qp_uba, &st.dx,
            )
            .context("QP solve failed")?;
        st.dx = dx;
        trace!("QP solved");

        if dot(&st.dx, &st.bk.mat_vec(&st.dx)?) < 0.0 {
            warn!("indefinite Hessian detected, the step may not be a descent direction");
        }

        // Penalty parameter of the merit function. Never decreases
        // over the course of a solve.
        st.sigma = st
            .sigma
            .max(1.01 * norm_inf(&dual_x))
            .max(1.01 * norm_inf(&dual_a));

        // Merit function and its directional derivative at the
        // current iterate.
        let l1_dir = dot(&st.dx, &st.grad_f) - st.sigma * inf_pr;
        st.merit.push(st.f + st.sigma * inf_pr);

        trace!("starting line-search");
        let ls = line_search(
            problem, &st.x, &st.dx, lbx, ubx, lbg, ubg, st.sigma, l1_dir, &st.merit, opt,
        );
        st.ls_trials = ls.trials;
        st.ls_success = ls.success;

        // Candidate accepted: interpolate the dual variables and
        // move the primal variable.
        izip!(st.mu.iter_mut(), &dual_a).for_each(|(m, d)| *m = ls.t * d + (1.0 - ls.t) * *m);
        izip!(st.mu_x.iter_mut(), &dual_x).for_each(|(m, d)| *m = ls.t * d + (1.0 - ls.t) * *m);
        st.x_old = std::mem::replace(&mut st.x, ls.x_cand);

        if !exact {
            // Lagrangian gradient at the old point with the new
            // multipliers, for the BFGS secant pair.
            st.glag_old = lagrangian_gradient(&st.grad_f, &st.jac, &st.mu, &st.mu_x);
        }

        // Re-evaluate the constraint Jacobian, objective gradient and
        // Lagrangian gradient at the new point. Failures here are
        // fatal, unlike failures at line-search trial points.
        st.evaluate(problem, ng)?;

        if exact {
            st.eval_hessian(problem, opt.regularize)?;
        } else {
            trace!("updating Hessian (BFGS)");
            if st.iter % opt.lbfgs_memory == 0 {
                // Reset the approximation by dropping all
                // off-diagonal entries.
                st.bk = drop_off_diagonal(&st.bk)?;
            }
            st.bk = bfgs_update(&st.bk, &st.x, &st.x_old, &st.glag, &st.glag_old)?;
        }
    };

    Ok(Solution {
        x: st.x,
        f: st.f,
        g: st.g,
        mu: st.mu,
        mu_x: st.mu_x,
        status,
        records: st.records,
    })
}

/// Mutable state of one solve. Constructed fresh for every call to
/// [nlp] so that independent solves cannot share state.
struct SolverState {
    x: Vec<f64>,
    x_old: Vec<f64>,
    mu: Vec<f64>,
    mu_x: Vec<f64>,

    f: f64,
    grad_f: Vec<f64>,
    g: Vec<f64>,
    jac: CSR<usize, f64>,
    glag: Vec<f64>,
    glag_old: Vec<f64>,
    bk: CSR<usize, f64>,

    dx: Vec<f64>,
    sigma: f64,
    reg: f64,
    iter: usize,
    ls_trials: usize,
    ls_success: bool,
    merit: MeritHistory,
    records: Vec<IterationRecord>,
}

impl SolverState {
    fn new(x0: &[f64], nx: usize, ng: usize, opt: &Options) -> Self {
        Self {
            x: x0.to_vec(),
            x_old: vec![0.0; nx],
            mu: vec![0.0; ng],
            mu_x: vec![0.0; nx],

            f: 0.0,
            grad_f: vec![0.0; nx],
            g: vec![0.0; ng],
            jac: CSR::with_size(ng, nx),
            glag: vec![0.0; nx],
            glag_old: vec![0.0; nx],
            bk: initial_hessian(nx),

            dx: vec![0.0; nx],
            sigma: 0.0,
            reg: 0.0,
            iter: 0,
            ls_trials: 0,
            ls_success: true,
            merit: MeritHistory::new(opt.merit_memory),
            records: Vec::new(),
        }
    }

    /// Evaluates the constraint Jacobian, the objective gradient and
    /// the Lagrangian gradient at the current point.
    fn evaluate(&mut self, problem: &dyn Nlp, ng: usize) -> Result<()> {
        if ng > 0 {
            trace!("evaluating jac_g");
            let (g, jac) = problem
                .eval_jac_g(&self.x)
                .context("constraint Jacobian evaluation failed")?;
            if g.len() != ng || jac.rows() != ng || jac.cols() != self.x.len() {
                bail!("constraint Jacobian has inconsistent dimensions");
            }
            self.g = g;
            self.jac = jac;
        }
        trace!("evaluating grad_f");
        let (f, grad_f) = problem
            .eval_grad_f(&self.x)
            .context("objective gradient evaluation failed")?;
        if grad_f.len() != self.x.len() {
            bail!("objective gradient has inconsistent dimensions");
        }
        self.f = f;
        self.grad_f = grad_f;

        self.glag = lagrangian_gradient(&self.grad_f, &self.jac, &self.mu, &self.mu_x);
        Ok(())
    }

    /// Evaluates the exact Lagrangian Hessian, convexified with a
    /// Gershgorin diagonal shift when requested.
    fn eval_hessian(&mut self, problem: &dyn Nlp, regularize: bool) -> Result<()> {
        trace!("evaluating hessian");
        let mut bk = problem
            .eval_hess_lag(&self.x, &self.mu, 1.0)
            .context("Lagrangian Hessian evaluation failed")?;
        if regularize {
            self.reg = gershgorin_regularization(&bk);
            if self.reg > 0.0 {
                bk = add_to_diagonal(&bk, self.reg)?;
            }
        }
        self.bk = bk;
        Ok(())
    }
}

/// Gradient of the Lagrangian: `grad_f + J'*mu + mu_x`. Its inf-norm
/// is the dual infeasibility.
fn lagrangian_gradient(
    grad_f: &[f64],
    jac: &CSR<usize, f64>,
    mu: &[f64],
    mu_x: &[f64],
) -> Vec<f64> {
    let mut glag: Vec<f64> = izip!(grad_f, mu_x).map(|(g, m)| g + m).collect();

    let rowptr = jac.rowptr();
    let colidx = jac.colidx();
    let values = jac.values();
    for i in 0..jac.rows() {
        for el in rowptr[i]..rowptr[i + 1] {
            glag[colidx[el]] += values[el] * mu[i];
        }
    }
    glag
}
