use crate::common::Options;
use crate::traits::Nlp;
use anyhow::Result;
use itertools::izip;
use log::{debug, trace};
use std::collections::VecDeque;

/// Inf-norm of the violated bound and constraint residuals:
///
/// ```txt
///     max(0, lbx - x, x - ubx, lbg - g, g - ubg)
/// ```
///
/// Zero iff `x` is feasible. Also the infeasibility term of the
/// L1 merit function.
pub(crate) fn primal_infeasibility(
    x: &[f64],
    lbx: &[f64],
    ubx: &[f64],
    g: &[f64],
    lbg: &[f64],
    ubg: &[f64],
) -> f64 {
    let mut pr_inf: f64 = 0.0;

    for (&xj, &lbj, &ubj) in izip!(x, lbx, ubx) {
        pr_inf = pr_inf.max(lbj - xj);
        pr_inf = pr_inf.max(xj - ubj);
    }
    for (&gj, &lbj, &ubj) in izip!(g, lbg, ubg) {
        pr_inf = pr_inf.max(lbj - gj);
        pr_inf = pr_inf.max(gj - ubj);
    }
    pr_inf
}

/// History of merit function values of the last accepted iterates.
/// The oldest value is evicted once `size` values are stored.
pub(crate) struct MeritHistory {
    mem: VecDeque<f64>,
    size: usize,
}

impl MeritHistory {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            mem: VecDeque::with_capacity(size),
            size,
        }
    }

    pub(crate) fn push(&mut self, merit: f64) {
        self.mem.push_back(merit);
        if self.mem.len() > self.size {
            self.mem.pop_front();
        }
    }

    /// Largest stored merit value, the reference of the non-monotone
    /// Armijo test.
    pub(crate) fn max(&self) -> f64 {
        self.mem.iter().fold(f64::NEG_INFINITY, |m, &v| m.max(v))
    }

    pub(crate) fn len(&self) -> usize {
        self.mem.len()
    }
}

pub(crate) struct LineSearchResult {
    /// Accepted step size in `(0, 1]`, or zero if no trial point
    /// could be evaluated.
    pub t: f64,
    /// The trial point `x + t*dx`.
    pub x_cand: Vec<f64>,
    /// Number of trials performed.
    pub trials: usize,
    /// False if the step was accepted without satisfying the
    /// acceptance test.
    pub success: bool,
}

/// Backtracking line search on the L1 merit function
/// `f + sigma*primal_infeasibility` with a non-monotone acceptance
/// test: a candidate is accepted when its merit value does not exceed
/// `max(history) + t*c1*l1_dir`, which tolerates the transient merit
/// increases typical of L1 penalty methods near active-set changes.
///
/// Evaluation failures at trial points count as failed trials and
/// backtrack. Once the trial budget is exhausted the last evaluated
/// candidate is accepted with `success = false`; if every trial
/// failed to evaluate, the current iterate is kept instead.
pub(crate) fn line_search(
    nlp: &dyn Nlp,
    x: &[f64],
    dx: &[f64],
    lbx: &[f64],
    ubx: &[f64],
    lbg: &[f64],
    ubg: &[f64],
    sigma: f64,
    l1_dir: f64,
    merit: &MeritHistory,
    opt: &Options,
) -> LineSearchResult {
    if opt.max_iter_ls == 0 {
        // Line search disabled: always take the full step.
        return LineSearchResult {
            t: 1.0,
            x_cand: izip!(x, dx).map(|(xi, di)| xi + di).collect(),
            trials: 0,
            success: true,
        };
    }

    let mut t = 1.0;
    let mut trials = 0;
    let mut last_eval: Option<(f64, Vec<f64>)> = None;

    loop {
        let x_cand: Vec<f64> = izip!(x, dx).map(|(xi, di)| xi + t * di).collect();
        trials += 1;

        match eval_merit_point(nlp, lbg.len(), &x_cand) {
            Err(err) => {
                trace!("line-search trial failed to evaluate: {}", err);
                if trials >= opt.max_iter_ls {
                    return match last_eval {
                        Some((t_last, x_last)) => LineSearchResult {
                            t: t_last,
                            x_cand: x_last,
                            trials,
                            success: false,
                        },
                        None => {
                            debug!("line-search exhausted without an evaluable trial point");
                            LineSearchResult {
                                t: 0.0,
                                x_cand: x.to_vec(),
                                trials,
                                success: false,
                            }
                        }
                    };
                }
            }
            Ok((f_cand, g_cand)) => {
                let infeas = primal_infeasibility(&x_cand, lbx, ubx, &g_cand, lbg, ubg);
                let merit_cand = f_cand + sigma * infeas;

                if merit_cand <= merit.max() + t * opt.c1 * l1_dir {
                    trace!("line-search completed, candidate accepted");
                    return LineSearchResult {
                        t,
                        x_cand,
                        trials,
                        success: true,
                    };
                }
                if trials >= opt.max_iter_ls {
                    trace!("line-search completed, maximum number of trials");
                    return LineSearchResult {
                        t,
                        x_cand,
                        trials,
                        success: false,
                    };
                }
                last_eval = Some((t, x_cand));
            }
        }
        t = opt.beta * t;
    }
}

fn eval_merit_point(nlp: &dyn Nlp, ng: usize, x: &[f64]) -> Result<(f64, Vec<f64>)> {
    let f = nlp.eval_f(x)?;
    let g = if ng > 0 { nlp.eval_g(x)? } else { Vec::new() };
    Ok((f, g))
}
