use anyhow::{format_err, Result};
use float_cmp::assert_approx_eq;
use sparsetools::csr::CSR;

use crate::linesearch::{line_search, primal_infeasibility, MeritHistory};
use crate::{Nlp, Options};

/// Linear objective for exercising the line search in isolation.
struct Ramp {}

impl Nlp for Ramp {
    fn eval_f(&self, x: &[f64]) -> Result<f64> {
        Ok(x[0])
    }

    fn eval_g(&self, _x: &[f64]) -> Result<Vec<f64>> {
        unreachable!("unconstrained problem");
    }

    fn eval_grad_f(&self, x: &[f64]) -> Result<(f64, Vec<f64>)> {
        Ok((x[0], vec![1.0]))
    }

    fn eval_jac_g(&self, _x: &[f64]) -> Result<(Vec<f64>, CSR<usize, f64>)> {
        unreachable!("unconstrained problem");
    }
}

/// Objective that cannot be evaluated anywhere.
struct Undefined {}

impl Nlp for Undefined {
    fn eval_f(&self, _x: &[f64]) -> Result<f64> {
        Err(format_err!("undefined"))
    }

    fn eval_g(&self, _x: &[f64]) -> Result<Vec<f64>> {
        unreachable!("unconstrained problem");
    }

    fn eval_grad_f(&self, _x: &[f64]) -> Result<(f64, Vec<f64>)> {
        Err(format_err!("undefined"))
    }

    fn eval_jac_g(&self, _x: &[f64]) -> Result<(Vec<f64>, CSR<usize, f64>)> {
        unreachable!("unconstrained problem");
    }
}

/// Objective that panics if evaluated, for asserting that no
/// evaluation takes place.
struct Untouchable {}

impl Nlp for Untouchable {
    fn eval_f(&self, _x: &[f64]) -> Result<f64> {
        unreachable!("must not be evaluated");
    }

    fn eval_g(&self, _x: &[f64]) -> Result<Vec<f64>> {
        unreachable!("must not be evaluated");
    }

    fn eval_grad_f(&self, _x: &[f64]) -> Result<(f64, Vec<f64>)> {
        unreachable!("must not be evaluated");
    }

    fn eval_jac_g(&self, _x: &[f64]) -> Result<(Vec<f64>, CSR<usize, f64>)> {
        unreachable!("must not be evaluated");
    }
}

const NO_BOUND: [f64; 1] = [f64::INFINITY];
const NO_BOUND_NEG: [f64; 1] = [f64::NEG_INFINITY];

#[test]
fn merit_history_is_bounded() {
    let mut merit = MeritHistory::new(4);
    for i in 0..10 {
        merit.push(i as f64);
        assert!(merit.len() <= 4);
    }
    // Only the last four values remain.
    assert_eq!(merit.max(), 9.0);
    merit.push(-1.0);
    assert_eq!(merit.max(), 9.0);
}

#[test]
fn primal_infeasibility_is_never_negative() {
    // Strictly feasible point.
    let pr = primal_infeasibility(&[0.5], &NO_BOUND_NEG, &NO_BOUND, &[], &[], &[]);
    assert_eq!(pr, 0.0);

    // Violated lower bound.
    let pr = primal_infeasibility(&[-2.0], &[0.0], &NO_BOUND, &[], &[], &[]);
    assert_eq!(pr, 2.0);

    // Worst violation wins: constraint above its upper limit.
    let pr = primal_infeasibility(&[0.0], &[0.0], &NO_BOUND, &[7.0], &[0.0], &[4.0]);
    assert_eq!(pr, 3.0);
}

/// A trial merit value above the last accepted merit but below an
/// older one in the history window is still accepted.
#[test]
fn acceptance_is_non_monotone() {
    let mut merit = MeritHistory::new(4);
    merit.push(5.0);
    merit.push(0.0);

    let opt = Options::default();
    let ls = line_search(
        &Ramp {},
        &[0.0],
        &[1.0],
        &NO_BOUND_NEG,
        &NO_BOUND,
        &[],
        &[],
        0.0,
        -0.1,
        &merit,
        &opt,
    );

    // Candidate merit is 1, worse than the last accepted 0 but well
    // below the window maximum 5.
    assert!(ls.success);
    assert_eq!(ls.trials, 1);
    assert_eq!(ls.t, 1.0);
    assert_eq!(ls.x_cand, vec![1.0]);
}

/// Exhausting the trial budget accepts the last candidate anyway,
/// flagged as unsuccessful.
#[test]
fn exhaustion_accepts_last_candidate() {
    let mut merit = MeritHistory::new(4);
    merit.push(-10.0);

    let opt = Options::default();
    let ls = line_search(
        &Ramp {},
        &[0.0],
        &[1.0],
        &NO_BOUND_NEG,
        &NO_BOUND,
        &[],
        &[],
        0.0,
        -0.1,
        &merit,
        &opt,
    );

    assert!(!ls.success);
    assert_eq!(ls.trials, opt.max_iter_ls);
    assert_approx_eq!(f64, ls.t, 0.64, epsilon = 1e-12);
    assert_approx_eq!(f64, ls.x_cand[0], 0.64, epsilon = 1e-12);
}

/// When no trial point evaluates at all, the current iterate is kept.
#[test]
fn exhaustion_without_evaluation_keeps_iterate() {
    let mut merit = MeritHistory::new(4);
    merit.push(1.0);

    let opt = Options::default();
    let ls = line_search(
        &Undefined {},
        &[2.0],
        &[1.0],
        &NO_BOUND_NEG,
        &NO_BOUND,
        &[],
        &[],
        0.0,
        -0.1,
        &merit,
        &opt,
    );

    assert!(!ls.success);
    assert_eq!(ls.trials, opt.max_iter_ls);
    assert_eq!(ls.t, 0.0);
    assert_eq!(ls.x_cand, vec![2.0]);
}

/// `max_iter_ls = 0` takes the full step without any evaluation.
#[test]
fn disabled_line_search_takes_full_step() {
    let merit = MeritHistory::new(4);
    let opt = Options {
        max_iter_ls: 0,
        ..Default::default()
    };
    let ls = line_search(
        &Untouchable {},
        &[1.0],
        &[2.0],
        &NO_BOUND_NEG,
        &NO_BOUND,
        &[],
        &[],
        0.0,
        -1.0,
        &merit,
        &opt,
    );

    assert!(ls.success);
    assert_eq!(ls.trials, 0);
    assert_eq!(ls.t, 1.0);
    assert_eq!(ls.x_cand, vec![3.0]);
}
