use anyhow::Result;
use float_cmp::assert_approx_eq;
use sparsetools::csr::CSR;
use spsolve::rlu::RLU;

use crate::{nlp, HessianApproximation, Ipm, Nlp, Options, Termination};

/// 2-dimensional unconstrained optimization of Rosenbrock's "banana"
/// function:
///
/// ```txt
///     f(x) = 100(x_2 − x_1^2)^2 + (1 − x_1)^2
/// ```
///
/// https://en.wikipedia.org/wiki/Rosenbrock_function
struct UnconstrainedBananaFunction {}

impl UnconstrainedBananaFunction {
    fn f(&self, x: &[f64]) -> f64 {
        let a = 100.0;
        a * (x[1] - x[0].powi(2)).powi(2) + (1.0 - x[0]).powi(2)
    }
}

impl Nlp for UnconstrainedBananaFunction {
    fn eval_f(&self, x: &[f64]) -> Result<f64> {
        Ok(self.f(x))
    }

    fn eval_g(&self, _x: &[f64]) -> Result<Vec<f64>> {
        unreachable!("unconstrained problem");
    }

    fn eval_grad_f(&self, x: &[f64]) -> Result<(f64, Vec<f64>)> {
        let a = 100.0;
        let df = vec![
            4.0 * a * (x[0].powi(3) - x[0] * x[1]) + 2.0 * x[0] - 2.0,
            2.0 * a * (x[1] - x[0].powi(2)),
        ];
        Ok((self.f(x), df))
    }

    fn eval_jac_g(&self, _x: &[f64]) -> Result<(Vec<f64>, CSR<usize, f64>)> {
        unreachable!("unconstrained problem");
    }

    fn eval_hess_lag(&self, x: &[f64], _mu: &[f64], sigma: f64) -> Result<CSR<usize, f64>> {
        let a = 100.0;
        let d2f = CSR::from_dense(&[
            vec![3.0 * x[0].powi(2) - x[1] + 1.0 / (2.0 * a), -x[0]],
            vec![-x[0], 0.5],
        ]) * 4.0
            * a;
        Ok(d2f * sigma)
    }
}

fn solve(x0: &[f64], opt: &Options) -> crate::Solution {
    let size = x0.len();
    let qpsol = Ipm::new(RLU::default());
    nlp(
        &UnconstrainedBananaFunction {},
        x0,
        &vec![f64::NEG_INFINITY; size],
        &vec![f64::INFINITY; size],
        &[],
        &[],
        &qpsol,
        opt,
        None,
    )
    .unwrap()
}

#[test]
fn banana_exact_newton() {
    let opt = Options {
        max_iter: 100,
        max_iter_ls: 10,
        ..Default::default()
    };
    let solution = solve(&[0.5, 0.25], &opt);

    assert_eq!(solution.status, Termination::Converged);
    assert_approx_eq!(f64, solution.x[0], 1.0, epsilon = 1e-5);
    assert_approx_eq!(f64, solution.x[1], 1.0, epsilon = 1e-5);
    assert!(solution.f < 1e-10);
}

#[test]
fn banana_bfgs() {
    let opt = Options {
        max_iter: 500,
        max_iter_ls: 30,
        hessian_approximation: HessianApproximation::LimitedMemory,
        ..Default::default()
    };
    let solution = solve(&[0.8, 0.6], &opt);

    assert_eq!(solution.status, Termination::Converged);
    assert_approx_eq!(f64, solution.x[0], 1.0, epsilon = 1e-4);
    assert_approx_eq!(f64, solution.x[1], 1.0, epsilon = 1e-4);
    assert!(solution.f < 1e-8);
}
