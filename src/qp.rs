use crate::math::{dot, max, min, norm, norm_inf};
use crate::traits::QpSolver;
use anyhow::{bail, Result};
use itertools::{izip, Itertools};
use log::{debug, trace};
use sparsetools::coo::Coo;
use sparsetools::csr::CSR;
use spsolve::Solver;

pub struct QpOptions {
    /// Termination tolerance for feasibility condition.
    pub feas_tol: f64,
    /// Termination tolerance for gradient condition.
    pub grad_tol: f64,
    /// Termination tolerance for complementarity condition.
    pub comp_tol: f64,
    /// Termination tolerance for cost condition.
    pub cost_tol: f64,

    /// Maximum number of iterations.
    pub max_it: usize,

    /// Constant used in alpha updates.
    pub xi: f64,
    /// Centering parameter.
    pub sigma: f64,
    /// Used to initialize slack variables.
    pub z0: f64,
    /// Exits if either alpha parameter becomes smaller than this value.
    pub alpha_min: f64,
    /// Exits if the 2-norm of the reduced Newton step exceeds this value.
    pub max_step_size: f64,
}

impl Default for QpOptions {
    fn default() -> Self {
        Self {
            feas_tol: 1e-8,
            grad_tol: 1e-8,
            comp_tol: 1e-8,
            cost_tol: 1e-8,

            max_it: 100,

            xi: 0.99995,
            sigma: 0.1,
            z0: 1.0,
            alpha_min: 1e-8,
            max_step_size: 1e10,
        }
    }
}

/// Quadratic program solver based on a primal-dual interior point
/// method. Used for the subproblems of the SQP method, but usable as
/// a standalone QP solver. Solves
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
/// Limits with `lba == uba` are treated as equality constraints and
/// infinite limits are dropped. The reduced Newton systems are solved
/// using the generic sparse linear solver `S`.
pub struct Ipm<S> {
    pub linsol: S,
    pub opt: QpOptions,
}

impl<S> Ipm<S> {
    pub fn new(linsol: S) -> Self {
        Self {
            linsol,
            opt: QpOptions::default(),
        }
    }
}

/// Origin of an assembled constraint row.
#[derive(Clone, Copy)]
enum Src {
    Bound(usize),
    Linear(usize),
}

impl<S> QpSolver for Ipm<S>
where
    S: Solver<usize, f64>,
{
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
    ) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let nx = g.len();
        let na = a_mat.rows();

        if h_mat.rows() != nx || h_mat.cols() != nx {
            bail!("H must be {}x{}", nx, nx);
        }
        if a_mat.cols() != nx {
            bail!("A must have {} columns", nx);
        }
        if lbx.len() != nx || ubx.len() != nx || lba.len() != na || uba.len() != na {
            bail!("limit vector length mismatch");
        }
        let opt = &self.opt;
        if opt.xi >= 1.0 || opt.xi < 0.5 {
            bail!("xi ({}) must be slightly less than 1", opt.xi);
        }
        if opt.sigma > 1.0 || opt.sigma <= 0.0 {
            bail!("sigma ({}) must be between 0 and 1", opt.sigma);
        }

        // Split the limits into equality rows Ae*x = be and
        // inequality rows Ai*x <= bi.
        let (ae_csr, be, eq_src, ai_csr, bi, iq_src) =
            split_limits(nx, a_mat, lbx, ubx, lba, uba)?;
        let neq = be.len();
        let niq = bi.len();

        // Gradients of the assembled constraints, one column each.
        let dg_csr = ae_csr.t().to_csr(); // nx x neq
        let dh_csr = ai_csr.t().to_csr(); // nx x niq

        let mut x = x0.to_vec();

        let eval = |x: &[f64]| -> Result<(f64, Vec<f64>)> {
            let hx = h_mat.mat_vec(x)?;
            let f = 0.5 * dot(x, &hx) + dot(g, x);
            let df = izip!(&hx, g).map(|(hxi, gi)| hxi + gi).collect_vec();
            Ok((f, df))
        };
        let residuals = |x: &[f64]| -> Result<(Vec<f64>, Vec<f64>)> {
            let ge = izip!(ae_csr.mat_vec(x)?, &be)
                .map(|(ax, bv)| ax - bv)
                .collect_vec();
            let h = izip!(ai_csr.mat_vec(x)?, &bi)
                .map(|(ax, bv)| ax - bv)
                .collect_vec();
            Ok((ge, h))
        };

        let (mut f, mut df) = eval(&x)?;
        let (mut ge, mut h) = residuals(&x)?;

        // Initialize gamma, lam, mu, z, e.
        let mut gamma = 1.0; // barrier coefficient
        let mut lam = vec![0.0; neq];
        let mut z = h
            .iter()
            .map(|&hk| if hk < -opt.z0 { -hk } else { opt.z0 })
            .collect_vec();
        let mut mu = z
            .iter()
            .map(|&zk| {
                if gamma / zk > opt.z0 {
                    gamma / zk
                } else {
                    opt.z0
                }
            })
            .collect_vec();

        let lagrangian_x = |df: &[f64], lam: &[f64], mu: &[f64]| -> Result<Vec<f64>> {
            Ok(izip!(df, dg_csr.mat_vec(lam)?, dh_csr.mat_vec(mu)?)
                .map(|(dfi, dgi, dhi)| dfi + dgi + dhi)
                .collect_vec())
        };
        let mut lx = lagrangian_x(&df, &lam, &mu)?;

        let mut f0 = f;
        let conditions = |x: &[f64],
                          z: &[f64],
                          lam: &[f64],
                          mu: &[f64],
                          ge: &[f64],
                          h: &[f64],
                          lx: &[f64],
                          f: f64,
                          f0: f64| {
            let maxh = if h.is_empty() { 0.0 } else { max(h) };
            let feascond =
                norm_inf(ge).max(maxh) / (1.0 + norm_inf(x).max(norm_inf(z)));
            let gradcond = norm_inf(lx) / (1.0 + norm_inf(lam).max(norm_inf(mu)));
            let compcond = dot(z, mu) / (1.0 + norm_inf(x));
            let costcond = (f - f0).abs() / (1.0 + f0.abs());
            (feascond, gradcond, compcond, costcond)
        };

        let (feascond, gradcond, compcond, costcond) =
            conditions(&x, &z, &lam, &mu, &ge, &h, &lx, f, f0);
        let mut converged = feascond < opt.feas_tol
            && gradcond < opt.grad_tol
            && compcond < opt.comp_tol
            && costcond < opt.cost_tol;

        let mut iterations = 0;

        // Newton iterations.
        while !converged && iterations < opt.max_it {
            iterations += 1;

            let zinv_diag = CSR::<usize, f64>::with_diagonal(
                z.iter().map(|v| v.recip()).collect(),
            );
            let mu_diag = CSR::<usize, f64>::with_diagonal(mu.clone());
            let dh_zinv = dh_csr.mat_mat(&zinv_diag)?;

            // M = H + dh_zinv*mudiag*dh'
            let m_mat = h_mat + &dh_zinv.mat_mat(&mu_diag)?.mat_mat(&ai_csr)?;

            // N = Lx + dh_zinv*(mudiag*h + gamma*e)
            let tmp = izip!(&mu, &h).map(|(mk, hk)| mk * hk + gamma).collect_vec();
            let n_vec = izip!(&lx, dh_zinv.mat_vec(&tmp)?)
                .map(|(lxi, v)| lxi + v)
                .collect_vec();

            let kkt = if neq > 0 {
                let zero = Coo::<usize, f64>::with_size(neq, neq);
                Coo::compose([
                    [&m_mat.to_coo(), &dg_csr.to_coo()],
                    [&ae_csr.to_coo(), &zero],
                ])?
                .to_csr()
            } else {
                m_mat
            };
            let mut b = n_vec
                .iter()
                .map(|v| -v)
                .chain(ge.iter().map(|v| -v))
                .collect_vec();

            let kkt_csc = kkt.to_csc();
            self.linsol.solve(
                nx + neq,
                kkt_csc.rowidx(),
                kkt_csc.colptr(),
                kkt_csc.values(),
                &mut b,
                false,
            )?;

            if b.iter().any(|v| v.is_nan()) || norm(&b) > opt.max_step_size {
                bail!("qp solve numerically failed");
            }
            let dx = &b[..nx];
            let dlam = &b[nx..];

            let dz = izip!(&h, &z, ai_csr.mat_vec(dx)?)
                .map(|(hk, zk, adx)| -hk - zk - adx)
                .collect_vec();
            let dmu = izip!(&mu, &z, &dz)
                .map(|(mk, zk, dzk)| -mk + (gamma - mk * dzk) / zk)
                .collect_vec();

            let ratios = izip!(&z, &dz)
                .filter(|(_, &dzk)| dzk < 0.0)
                .map(|(&zk, &dzk)| zk / -dzk)
                .collect_vec();
            let alphap = if ratios.is_empty() {
                1.0
            } else {
                (opt.xi * min(&ratios)).min(1.0)
            };
            let ratios = izip!(&mu, &dmu)
                .filter(|(_, &dmk)| dmk < 0.0)
                .map(|(&mk, &dmk)| mk / -dmk)
                .collect_vec();
            let alphad = if ratios.is_empty() {
                1.0
            } else {
                (opt.xi * min(&ratios)).min(1.0)
            };

            izip!(x.iter_mut(), dx).for_each(|(xi, di)| *xi += alphap * di);
            izip!(z.iter_mut(), &dz).for_each(|(zi, di)| *zi += alphap * di);
            izip!(lam.iter_mut(), dlam).for_each(|(li, di)| *li += alphad * di);
            izip!(mu.iter_mut(), &dmu).for_each(|(mi, di)| *mi += alphad * di);

            if niq > 0 {
                gamma = opt.sigma * dot(&z, &mu) / (niq as f64);
            }

            (f, df) = eval(&x)?;
            (ge, h) = residuals(&x)?;
            lx = lagrangian_x(&df, &lam, &mu)?;

            let (feascond, gradcond, compcond, costcond) =
                conditions(&x, &z, &lam, &mu, &ge, &h, &lx, f, f0);
            trace!(
                "qp iteration {}: feas {:.3e} grad {:.3e} comp {:.3e} cost {:.3e} gamma {:.3e}",
                iterations,
                feascond,
                gradcond,
                compcond,
                costcond,
                gamma
            );

            if feascond < opt.feas_tol
                && gradcond < opt.grad_tol
                && compcond < opt.comp_tol
                && costcond < opt.cost_tol
            {
                converged = true;
            } else {
                if x.iter().any(|v| v.is_nan())
                    || alphap < opt.alpha_min
                    || alphad < opt.alpha_min
                    || gamma < f64::EPSILON
                    || gamma > 1.0 / f64::EPSILON
                {
                    bail!("qp solve numerically failed");
                }
                f0 = f;
            }
        }
        if !converged {
            bail!("qp solve did not converge in {} iterations", iterations);
        }
        debug!("qp converged in {} iterations", iterations);

        // Repackage the multipliers of the assembled rows onto the
        // original variables and constraints. Binding upper limits
        // take positive sign, lower limits negative.
        let mut lam_x = vec![0.0; nx];
        let mut lam_a = vec![0.0; na];
        for (k, src) in eq_src.iter().enumerate() {
            match *src {
                Src::Bound(i) => lam_x[i] += lam[k],
                Src::Linear(j) => lam_a[j] += lam[k],
            }
        }
        for (k, (src, dir)) in iq_src.iter().enumerate() {
            match *src {
                Src::Bound(i) => lam_x[i] += dir * mu[k],
                Src::Linear(j) => lam_a[j] += dir * mu[k],
            }
        }

        Ok((x, lam_x, lam_a))
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Free,
    Equality,
    Inequality { upper: bool, lower: bool },
}

fn classify(l: f64, u: f64) -> Kind {
    if !l.is_finite() && !u.is_finite() {
        Kind::Free
    } else if (u - l).abs() <= f64::EPSILON {
        Kind::Equality
    } else {
        Kind::Inequality {
            upper: u.is_finite(),
            lower: l.is_finite(),
        }
    }
}

/// Assembles the doubly-limited variables and constraints into
/// equality rows `Ae*x = be` and inequality rows `Ai*x <= bi`,
/// recording the origin of every row for multiplier recovery.
#[allow(clippy::type_complexity)]
fn split_limits(
    nx: usize,
    a_mat: &CSR<usize, f64>,
    lbx: &[f64],
    ubx: &[f64],
    lba: &[f64],
    uba: &[f64],
) -> Result<(
    CSR<usize, f64>,
    Vec<f64>,
    Vec<Src>,
    CSR<usize, f64>,
    Vec<f64>,
    Vec<(Src, f64)>,
)> {
    let na = a_mat.rows();

    let mut neq = 0;
    let mut niq = 0;
    for i in 0..nx {
        match classify(lbx[i], ubx[i]) {
            Kind::Free => {}
            Kind::Equality => neq += 1,
            Kind::Inequality { upper, lower } => niq += upper as usize + lower as usize,
        }
    }
    for j in 0..na {
        match classify(lba[j], uba[j]) {
            Kind::Free => {}
            Kind::Equality => neq += 1,
            Kind::Inequality { upper, lower } => niq += upper as usize + lower as usize,
        }
    }

    let mut ae = Coo::<usize, f64>::with_capacity(neq, nx, neq);
    let mut be = Vec::with_capacity(neq);
    let mut eq_src = Vec::with_capacity(neq);
    let mut ai = Coo::<usize, f64>::with_capacity(niq, nx, 2 * a_mat.nnz() + niq);
    let mut bi = Vec::with_capacity(niq);
    let mut iq_src = Vec::with_capacity(niq);

    let rowptr = a_mat.rowptr();
    let colidx = a_mat.colidx();
    let values = a_mat.values();

    let mut push_row = |src: Src,
                        kind: Kind,
                        l: f64,
                        u: f64,
                        ae: &mut Coo<usize, f64>,
                        ai: &mut Coo<usize, f64>| {
        // One scaled copy of the source row per assembled row.
        let entries: Vec<(usize, f64)> = match src {
            Src::Bound(i) => vec![(i, 1.0)],
            Src::Linear(j) => (rowptr[j]..rowptr[j + 1])
                .map(|el| (colidx[el], values[el]))
                .collect(),
        };
        match kind {
            Kind::Free => {}
            Kind::Equality => {
                for &(c, v) in &entries {
                    ae.push(be.len(), c, v);
                }
                be.push(u);
                eq_src.push(src);
            }
            Kind::Inequality { upper, lower } => {
                if upper {
                    for &(c, v) in &entries {
                        ai.push(bi.len(), c, v);
                    }
                    bi.push(u);
                    iq_src.push((src, 1.0));
                }
                if lower {
                    for &(c, v) in &entries {
                        ai.push(bi.len(), c, -v);
                    }
                    bi.push(-l);
                    iq_src.push((src, -1.0));
                }
            }
        }
    };

    for i in 0..nx {
        push_row(
            Src::Bound(i),
            classify(lbx[i], ubx[i]),
            lbx[i],
            ubx[i],
            &mut ae,
            &mut ai,
        );
    }
    for j in 0..na {
        push_row(
            Src::Linear(j),
            classify(lba[j], uba[j]),
            lba[j],
            uba[j],
            &mut ae,
            &mut ai,
        );
    }

    Ok((ae.to_csr(), be, eq_src, ai.to_csr(), bi, iq_src))
}
