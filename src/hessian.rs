use crate::math::dot;
use anyhow::Result;
use sparsetools::coo::Coo;
use sparsetools::csr::CSR;
use std::iter::zip;

/// Initial approximation of the Lagrangian Hessian.
pub(crate) fn initial_hessian(nx: usize) -> CSR<usize, f64> {
    Coo::<usize, f64>::identity(nx).to_csr()
}

/// Damped BFGS update of the Hessian approximation:
///
/// ```txt
///     sk = x - x_old
///     yk = gLag - gLag_old
///     qk = Bk*sk
///     Bk = Bk + yk*yk'/(yk'*sk) - qk*qk'/(sk'*qk)
/// ```
///
/// When the curvature condition `yk'sk >= 0.2*sk'qk` is violated, `yk`
/// is replaced by a convex combination of `yk` and `qk` (Powell
/// damping) chosen such that the update keeps the approximation
/// positive definite.
pub(crate) fn bfgs_update(
    bk: &CSR<usize, f64>,
    x: &[f64],
    x_old: &[f64],
    glag: &[f64],
    glag_old: &[f64],
) -> Result<CSR<usize, f64>> {
    let sk: Vec<f64> = zip(x, x_old).map(|(xi, oi)| xi - oi).collect();
    let mut yk: Vec<f64> = zip(glag, glag_old).map(|(gi, oi)| gi - oi).collect();
    let qk = bk.mat_vec(&sk)?;

    let sk_qk = dot(&sk, &qk);
    if sk_qk <= 0.0 {
        // A zero step carries no curvature information.
        return Ok(bk.to_owned());
    }

    let mut sk_yk = dot(&sk, &yk);
    if sk_yk < 0.2 * sk_qk {
        let omega = 0.8 * sk_qk / (sk_qk - sk_yk);
        yk = zip(&yk, &qk)
            .map(|(&yi, &qi)| omega * yi + (1.0 - omega) * qi)
            .collect();
        sk_yk = dot(&sk, &yk);
    }
    let theta = 1.0 / sk_yk;
    let phi = 1.0 / sk_qk;

    let mut b = bk.to_coo().to_dense();
    for i in 0..b.len() {
        for j in 0..b[i].len() {
            b[i][j] += theta * yk[i] * yk[j] - phi * qk[i] * qk[j];
        }
    }
    Ok(CSR::from_dense(&b))
}

/// Zeroes all off-diagonal values of `h_mat`, preserving its
/// sparsity pattern.
pub(crate) fn drop_off_diagonal(h_mat: &CSR<usize, f64>) -> Result<CSR<usize, f64>> {
    let rowptr = h_mat.rowptr();
    let colidx = h_mat.colidx();
    let mut values = h_mat.values().to_vec();

    for r in 0..h_mat.rows() {
        for el in rowptr[r]..rowptr[r + 1] {
            if colidx[el] != r {
                values[el] = 0.0;
            }
        }
    }
    CSR::new(
        h_mat.rows(),
        h_mat.cols(),
        rowptr.to_vec(),
        colidx.to_vec(),
        values,
    )
}

/// Adds `reg` to every diagonal value of `h_mat`. The pattern must
/// contain the full diagonal.
pub(crate) fn add_to_diagonal(h_mat: &CSR<usize, f64>, reg: f64) -> Result<CSR<usize, f64>> {
    let rowptr = h_mat.rowptr();
    let colidx = h_mat.colidx();
    let mut values = h_mat.values().to_vec();

    for r in 0..h_mat.rows() {
        for el in rowptr[r]..rowptr[r + 1] {
            if colidx[el] == r {
                values[el] += reg;
            }
        }
    }
    CSR::new(
        h_mat.rows(),
        h_mat.cols(),
        rowptr.to_vec(),
        colidx.to_vec(),
        values,
    )
}

/// Uniform diagonal shift that makes the Gershgorin eigenvalue bound
/// of `h_mat` non-negative: `-min(0, min_r(h_rr - sum |h_rc|))`.
/// Zero when the bound already certifies positive semidefiniteness.
pub(crate) fn gershgorin_regularization(h_mat: &CSR<usize, f64>) -> f64 {
    let rowptr = h_mat.rowptr();
    let colidx = h_mat.colidx();
    let values = h_mat.values();

    let mut reg_param = 0.0;
    for r in 0..h_mat.rows() {
        let mut mineig = 0.0;
        for el in rowptr[r]..rowptr[r + 1] {
            if colidx[el] == r {
                mineig += values[el];
            } else {
                mineig -= values[el].abs();
            }
        }
        reg_param = f64::min(reg_param, mineig);
    }
    -reg_param
}
