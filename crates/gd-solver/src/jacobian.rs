//! Finite difference Jacobians, used to check the analytic iteration matrix.

use gd_components::{SolverMode, StateData};
use gd_core::numeric::{Tolerances, nearly_equal};
use nalgebra::{DMatrix, DVector};

use crate::assembly;
use crate::error::SolverResult;
use crate::host::ComponentHost;
use crate::offsets::OffsetRegistry;

/// Difference scheme and relative step for a numerical Jacobian.
///
/// The step for column `j` is `epsilon * max(|x[j]|, 1)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Difference {
    /// One extra residual per column, first order accurate.
    Forward { epsilon: f64 },
    /// Two extra residuals per column, second order accurate.
    Central { epsilon: f64 },
}

impl Default for Difference {
    fn default() -> Self {
        Difference::Central { epsilon: 1e-6 }
    }
}

impl Difference {
    fn epsilon(self) -> f64 {
        match self {
            Difference::Forward { epsilon } | Difference::Central { epsilon } => epsilon,
        }
    }
}

/// Column-by-column numerical Jacobian of `f` at `x`.
fn difference_jacobian<F>(x: &DVector<f64>, f: F, scheme: Difference) -> SolverResult<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let base = f(x)?;
    let mut jac = DMatrix::zeros(base.len(), x.len());
    let mut shifted = x.clone();

    for j in 0..x.len() {
        let h = scheme.epsilon() * x[j].abs().max(1.0);
        shifted[j] = x[j] + h;
        let upper = f(&shifted)?;
        let column = match scheme {
            Difference::Forward { .. } => (upper - &base) / h,
            Difference::Central { .. } => {
                shifted[j] = x[j] - h;
                (upper - f(&shifted)?) / (2.0 * h)
            }
        };
        shifted[j] = x[j];
        jac.set_column(j, &column);
    }

    Ok(jac)
}

/// Numerical `∂F/∂x + cj·∂F/∂x'` of the global residual at `(state, dstate)`.
///
/// Inputs are re-evaluated through the host for every perturbation, so cross-component
/// couplings appear in the result.
#[allow(clippy::too_many_arguments)]
pub fn iteration_matrix_fd<H: ComponentHost + ?Sized>(
    host: &H,
    registry: &OffsetRegistry,
    time: f64,
    state: &[f64],
    dstate: &[f64],
    cj: f64,
    mode: SolverMode,
    scheme: Difference,
) -> SolverResult<DMatrix<f64>> {
    let x = DVector::from_column_slice(state);
    let xp = DVector::from_column_slice(dstate);

    let in_x = |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
        let sd = StateData::new(time, x.as_slice(), dstate, cj);
        Ok(DVector::from_vec(assembly::residual(host, registry, &sd, mode)?))
    };
    let in_xp = |xp: &DVector<f64>| -> SolverResult<DVector<f64>> {
        let sd = StateData::new(time, state, xp.as_slice(), cj);
        Ok(DVector::from_vec(assembly::residual(host, registry, &sd, mode)?))
    };

    let jx = difference_jacobian(&x, in_x, scheme)?;
    let jxp = difference_jacobian(&xp, in_xp, scheme)?;
    Ok(jx + jxp * cj)
}

/// First `(row, col)` where two matrices disagree beyond `tol`, scanning row-major.
///
/// Matrices of different shape disagree at `(0, 0)`.
pub fn first_mismatch(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    tol: Tolerances,
) -> Option<(usize, usize)> {
    if a.shape() != b.shape() {
        return Some((0, 0));
    }
    (0..a.nrows())
        .flat_map(|r| (0..a.ncols()).map(move |c| (r, c)))
        .find(|&(r, c)| !nearly_equal(a[(r, c)], b[(r, c)], tol))
}

#[cfg(test)]
mod tests {
    use super::*;

    // f(x) = (x0·x1, sin x0 + x1³)
    fn model(x: &DVector<f64>) -> SolverResult<DVector<f64>> {
        Ok(DVector::from_vec(vec![x[0] * x[1], x[0].sin() + x[1].powi(3)]))
    }

    fn exact(x: &DVector<f64>) -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 2, &[x[1], x[0], x[0].cos(), 3.0 * x[1] * x[1]])
    }

    #[test]
    fn central_is_tighter_than_forward() {
        let x = DVector::from_vec(vec![0.7, -1.3]);
        let want = exact(&x);
        let fwd = difference_jacobian(&x, model, Difference::Forward { epsilon: 1e-6 }).unwrap();
        let ctr = difference_jacobian(&x, model, Difference::default()).unwrap();

        let loose = Tolerances { abs: 1e-5, rel: 1e-5 };
        let tight = Tolerances { abs: 1e-8, rel: 1e-8 };
        assert_eq!(first_mismatch(&want, &fwd, loose), None);
        assert_eq!(first_mismatch(&want, &ctr, tight), None);
        assert!(first_mismatch(&want, &fwd, tight).is_some());
    }

    #[test]
    fn mismatch_reports_first_offending_entry() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let mut b = a.clone();
        b[(1, 0)] = 3.1;
        b[(1, 1)] = 4.1;
        assert_eq!(first_mismatch(&a, &b, Tolerances::default()), Some((1, 0)));
        assert_eq!(first_mismatch(&a, &DMatrix::zeros(3, 2), Tolerances::default()), Some((0, 0)));
    }
}
