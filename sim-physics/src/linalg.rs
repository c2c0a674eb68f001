//! Dense linear algebra needed by the Riccati solver.
//!
//! nalgebra gives us the real Schur form (and from it the eigenvalues) of a
//! non-symmetric matrix, but no eigenvectors. Those are recovered here as the
//! null space of the shifted matrix, via SVD.

use na::{Complex, DMatrix, linalg::Schur, linalg::SVD};

use crate::error::{Result, SimError};

/// Relative distance under which two eigenvalues are treated as one cluster.
const CLUSTER_TOL: f64 = 1e-6;
const MAX_ITERATIONS: usize = 10_000;
/// Schur deflation tolerances, tried in order until the iteration converges.
/// Full precision can stall on a sub-diagonal entry that sits at rounding
/// level relative to its neighbours.
const SCHUR_TOLERANCES: [f64; 4] = [f64::EPSILON, 1e-13, 1e-11, 1e-9];

/// Eigenvalues and (generalised) eigenvectors of a real square matrix.
///
/// Column `i` of `vectors` belongs to `values[i]`.
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    pub values: Vec<Complex<f64>>,
    pub vectors: DMatrix<Complex<f64>>,
}

/// Invert a square matrix, real or complex.
pub fn inverse<T: na::ComplexField>(m: &DMatrix<T>) -> Result<DMatrix<T>> {
    if !m.is_square() {
        return Err(SimError::Dimension(format!(
            "cannot invert a {}x{} matrix",
            m.nrows(),
            m.ncols()
        )));
    }
    m.clone().try_inverse().ok_or(SimError::Singular)
}

/// Lift a real matrix into the complex field.
pub fn to_complex(m: &DMatrix<f64>) -> DMatrix<Complex<f64>> {
    m.map(|x| Complex::new(x, 0.0))
}

/// Eigen-decomposition of a real, not necessarily symmetric, square matrix.
///
/// Eigenvalues that coincide numerically are grouped; a cluster of `k` values
/// gets `k` basis vectors of the null space of `(M - λI)^k`. For a simple
/// eigenvalue that is just its eigenvector, for a repeated one it spans the
/// generalised eigenspace, so the columns always span the invariant subspace
/// of the selected eigenvalues.
pub fn eigen_decomposition(m: &DMatrix<f64>) -> Result<EigenDecomposition> {
    if !m.is_square() {
        return Err(SimError::Dimension(format!(
            "eigen-decomposition of a {}x{} matrix",
            m.nrows(),
            m.ncols()
        )));
    }
    if m.iter().any(|x| !x.is_finite()) {
        return Err(SimError::Eigen("matrix has non-finite entries".into()));
    }

    let n = m.nrows();
    let schur = SCHUR_TOLERANCES
        .iter()
        .find_map(|&eps| Schur::try_new(m.clone(), eps, MAX_ITERATIONS))
        .ok_or_else(|| SimError::Eigen("Schur iteration did not converge".into()))?;
    let values: Vec<Complex<f64>> = schur.complex_eigenvalues().iter().copied().collect();

    let mc = to_complex(m);
    let mut vectors = DMatrix::<Complex<f64>>::zeros(n, n);
    let mut assigned = vec![false; n];

    for i in 0..n {
        if assigned[i] {
            continue;
        }
        let scale = 1.0 + values[i].norm();
        let cluster: Vec<usize> = (i..n)
            .filter(|&j| !assigned[j] && (values[j] - values[i]).norm() <= CLUSTER_TOL * scale)
            .collect();
        let k = cluster.len();
        let mean = cluster.iter().map(|&j| values[j]).sum::<Complex<f64>>() / k as f64;

        let basis = null_space(&mc, mean, k)?;
        for (col, &j) in cluster.iter().enumerate() {
            vectors.set_column(j, &basis.column(col));
            assigned[j] = true;
        }
    }

    Ok(EigenDecomposition { values, vectors })
}

/// The `k` right singular vectors of `(M - λI)^k` with the smallest singular
/// values, as columns.
fn null_space(
    m: &DMatrix<Complex<f64>>,
    lambda: Complex<f64>,
    k: usize,
) -> Result<DMatrix<Complex<f64>>> {
    let n = m.nrows();
    let shifted = m - DMatrix::from_diagonal_element(n, n, lambda);
    let mut power = shifted.clone();
    for _ in 1..k {
        power = &power * &shifted;
    }

    let svd = SVD::try_new(power, false, true, f64::EPSILON, MAX_ITERATIONS)
        .ok_or_else(|| SimError::Eigen("SVD did not converge".into()))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| SimError::Eigen("SVD returned no right singular vectors".into()))?;

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[a].total_cmp(&svd.singular_values[b]));

    let mut basis = DMatrix::<Complex<f64>>::zeros(n, k);
    for (col, &row) in order.iter().take(k).enumerate() {
        // Rows of V^H are the conjugated right singular vectors.
        let v = v_t.row(row).adjoint();
        basis.set_column(col, &v);
    }
    Ok(basis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_eigenpairs(m: &DMatrix<f64>, eig: &EigenDecomposition) {
        let mc = to_complex(m);
        for (i, lambda) in eig.values.iter().enumerate() {
            let v = eig.vectors.column(i).into_owned();
            let residual = &mc * &v - &v * *lambda;
            assert!(
                residual.norm() < 1e-8,
                "eigenpair {} off by {}",
                i,
                residual.norm()
            );
        }
    }

    #[test]
    fn rotation_generator_has_imaginary_pair() {
        let m = DMatrix::from_row_slice(2, 2, &[0.0, -1.0, 1.0, 0.0]);
        let eig = eigen_decomposition(&m).unwrap();

        let mut imag: Vec<f64> = eig.values.iter().map(|v| v.im).collect();
        imag.sort_by(f64::total_cmp);
        assert_abs_diff_eq!(imag[0], -1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(imag[1], 1.0, epsilon = 1e-10);
        for v in &eig.values {
            assert_abs_diff_eq!(v.re, 0.0, epsilon = 1e-10);
        }
        assert_eigenpairs(&m, &eig);
    }

    #[test]
    fn non_symmetric_matrix() {
        let m = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, -2.0, 0.5, 3.0, 1.0, -1.0, 2.0, 1.0]);
        let eig = eigen_decomposition(&m).unwrap();
        assert_eq!(eig.values.len(), 3);

        let trace: Complex<f64> = eig.values.iter().sum();
        assert_abs_diff_eq!(trace.re, 8.0, epsilon = 1e-9);
        assert_abs_diff_eq!(trace.im, 0.0, epsilon = 1e-9);
        assert_eigenpairs(&m, &eig);
    }

    #[test]
    fn repeated_eigenvalue_gets_independent_vectors() {
        // Two identical, decoupled 2x2 blocks.
        #[rustfmt::skip]
        let m = DMatrix::from_row_slice(4, 4, &[
            -1.0, 2.0, 0.0, 0.0,
             0.0, -3.0, 0.0, 0.0,
             0.0, 0.0, -1.0, 2.0,
             0.0, 0.0, 0.0, -3.0,
        ]);
        let eig = eigen_decomposition(&m).unwrap();
        assert_eigenpairs(&m, &eig);

        let det = eig.vectors.determinant();
        assert!(det.norm() > 1e-6, "eigenvectors are not independent");
    }

    #[test]
    fn inverse_of_singular_matrix_fails() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert_eq!(inverse(&m), Err(SimError::Singular));

        let rect = DMatrix::<f64>::zeros(2, 3);
        assert!(matches!(inverse(&rect), Err(SimError::Dimension(_))));
    }

    #[test]
    fn inverse_round_trips_to_identity() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]);
        let inv = inverse(&m).unwrap();
        let id = &m * &inv;
        assert_abs_diff_eq!(id, DMatrix::<f64>::identity(2, 2), epsilon = 1e-12);
    }
}
