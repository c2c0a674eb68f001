//! Linear-quadratic regulator gains.
//!
//! The continuous algebraic Riccati equation is solved with the
//! Arimoto-Potter method: the stable invariant subspace of the Hamiltonian
//!
//! ```text
//! H = [  A   -B R^-1 B^T ]
//!     [ -Q   -A^T        ]
//! ```
//!
//! is spanned by `[V1; V2]`, and `S = Re(V2 V1^-1)`. This is a dense
//! eigen-decomposition, so it only ever runs when a controller is built.

use bevy::log::debug;
use na::{Complex, DMatrix, SMatrix, SVector};

use crate::error::{Result, SimError};
use crate::linalg::{eigen_decomposition, inverse};

/// Below this reciprocal condition number `V1` is treated as singular.
const MIN_RCOND: f64 = 1e-10;

/// Solve the CARE `A^T S + S A - S B R^-1 B^T S + Q = 0` for `S`.
pub fn solve_care(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
) -> Result<DMatrix<f64>> {
    let n = a.nrows();
    let m = b.ncols();
    check_dims(a, b, q, r)?;

    let r_inv = inverse(r)?;
    let mut ham = DMatrix::<f64>::zeros(2 * n, 2 * n);
    ham.view_mut((0, 0), (n, n)).copy_from(a);
    ham.view_mut((0, n), (n, n))
        .copy_from(&(-(b * &r_inv * b.transpose())));
    ham.view_mut((n, 0), (n, n)).copy_from(&(-q));
    ham.view_mut((n, n), (n, n)).copy_from(&(-a.transpose()));

    let eig = eigen_decomposition(&ham)?;
    let stable: Vec<usize> = (0..2 * n).filter(|&i| eig.values[i].re < 0.0).collect();
    if stable.len() != n {
        return Err(SimError::Riccati(format!(
            "expected {} stable Hamiltonian eigenvalues, found {} ({}x{} system not stabilizable with these weights)",
            n,
            stable.len(),
            n,
            m
        )));
    }

    let mut v = DMatrix::<Complex<f64>>::zeros(2 * n, n);
    for (col, &i) in stable.iter().enumerate() {
        v.set_column(col, &eig.vectors.column(i));
    }
    let v1 = v.rows(0, n).into_owned();
    let v2 = v.rows(n, n).into_owned();
    let sv = v1.clone().singular_values();
    let (sv_min, sv_max) = (sv.min(), sv.max());
    if !(sv_max > 0.0 && sv_min / sv_max > MIN_RCOND) {
        return Err(SimError::Riccati("stable eigenvector block is singular".into()));
    }
    let v1_inv = inverse(&v1)
        .map_err(|_| SimError::Riccati("stable eigenvector block is singular".into()))?;

    Ok((v2 * v1_inv).map(|c| c.re))
}

/// Optimal state feedback `K = R^-1 B^T S` for `x' = Ax + Bu`, `u = -Kx`.
pub fn lqr_gain(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
) -> Result<DMatrix<f64>> {
    let s = solve_care(a, b, q, r)?;
    let k = inverse(r)? * b.transpose() * s;
    if k.iter().any(|x| !x.is_finite()) {
        return Err(SimError::Riccati("gain has non-finite entries".into()));
    }
    debug!(
        "solved LQR gain for {}-state, {}-input model",
        a.nrows(),
        b.ncols()
    );
    Ok(k)
}

/// Fixed-size front end to [`lqr_gain`].
pub fn lqr<const N: usize, const M: usize>(
    a: &SMatrix<f64, N, N>,
    b: &SMatrix<f64, N, M>,
    q: &SMatrix<f64, N, N>,
    r: &SMatrix<f64, M, M>,
) -> Result<SMatrix<f64, M, N>> {
    let k = lqr_gain(&dynamic(a), &dynamic(b), &dynamic(q), &dynamic(r))?;
    Ok(SMatrix::<f64, M, N>::from_column_slice(k.as_slice()))
}

fn dynamic<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> DMatrix<f64> {
    DMatrix::from_column_slice(R, C, m.as_slice())
}

fn check_dims(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
) -> Result<()> {
    let n = a.nrows();
    let m = b.ncols();
    if !a.is_square() {
        return Err(SimError::Dimension(format!(
            "A must be square, got {}x{}",
            a.nrows(),
            a.ncols()
        )));
    }
    if b.nrows() != n {
        return Err(SimError::Dimension(format!(
            "B must have {} rows, got {}",
            n,
            b.nrows()
        )));
    }
    if q.shape() != (n, n) {
        return Err(SimError::Dimension(format!(
            "Q must be {}x{}, got {:?}",
            n,
            n,
            q.shape()
        )));
    }
    if r.shape() != (m, m) {
        return Err(SimError::Dimension(format!(
            "R must be {}x{}, got {:?}",
            m,
            m,
            r.shape()
        )));
    }
    Ok(())
}

/// A linear model `x' = Ax + Bu` closed with a precomputed LQR gain.
#[derive(Debug, Clone)]
pub struct LqrModel<const N: usize, const M: usize> {
    a: SMatrix<f64, N, N>,
    b: SMatrix<f64, N, M>,
    k: SMatrix<f64, M, N>,
}

impl<const N: usize, const M: usize> LqrModel<N, M> {
    pub fn new(
        a: SMatrix<f64, N, N>,
        b: SMatrix<f64, N, M>,
        q: SMatrix<f64, N, N>,
        r: SMatrix<f64, M, M>,
    ) -> Result<Self> {
        let k = lqr(&a, &b, &q, &r)?;
        Ok(Self { a, b, k })
    }

    pub fn gain(&self) -> &SMatrix<f64, M, N> {
        &self.k
    }

    /// `u = -K (x - x_goal)`
    pub fn control(&self, x: &SVector<f64, N>, x_goal: &SVector<f64, N>) -> SVector<f64, M> {
        -(self.k * (x - x_goal))
    }

    /// `x' = A x + B u`
    pub fn derivative(&self, x: &SVector<f64, N>, u: &SVector<f64, M>) -> SVector<f64, N> {
        self.a * x + self.b * u
    }

    /// One explicit Euler step of the closed loop.
    pub fn step(&self, x: &SVector<f64, N>, x_goal: &SVector<f64, N>, dt: f64) -> SVector<f64, N> {
        let u = self.control(x, x_goal);
        x + self.derivative(x, &u) * dt
    }

    /// `A - B K`
    pub fn closed_loop(&self) -> SMatrix<f64, N, N> {
        self.a - self.b * self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::eigen_decomposition;
    use approx::assert_abs_diff_eq;
    use na::{Matrix1, Matrix2, Vector2};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn double_integrator() -> (Matrix2<f64>, SMatrix<f64, 2, 1>, Matrix2<f64>, Matrix1<f64>) {
        (
            Matrix2::new(0.0, 1.0, 0.0, 0.0),
            SMatrix::<f64, 2, 1>::new(0.0, 1.0),
            Matrix2::identity(),
            Matrix1::new(1.0),
        )
    }

    #[test]
    fn double_integrator_gain_matches_closed_form() {
        let (a, b, q, r) = double_integrator();
        let k = lqr(&a, &b, &q, &r).unwrap();

        assert!(k.iter().all(|x| x.is_finite()));
        assert_abs_diff_eq!(k[(0, 0)], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(k[(0, 1)], 3.0_f64.sqrt(), epsilon = 1e-6);

        let closed = a - b * k;
        for lambda in closed.complex_eigenvalues().iter() {
            assert!(lambda.re < 0.0, "closed loop pole {} is not stable", lambda);
        }
    }

    #[test]
    fn care_residual_vanishes() {
        let a = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0, -1.0, 0.5, 0.2]);
        let b = DMatrix::from_row_slice(3, 1, &[0.0, 0.0, 1.0]);
        let q = DMatrix::from_diagonal(&na::DVector::from_vec(vec![10.0, 1.0, 1.0]));
        let r = DMatrix::from_element(1, 1, 0.5);

        let s = solve_care(&a, &b, &q, &r).unwrap();
        let r_inv = inverse(&r).unwrap();
        let residual =
            a.transpose() * &s + &s * &a - &s * &b * r_inv * b.transpose() * &s + &q;
        assert!(residual.norm() < 1e-6, "residual {}", residual.norm());

        // S is symmetric positive definite.
        assert_abs_diff_eq!(s.clone(), s.transpose(), epsilon = 1e-6);
        assert!(s.clone().cholesky().is_some());
    }

    #[test]
    fn solve_is_deterministic() {
        let (a, b, q, r) = double_integrator();
        let k1 = lqr(&a, &b, &q, &r).unwrap();
        let k2 = lqr(&a, &b, &q, &r).unwrap();
        assert_abs_diff_eq!(k1, k2, epsilon = 1e-5);
    }

    #[test]
    fn uncontrollable_unstable_mode_is_rejected() {
        // The second state diverges and the input cannot reach it.
        let a = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, 1.0]);
        let b = DMatrix::from_row_slice(2, 1, &[1.0, 0.0]);
        let q = DMatrix::identity(2, 2);
        let r = DMatrix::identity(1, 1);

        assert!(matches!(lqr_gain(&a, &b, &q, &r), Err(SimError::Riccati(_))));
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let a = DMatrix::identity(2, 2);
        let b = DMatrix::from_row_slice(3, 1, &[0.0, 0.0, 1.0]);
        let q = DMatrix::identity(2, 2);
        let r = DMatrix::identity(1, 1);

        assert!(matches!(lqr_gain(&a, &b, &q, &r), Err(SimError::Dimension(_))));
    }

    #[test]
    fn model_step_moves_toward_goal() {
        let (a, b, q, r) = double_integrator();
        let model = LqrModel::new(a, b, q, r).unwrap();

        let goal = Vector2::new(1.0, 0.0);
        let mut x = Vector2::zeros();
        for _ in 0..600 {
            x = model.step(&x, &goal, 1.0 / 60.0);
        }
        assert_abs_diff_eq!(x, goal, epsilon = 1e-2);
    }

    #[test]
    fn random_systems_solve_and_stabilize() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for n in 2..=8 {
            for m in 1..=n.min(3) {
                for trial in 0..20 {
                    let a = DMatrix::<f64>::from_fn(n, n, |_, _| rng.random_range(-1.0..1.0));
                    let b = DMatrix::<f64>::from_fn(n, m, |_, _| rng.random_range(-1.0..1.0));
                    let q = DMatrix::identity(n, n);
                    let r = DMatrix::identity(m, m);

                    let s = solve_care(&a, &b, &q, &r)
                        .unwrap_or_else(|e| panic!("n{} m{} trial {}: {}", n, m, trial, e));
                    let residual =
                        a.transpose() * &s + &s * &a - &s * &b * b.transpose() * &s + &q;
                    assert!(
                        residual.norm() < 1e-6 * (1.0 + s.norm()),
                        "n{} m{} trial {}: residual {}",
                        n,
                        m,
                        trial,
                        residual.norm()
                    );

                    let k = b.transpose() * &s;
                    let closed = &a - &b * k;
                    let poles = eigen_decomposition(&closed).unwrap().values;
                    for lambda in poles {
                        assert!(
                            lambda.re < 0.0,
                            "n{} m{} trial {}: closed loop pole {}",
                            n,
                            m,
                            trial,
                            lambda
                        );
                    }
                }
            }
        }
    }
}
