use super::{DenseForm, LinearOperator, LinearSolver};
use crate::error::{EigenError, Result};
use crate::scalar::{norm, Scalar};

use nalgebra::{DMatrix, DVector, LU};

// TODO: factor large shifted operators with nalgebra-sparse instead of densifying them
const MAX_DENSE_SIZE: usize = 5000;

impl<T: Scalar> LinearOperator<T> for DMatrix<T> {
    fn dimension(&self) -> usize {
        self.nrows()
    }

    fn mult(&self, x: &DVector<T>, y: &mut DVector<T>) {
        self.mul_to(x, y);
    }

    fn copy_values(&mut self, other: &Self) {
        self.copy_from(other);
    }

    fn axpy(&mut self, alpha: T, other: &Self) {
        for (a, b) in self.iter_mut().zip(other.iter()) {
            *a += alpha * *b;
        }
    }

    fn zero_entries(&mut self) {
        self.fill(T::zero());
    }

    fn diagonal(&self) -> DVector<T> {
        DMatrix::diagonal(self)
    }
}

impl<T: Scalar> DenseForm<T> for DMatrix<T> {
    fn to_dense(&self) -> DMatrix<T> {
        self.clone()
    }
}

/// Direct solver using Nalgebra's LU decomposition with partial pivoting.
///
/// Suitable for small and moderately sized problems, and for shifts that make the operator indefinite.
/// After each solve the relative residual is checked against `rtol`; a singular or badly conditioned
/// shifted operator is reported as a [EigenError::LinearSolveFailure] instead of returning garbage.
pub struct DenseLuSolver<T: Scalar> {
    lu: Option<LU<T, nalgebra::Dynamic, nalgebra::Dynamic>>,
    mat: Option<DMatrix<T>>,
    rtol: f64,
}

impl<T: Scalar> DenseLuSolver<T> {
    pub fn new() -> Self {
        Self::with_tolerance(1e-8)
    }

    pub fn with_tolerance(rtol: f64) -> Self {
        Self {
            lu: None,
            mat: None,
            rtol,
        }
    }
}

impl<T: Scalar> Default for DenseLuSolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> DenseLuSolver<T> {
    /// Solve with the current factorization, checking the relative residual
    pub fn solve(&self, rhs: &DVector<T>, x: &mut DVector<T>) -> Result<()> {
        let (lu, mat) = match (&self.lu, &self.mat) {
            (Some(lu), Some(mat)) => (lu, mat),
            _ => return Err(EigenError::solve_failure("LU solver used before factor")),
        };

        let solution = lu
            .solve(rhs)
            .ok_or_else(|| EigenError::solve_failure("Shifted operator is singular"))?;

        let rhs_norm = norm(rhs);
        let res_norm = norm(&(mat * &solution - rhs));
        if !res_norm.is_finite() || res_norm > self.rtol * rhs_norm.max(f64::MIN_POSITIVE) {
            return Err(EigenError::solve_failure(format!(
                "LU solve residual {:.3e} exceeds tolerance {:.3e}",
                res_norm / rhs_norm,
                self.rtol
            )));
        }

        x.copy_from(&solution);
        Ok(())
    }
}

impl<T: Scalar, M: DenseForm<T>> LinearSolver<T, M> for DenseLuSolver<T> {
    fn factor(&mut self, mat: &M) -> Result<()> {
        let dense = mat.to_dense();
        if dense.nrows() > MAX_DENSE_SIZE {
            return Err(EigenError::solve_failure(format!(
                "Matrix exceeded maximum dense size ({}x{})",
                MAX_DENSE_SIZE, MAX_DENSE_SIZE
            )));
        }

        self.lu = Some(dense.clone().lu());
        self.mat = Some(dense);
        Ok(())
    }

    fn solve(&self, rhs: &DVector<T>, x: &mut DVector<T>) -> Result<()> {
        DenseLuSolver::solve(self, rhs, x)
    }
}
