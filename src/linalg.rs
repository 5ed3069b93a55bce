/// Dense matrix operators and a direct LU solver
pub mod dense;
/// Preconditioned Conjugate Gradient solver and Jacobi preconditioner
pub mod pcg;
/// Sparsely Packed Symmetric Matrix
pub mod sparse_matrix;

use crate::error::Result;
use crate::scalar::Scalar;
use nalgebra::{DMatrix, DVector};

/// The minimal set of capabilities the eigen-analysis needs from an assembled operator.
///
/// Stiffness, mass and geometric-stiffness matrices may be stored in any representation that implements this trait;
/// the shift-invert operator only ever copies, scales-and-adds, and applies them.
pub trait LinearOperator<T: Scalar> {
    /// Number of rows (and columns) of the square operator
    fn dimension(&self) -> usize;

    /// `y = self * x`
    fn mult(&self, x: &DVector<T>, y: &mut DVector<T>);

    /// Overwrite the entries of `self` with those of `other`
    fn copy_values(&mut self, other: &Self);

    /// `self += alpha * other`
    fn axpy(&mut self, alpha: T, other: &Self);

    /// Remove all entries, keeping the dimension
    fn zero_entries(&mut self);

    /// Main diagonal of the operator
    fn diagonal(&self) -> DVector<T>;
}

/// Operators which can be expanded into a dense matrix for direct factorization
pub trait DenseForm<T: Scalar> {
    fn to_dense(&self) -> DMatrix<T>;
}

/// A linear-system solver for operators of type `M`
///
/// `factor` sets the operator and performs any factorization or setup; `solve` may then be called any number of times.
/// A solve which does not reach the solver's tolerance must return [crate::EigenError::LinearSolveFailure].
pub trait LinearSolver<T: Scalar, M> {
    fn factor(&mut self, mat: &M) -> Result<()>;

    fn solve(&self, rhs: &DVector<T>, x: &mut DVector<T>) -> Result<()>;
}

/// A preconditioner which can be attached to an iterative [LinearSolver]
pub trait Preconditioner<T: Scalar, M> {
    fn factor(&mut self, mat: &M) -> Result<()>;

    /// `z = P^{-1} r`
    fn apply(&self, r: &DVector<T>, z: &mut DVector<T>);
}
