//! The shift-and-invert operator which the Lanczos engine iterates with.
//!
//! For the generalized problem `A x = lambda B x` and a shift `sigma`, two transformations are supported:
//!
//! * [SpectralTransform::Regular]: `C = (A - sigma B)^{-1} B`, self-adjoint in the `B` inner product, with
//!   `theta = 1 / (lambda - sigma)`. Used for vibration (`A = K`, `B = M`).
//! * [SpectralTransform::Buckling]: `C = (A - sigma B)^{-1} A`, self-adjoint in the `A` inner product, with
//!   `theta = lambda / (lambda - sigma)`. Used for buckling (`A = K`, `B = G`) where only `K` is positive definite.
//!
//! In both cases eigenvalues closest to the shift become the largest-magnitude eigenvalues of `C`.

use crate::error::{EigenError, Result};
use crate::linalg::{LinearOperator, LinearSolver};
use crate::scalar::{axpy, norm, Scalar};

use nalgebra::DVector;
use std::marker::PhantomData;

/// Which spectral transformation maps physical eigenvalues onto the iterated operator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpectralTransform {
    Regular,
    Buckling,
}

impl SpectralTransform {
    /// Map a Ritz value of the transformed operator back to a physical eigenvalue
    pub fn eigenvalue<T: Scalar>(&self, sigma: T, theta: T) -> T {
        match self {
            Self::Regular => sigma + T::one() / theta,
            Self::Buckling => sigma * theta / (theta - T::one()),
        }
    }

    /// Map a physical eigenvalue onto the spectrum of the transformed operator
    pub fn transformed<T: Scalar>(&self, sigma: T, lambda: T) -> T {
        match self {
            Self::Regular => T::one() / (lambda - sigma),
            Self::Buckling => lambda / (lambda - sigma),
        }
    }
}

/// The operator abstraction consumed by the Lanczos engine
///
/// `apply` is `C x = solve_shifted(metric_mult(x))`; the inner product in which `C` is self-adjoint is `x^T W y`
/// where `W` is the operator applied by `metric_mult`.
pub trait EigenOperator<T: Scalar> {
    fn dimension(&self) -> usize;

    /// `y = W x` for the inner-product (metric) operator `W`
    fn metric_mult(&self, x: &DVector<T>, y: &mut DVector<T>);

    /// `x = (A - sigma B)^{-1} rhs`
    fn solve_shifted(&self, rhs: &DVector<T>, x: &mut DVector<T>) -> Result<()>;

    /// `y = C x`
    fn apply(&self, x: &DVector<T>, y: &mut DVector<T>) -> Result<()> {
        let mut wx = DVector::zeros(x.len());
        self.metric_mult(x, &mut wx);
        self.solve_shifted(&wx, y)
    }

    /// Physical eigenvalue corresponding to a Ritz value `theta` of `C`
    fn eigenvalue(&self, theta: T) -> T;

    /// Ritz value of `C` corresponding to a physical eigenvalue
    fn transformed(&self, lambda: T) -> T;

    /// Relative generalized residual `||A x - lambda B x|| / (|lambda| ||B x||)`
    fn residual_error(&self, lambda: T, x: &DVector<T>) -> f64;
}

/// Shift-and-invert operator around a pair of governing operators.
///
/// Owns the governing operators `A` and `B`, an auxiliary operator which holds `A - sigma B`, and the
/// linear solver used to invert it. The auxiliary buffer is overwritten every time the operator is
/// factored, so it is never shared between analyses.
pub struct ShiftInvertOperator<T: Scalar, M, S> {
    a: M,
    b: M,
    aux: M,
    solver: S,
    sigma: T,
    transform: SpectralTransform,
    factored: bool,
    _scalar: PhantomData<T>,
}

impl<T, M, S> ShiftInvertOperator<T, M, S>
where
    T: Scalar,
    M: LinearOperator<T>,
    S: LinearSolver<T, M>,
{
    pub fn new(a: M, b: M, aux: M, solver: S, sigma: T, transform: SpectralTransform) -> Self {
        assert!(
            a.dimension() == b.dimension() && a.dimension() == aux.dimension(),
            "Governing operators must have matching dimensions; cannot construct ShiftInvertOperator!"
        );

        Self {
            a,
            b,
            aux,
            solver,
            sigma,
            transform,
            factored: false,
            _scalar: PhantomData,
        }
    }

    pub fn sigma(&self) -> T {
        self.sigma
    }

    /// Set a new shift. The operator must be re-factored before it is applied again.
    pub fn set_sigma(&mut self, sigma: T) {
        self.sigma = sigma;
        self.factored = false;
    }

    pub fn transform(&self) -> SpectralTransform {
        self.transform
    }

    pub fn is_factored(&self) -> bool {
        self.factored
    }

    pub fn a(&self) -> &M {
        &self.a
    }

    pub fn b(&self) -> &M {
        &self.b
    }

    /// Mutable access to `A` and `B` for re-assembly; invalidates the factorization.
    pub fn operators_mut(&mut self) -> (&mut M, &mut M) {
        self.factored = false;
        (&mut self.a, &mut self.b)
    }

    /// Mutable access to the linear solver (e.g. to factor a different operator); invalidates the factorization.
    pub fn solver_mut(&mut self) -> &mut S {
        self.factored = false;
        &mut self.solver
    }

    /// Form `A - sigma B` in the auxiliary buffer and factor it
    pub fn factor(&mut self) -> Result<()> {
        self.factored = false;
        self.aux.copy_values(&self.a);
        self.aux.axpy(-self.sigma, &self.b);
        self.solver.factor(&self.aux)?;
        self.factored = true;
        Ok(())
    }

    /// Solve `A x = rhs` with the solver, leaving the shifted factorization invalid
    pub fn solve_unshifted(&mut self, rhs: &DVector<T>, x: &mut DVector<T>) -> Result<()> {
        self.factored = false;
        self.solver.factor(&self.a)?;
        self.solver.solve(rhs, x)
    }

    /// Copy of the generalized residual `A x - lambda B x`
    pub fn residual(&self, lambda: T, x: &DVector<T>) -> DVector<T> {
        let mut ax = DVector::zeros(x.len());
        let mut bx = DVector::zeros(x.len());
        self.a.mult(x, &mut ax);
        self.b.mult(x, &mut bx);
        axpy(-lambda, &bx, &mut ax);
        ax
    }
}

impl<T, M, S> EigenOperator<T> for ShiftInvertOperator<T, M, S>
where
    T: Scalar,
    M: LinearOperator<T>,
    S: LinearSolver<T, M>,
{
    fn dimension(&self) -> usize {
        self.a.dimension()
    }

    fn metric_mult(&self, x: &DVector<T>, y: &mut DVector<T>) {
        match self.transform {
            SpectralTransform::Regular => self.b.mult(x, y),
            SpectralTransform::Buckling => self.a.mult(x, y),
        }
    }

    fn solve_shifted(&self, rhs: &DVector<T>, x: &mut DVector<T>) -> Result<()> {
        if !self.factored {
            return Err(EigenError::NotFactored);
        }
        self.solver.solve(rhs, x)
    }

    fn eigenvalue(&self, theta: T) -> T {
        self.transform.eigenvalue(self.sigma, theta)
    }

    fn transformed(&self, lambda: T) -> T {
        self.transform.transformed(self.sigma, lambda)
    }

    fn residual_error(&self, lambda: T, x: &DVector<T>) -> f64 {
        let mut bx = DVector::zeros(x.len());
        self.b.mult(x, &mut bx);
        let res_norm = norm(&self.residual(lambda, x));

        let scale = lambda.modulus() * norm(&bx);
        if scale > 0.0 {
            res_norm / scale
        } else {
            res_norm
        }
    }
}
