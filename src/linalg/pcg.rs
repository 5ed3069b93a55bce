use super::{LinearOperator, LinearSolver, Preconditioner};
use crate::error::{EigenError, Result};
use crate::scalar::{axpy, dot, norm, Scalar};

use nalgebra::DVector;

/// Diagonal (Jacobi) preconditioner: `P = diag(A)`
pub struct JacobiPreconditioner<T: Scalar> {
    inv_diag: DVector<T>,
}

impl<T: Scalar> JacobiPreconditioner<T> {
    pub fn new() -> Self {
        Self {
            inv_diag: DVector::zeros(0),
        }
    }
}

impl<T: Scalar> Default for JacobiPreconditioner<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar, M: LinearOperator<T>> Preconditioner<T, M> for JacobiPreconditioner<T> {
    fn factor(&mut self, mat: &M) -> Result<()> {
        let diag = mat.diagonal();
        if let Some(i) = diag.iter().position(|d| d.re() == 0.0) {
            return Err(EigenError::solve_failure(format!(
                "Zero diagonal entry at row {}; cannot build Jacobi preconditioner",
                i
            )));
        }
        self.inv_diag = diag.map(|d| T::one() / d);
        Ok(())
    }

    fn apply(&self, r: &DVector<T>, z: &mut DVector<T>) {
        z.copy_from(&r.component_mul(&self.inv_diag));
    }
}

/// Preconditioned Conjugate Gradient solver for symmetric positive definite operators.
///
/// Only valid when the shifted operator stays positive definite (a shift below the lowest eigenvalue).
/// A solve which has not reached `rtol` after `max_iters` iterations fails with [EigenError::LinearSolveFailure].
pub struct PcgSolver<T: Scalar, M, P> {
    mat: Option<M>,
    pc: P,
    rtol: f64,
    max_iters: usize,
    _scalar: std::marker::PhantomData<T>,
}

impl<T, M, P> PcgSolver<T, M, P>
where
    T: Scalar,
    M: LinearOperator<T> + Clone,
    P: Preconditioner<T, M>,
{
    pub fn new(pc: P, rtol: f64, max_iters: usize) -> Self {
        Self {
            mat: None,
            pc,
            rtol,
            max_iters,
            _scalar: std::marker::PhantomData,
        }
    }
}

impl<T, M, P> LinearSolver<T, M> for PcgSolver<T, M, P>
where
    T: Scalar,
    M: LinearOperator<T> + Clone,
    P: Preconditioner<T, M>,
{
    fn factor(&mut self, mat: &M) -> Result<()> {
        self.pc.factor(mat)?;
        match self.mat.as_mut() {
            Some(stored) if stored.dimension() == mat.dimension() => stored.copy_values(mat),
            _ => self.mat = Some(mat.clone()),
        }
        Ok(())
    }

    fn solve(&self, rhs: &DVector<T>, x: &mut DVector<T>) -> Result<()> {
        let mat = self
            .mat
            .as_ref()
            .ok_or_else(|| EigenError::solve_failure("PCG solver used before factor"))?;

        let n = mat.dimension();
        if rhs.len() != n {
            return Err(EigenError::DimensionMismatch {
                expected: n,
                found: rhs.len(),
            });
        }

        let rhs_norm = norm(rhs);
        x.fill(T::zero());
        if rhs_norm == 0.0 {
            return Ok(());
        }

        let mut r = rhs.clone();
        let mut z = DVector::zeros(n);
        let mut ap = DVector::zeros(n);
        self.pc.apply(&r, &mut z);
        let mut p = z.clone();
        let mut rz = dot(&r, &z);

        for _ in 0..self.max_iters {
            mat.mult(&p, &mut ap);
            let pap = dot(&p, &ap);
            if pap.re() <= 0.0 {
                return Err(EigenError::solve_failure(
                    "Operator is not positive definite; PCG breakdown",
                ));
            }

            let alpha = rz / pap;
            axpy(alpha, &p, x);
            axpy(-alpha, &ap, &mut r);

            if norm(&r) <= self.rtol * rhs_norm {
                return Ok(());
            }

            self.pc.apply(&r, &mut z);
            let rz_next = dot(&r, &z);
            let beta = rz_next / rz;
            rz = rz_next;

            p *= beta;
            p += &z;
        }

        Err(EigenError::solve_failure(format!(
            "PCG failed to reach relative residual {:.3e} in {} iterations (reached {:.3e})",
            self.rtol,
            self.max_iters,
            norm(&r) / rhs_norm
        )))
    }
}
