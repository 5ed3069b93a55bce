use super::{check_gradient_len, EigenAnalysis};
use crate::assembler::{Assembler, MatrixKind};
use crate::config::EigenConfig;
use crate::eigen::{Convergence, RitzPair, ShiftInvertOperator, SpectralTransform};
use crate::error::{EigenError, Result};
use crate::linalg::{LinearOperator, LinearSolver};
use crate::scalar::{dot, Scalar};

use nalgebra::DVector;
use std::io::Write;
use tracing::info;

/// Natural frequency analysis: solves `K x = lambda M x` with `lambda = omega^2`.
///
/// The stiffness and mass matrices are assembled at the current design every time [FrequencyAnalysis::solve] is called.
/// Eigenvectors are mass-normalized (`x^T M x = 1`).
pub struct FrequencyAnalysis<T: Scalar, M, S, A> {
    assembler: A,
    load_case: usize,
    core: EigenAnalysis<T, M, S>,
}

impl<T, M, S, A> FrequencyAnalysis<T, M, S, A>
where
    T: Scalar,
    M: LinearOperator<T>,
    S: LinearSolver<T, M>,
    A: Assembler<T, M>,
{
    /// Build a frequency analysis around storage for the mass and stiffness matrices.
    ///
    /// `aux` receives `K - sigma M` whenever the operator is factored; it must not be shared with another analysis.
    pub fn new(
        assembler: A,
        load_case: usize,
        mass: M,
        stiffness: M,
        aux: M,
        solver: S,
        config: &EigenConfig,
    ) -> Result<Self> {
        config.validate()?;

        let n = assembler.num_variables();
        for op in [&mass, &stiffness, &aux] {
            if op.dimension() != n {
                return Err(EigenError::DimensionMismatch {
                    expected: n,
                    found: op.dimension(),
                });
            }
        }

        let op = ShiftInvertOperator::new(
            stiffness,
            mass,
            aux,
            solver,
            T::from_real(config.sigma),
            SpectralTransform::Regular,
        );

        Ok(Self {
            assembler,
            load_case,
            core: EigenAnalysis::new(op, config),
        })
    }

    pub fn sigma(&self) -> T {
        self.core.sigma()
    }

    /// Set the shift, discarding any stored eigenpairs
    pub fn set_sigma(&mut self, sigma: T) -> Result<()> {
        if !sigma.re().is_finite() {
            return Err(EigenError::InvalidShift(format!(
                "Frequency shift must be finite; got {}",
                sigma.re()
            )));
        }
        self.core.set_sigma(sigma);
        Ok(())
    }

    pub fn assembler(&self) -> &A {
        &self.assembler
    }

    /// Mutable access to the model (e.g. to change the design); stored eigenpairs remain until the next solve
    pub fn assembler_mut(&mut self) -> &mut A {
        &mut self.assembler
    }

    /// Assemble `K` and `M`, then find the eigenvalues nearest to the shift.
    ///
    /// Progress is written to `print` if provided. Non-convergence is reported through the returned status; the best
    /// estimates are still stored and can be extracted.
    pub fn solve(&mut self, print: Option<&mut dyn Write>) -> Result<Convergence> {
        info!(load_case = self.load_case, "Assembling stiffness and mass for frequency analysis");

        {
            let (stiffness, mass) = self.core.operator_mut().operators_mut();
            stiffness.zero_entries();
            self.assembler
                .assemble_mat_type(self.load_case, MatrixKind::Stiffness, stiffness);
            mass.zero_entries();
            self.assembler
                .assemble_mat_type(self.load_case, MatrixKind::Mass, mass);
        }

        let assembler = &self.assembler;
        let start = self.core.start_vector(|v| assembler.apply_bcs(v));
        self.core.run(&start, print)
    }

    pub fn convergence(&self) -> Option<Convergence> {
        self.core.convergence()
    }

    pub fn num_converged(&self) -> usize {
        self.core.num_converged()
    }

    pub fn pairs(&self) -> &[RitzPair<T>] {
        self.core.pairs()
    }

    /// The n-th eigenvalue (`omega^2`) and its error estimate
    pub fn extract_eigenvalue(&self, n: usize) -> Result<(T, f64)> {
        self.core.extract_eigenvalue(n)
    }

    /// The n-th natural frequency `omega = sqrt(lambda)` in radians per unit time, and its error estimate
    pub fn extract_frequency(&self, n: usize) -> Result<(T, f64)> {
        let (value, error) = self.core.extract_eigenvalue(n)?;
        Ok((value.sqrt(), error))
    }

    pub fn extract_eigenvector(&self, n: usize, out: &mut DVector<T>) -> Result<f64> {
        self.core.extract_eigenvector(n, out)
    }

    /// Relative residual `||K x - lambda M x|| / (|lambda| ||M x||)` of the n-th mode, recomputed from `K` and `M`
    pub fn check_eigenvector(&self, n: usize) -> Result<f64> {
        self.core.check_eigenvector(n)
    }

    /// Largest off-diagonal entry of the mass-weighted Gram matrix of the stored modes
    pub fn check_orthogonality(&self) -> Result<f64> {
        self.core.check_orthogonality()
    }

    pub fn print_orthogonality(&self, out: &mut dyn Write) -> Result<()> {
        self.core.print_orthogonality(out)
    }

    /// Derivative of the n-th eigenvalue with respect to every design variable:
    ///
    /// `d(lambda)/dp = x^T (dK/dp - lambda dM/dp) x / (x^T M x)`
    pub fn eval_eigen_dv_sens(&mut self, n: usize, out: &mut [T]) -> Result<()> {
        check_gradient_len(out, self.assembler.num_design_vars())?;

        let pair = self.core.pair(n)?;
        let (lambda, x) = (pair.value, pair.vector.clone());

        let mut mx = DVector::zeros(x.len());
        self.core.operator().b().mult(&x, &mut mx);
        let scale = T::one() / dot(&x, &mx);

        out.fill(T::zero());
        self.assembler.add_mat_dv_sens_inner_product(
            self.load_case,
            MatrixKind::Stiffness,
            scale,
            &x,
            &x,
            out,
        );
        self.assembler.add_mat_dv_sens_inner_product(
            self.load_case,
            MatrixKind::Mass,
            -lambda * scale,
            &x,
            &x,
            out,
        );

        Ok(())
    }

    /// Summary of the stored eigenpairs for export
    #[cfg(feature = "json_export")]
    pub fn summary(&self) -> super::export::EigenSummary {
        super::export::EigenSummary::new("frequency", self.core.sigma(), self.core.convergence(), self.core.pairs())
    }
}
