use super::{check_gradient_len, EigenAnalysis};
use crate::assembler::{Assembler, MatrixKind};
use crate::config::EigenConfig;
use crate::eigen::{Convergence, RitzPair, ShiftInvertOperator, SpectralTransform};
use crate::error::{EigenError, Result};
use crate::linalg::{LinearOperator, LinearSolver};
use crate::scalar::{dot, norm, Scalar};

use nalgebra::DVector;
use std::io::Write;
use tracing::{debug, info};

/// Linear buckling analysis: solves `K x = lambda G x` where `G` is the geometric stiffness linearized about the
/// static solution `K u = f` of the load case.
///
/// The eigenvalues are buckling load factors (multiples of the applied load at which the structure loses
/// stability). Since `G` is indefinite the iteration uses the buckling spectral transformation, which works in the
/// `K` inner product; mode shapes are normalized so that `x^T K x = 1`.
pub struct LinearBuckling<T: Scalar, M, S, A> {
    assembler: A,
    load_case: usize,
    core: EigenAnalysis<T, M, S>,
    path: DVector<T>,
    res: DVector<T>,
}

impl<T, M, S, A> LinearBuckling<T, M, S, A>
where
    T: Scalar,
    M: LinearOperator<T>,
    S: LinearSolver<T, M>,
    A: Assembler<T, M>,
{
    /// Build a buckling analysis around storage for the geometric and material stiffness matrices.
    ///
    /// The solver is used both for the static path solve and for the shifted operator `K - sigma G`, which is formed
    /// in `aux`. The shift must be non-zero.
    pub fn new(
        assembler: A,
        load_case: usize,
        geometric: M,
        stiffness: M,
        aux: M,
        solver: S,
        config: &EigenConfig,
    ) -> Result<Self> {
        config.validate()?;
        let sigma = T::from_real(config.sigma);
        check_shift(sigma)?;

        let n = assembler.num_variables();
        for op in [&geometric, &stiffness, &aux] {
            if op.dimension() != n {
                return Err(EigenError::DimensionMismatch {
                    expected: n,
                    found: op.dimension(),
                });
            }
        }

        let op = ShiftInvertOperator::new(
            stiffness,
            geometric,
            aux,
            solver,
            sigma,
            SpectralTransform::Buckling,
        );

        Ok(Self {
            assembler,
            load_case,
            core: EigenAnalysis::new(op, config),
            path: DVector::zeros(n),
            res: DVector::zeros(n),
        })
    }

    pub fn sigma(&self) -> T {
        self.core.sigma()
    }

    /// Set the shift, discarding any stored eigenpairs. A zero shift is rejected.
    pub fn set_sigma(&mut self, sigma: T) -> Result<()> {
        check_shift(sigma)?;
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

    /// Static displacement about which the geometric stiffness was linearized by the last solve
    pub fn path(&self) -> &DVector<T> {
        &self.path
    }

    /// Solve for the static path, assemble the geometric stiffness about it, and find the load factors nearest to
    /// the shift.
    ///
    /// Progress is written to `print` if provided. Non-convergence is reported through the returned status; the best
    /// estimates are still stored and can be extracted.
    pub fn solve(&mut self, print: Option<&mut dyn Write>) -> Result<Convergence> {
        info!(load_case = self.load_case, "Solving for the linear static path");

        // K u = -R(0)
        self.path.fill(T::zero());
        self.assembler.set_variables(&self.path);
        {
            let (stiffness, _) = self.core.operator_mut().operators_mut();
            stiffness.zero_entries();
            self.assembler
                .assemble_jacobian(self.load_case, &mut self.res, stiffness);
        }
        self.res.neg_mut();
        self.core
            .operator_mut()
            .solve_unshifted(&self.res, &mut self.path)?;
        self.assembler.set_variables(&self.path);
        debug!(path_norm = norm(&self.path), "Static path found");

        {
            let (_, geometric) = self.core.operator_mut().operators_mut();
            geometric.zero_entries();
            self.assembler.assemble_mat_type(
                self.load_case,
                MatrixKind::GeometricStiffness,
                geometric,
            );
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

    /// The n-th buckling load factor and its error estimate
    pub fn extract_eigenvalue(&self, n: usize) -> Result<(T, f64)> {
        self.core.extract_eigenvalue(n)
    }

    pub fn extract_eigenvector(&self, n: usize, out: &mut DVector<T>) -> Result<f64> {
        self.core.extract_eigenvector(n, out)
    }

    /// Relative residual `||K x - lambda G x|| / (|lambda| ||G x||)` of the n-th mode, recomputed from `K` and `G`
    pub fn check_eigenvector(&self, n: usize) -> Result<f64> {
        self.core.check_eigenvector(n)
    }

    /// Largest off-diagonal entry of the stiffness-weighted Gram matrix of the stored modes
    pub fn check_orthogonality(&self) -> Result<f64> {
        self.core.check_orthogonality()
    }

    pub fn print_orthogonality(&self, out: &mut dyn Write) -> Result<()> {
        self.core.print_orthogonality(out)
    }

    /// Derivative of the n-th load factor with respect to every design variable.
    ///
    /// ```text
    /// d(lambda)/dp = [x^T dK/dp x - lambda x^T dG/dp x + lambda psi^T dR/dp] / (x^T G x)
    /// K psi = d(x^T G(u) x)/du
    /// ```
    ///
    /// The last term accounts for the change of the static path with the design, at the cost of one linear solve.
    /// The shifted factorization is discarded by that solve; the next [LinearBuckling::solve] re-factors it.
    pub fn eval_eigen_dv_sens(&mut self, n: usize, out: &mut [T]) -> Result<()> {
        check_gradient_len(out, self.assembler.num_design_vars())?;

        let pair = self.core.pair(n)?;
        let (lambda, x) = (pair.value, pair.vector.clone());
        let nv = x.len();

        let mut gx = DVector::zeros(nv);
        self.core.operator().b().mult(&x, &mut gx);
        let scale = T::one() / dot(&x, &gx);

        out.fill(T::zero());
        self.assembler.set_variables(&self.path);
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
            MatrixKind::GeometricStiffness,
            -lambda * scale,
            &x,
            &x,
            out,
        );

        // adjoint of the path solve
        let mut dgdu = DVector::zeros(nv);
        self.assembler.eval_mat_sv_sens_inner_product(
            self.load_case,
            MatrixKind::GeometricStiffness,
            &x,
            &x,
            &mut dgdu,
        );
        self.assembler.apply_bcs(&mut dgdu);

        let mut psi = DVector::zeros(nv);
        self.core.solve_unshifted(&dgdu, &mut psi)?;
        self.assembler
            .add_adjoint_res_products(self.load_case, lambda * scale, &psi, out);

        Ok(())
    }

    /// Summary of the stored eigenpairs for export
    #[cfg(feature = "json_export")]
    pub fn summary(&self) -> super::export::EigenSummary {
        super::export::EigenSummary::new("buckling", self.core.sigma(), self.core.convergence(), self.core.pairs())
    }
}

fn check_shift<T: Scalar>(sigma: T) -> Result<()> {
    if sigma.re() == 0.0 || !sigma.re().is_finite() {
        return Err(EigenError::InvalidShift(format!(
            "Buckling shift must be finite and non-zero; got {}",
            sigma.re()
        )));
    }
    Ok(())
}
