/// Linear buckling analysis about a static equilibrium path
pub mod buckling;
/// JSON summaries of solved analyses
#[cfg(feature = "json_export")]
pub mod export;
/// Natural frequency (vibration) analysis
pub mod frequency;

use crate::config::EigenConfig;
use crate::eigen::{
    ortho, Convergence, EigenOperator, Lanczos, RitzPair, ShiftInvertOperator,
};
use crate::error::{EigenError, Result};
use crate::linalg::{LinearOperator, LinearSolver};
use crate::scalar::Scalar;

use nalgebra::DVector;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::io::Write;
use tracing::info;

/// State shared by the Buckling and Frequency drivers: the shift-invert operator, the Lanczos engine,
/// and the eigenpairs found by the last solve.
///
/// Which physical operators play the roles of `A` and `B` (and which spectral transformation is used)
/// is decided by the driver when it builds the operator.
pub struct EigenAnalysis<T: Scalar, M, S> {
    op: ShiftInvertOperator<T, M, S>,
    lanczos: Lanczos<T>,
    seed: u64,
    pairs: Vec<RitzPair<T>>,
    convergence: Option<Convergence>,
}

impl<T, M, S> EigenAnalysis<T, M, S>
where
    T: Scalar,
    M: LinearOperator<T>,
    S: LinearSolver<T, M>,
{
    pub fn new(op: ShiftInvertOperator<T, M, S>, config: &EigenConfig) -> Self {
        Self {
            op,
            lanczos: Lanczos::new(config.max_lanczos_vecs, config.num_eigvals, config.eig_tol),
            seed: config.seed,
            pairs: Vec::new(),
            convergence: None,
        }
    }

    pub fn sigma(&self) -> T {
        self.op.sigma()
    }

    /// Change the shift, discarding any stored eigenpairs
    pub fn set_sigma(&mut self, sigma: T) {
        self.op.set_sigma(sigma);
        self.invalidate();
    }

    pub fn operator(&self) -> &ShiftInvertOperator<T, M, S> {
        &self.op
    }

    /// Mutable access to the operator (for re-assembly); discards any stored eigenpairs
    pub fn operator_mut(&mut self) -> &mut ShiftInvertOperator<T, M, S> {
        self.invalidate();
        &mut self.op
    }

    /// Solve `A x = rhs` with the analysis' solver. Stored eigenpairs are kept, but the shifted factorization is lost.
    pub fn solve_unshifted(&mut self, rhs: &DVector<T>, x: &mut DVector<T>) -> Result<()> {
        self.op.solve_unshifted(rhs, x)
    }

    pub fn lanczos(&self) -> &Lanczos<T> {
        &self.lanczos
    }

    fn invalidate(&mut self) {
        self.pairs.clear();
        self.convergence = None;
    }

    /// Reproducible random starting vector with `constrain` applied to it (e.g. zeroing boundary conditions)
    pub fn start_vector(&self, constrain: impl FnOnce(&mut DVector<T>)) -> DVector<T> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut start = DVector::from_fn(self.op.dimension(), |_, _| {
            T::from_real(rng.gen_range(-0.5..0.5))
        });
        constrain(&mut start);
        start
    }

    /// Factor the shifted operator, run Lanczos from `start`, and store the resulting eigenpairs
    pub fn run(&mut self, start: &DVector<T>, print: Option<&mut dyn Write>) -> Result<Convergence> {
        self.invalidate();
        self.op.factor()?;

        let output = self.lanczos.solve(&self.op, start, print)?;
        info!(
            sigma = self.op.sigma().re(),
            converged = output.pairs.iter().filter(|p| p.error <= self.lanczos.eig_tol()).count(),
            stored = output.pairs.len(),
            "Eigenpairs stored"
        );

        self.pairs = output.pairs;
        self.convergence = Some(output.convergence);
        Ok(output.convergence)
    }

    /// Status of the last solve (`None` before a solve or after the pairs were invalidated)
    pub fn convergence(&self) -> Option<Convergence> {
        self.convergence
    }

    /// Number of stored eigenpairs which meet the tolerance
    pub fn num_converged(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| p.error <= self.lanczos.eig_tol())
            .count()
    }

    /// Stored eigenpairs in ascending order of eigenvalue (including any which did not converge)
    pub fn pairs(&self) -> &[RitzPair<T>] {
        &self.pairs
    }

    pub fn pair(&self, n: usize) -> Result<&RitzPair<T>> {
        if self.convergence.is_none() {
            return Err(EigenError::NotSolved);
        }
        self.pairs.get(n).ok_or(EigenError::IndexOutOfRange {
            index: n,
            available: self.pairs.len(),
        })
    }

    /// The n-th eigenvalue and its error estimate
    pub fn extract_eigenvalue(&self, n: usize) -> Result<(T, f64)> {
        let pair = self.pair(n)?;
        Ok((pair.value, pair.error))
    }

    /// Copy the n-th eigenvector into `out`, returning its error estimate
    pub fn extract_eigenvector(&self, n: usize, out: &mut DVector<T>) -> Result<f64> {
        let pair = self.pair(n)?;
        if out.len() != pair.vector.len() {
            return Err(EigenError::DimensionMismatch {
                expected: pair.vector.len(),
                found: out.len(),
            });
        }
        out.copy_from(&pair.vector);
        Ok(pair.error)
    }

    /// Recompute the generalized residual of the n-th eigenpair from the governing operators
    pub fn check_eigenvector(&self, n: usize) -> Result<f64> {
        let pair = self.pair(n)?;
        Ok(self.op.residual_error(pair.value, &pair.vector))
    }

    /// Largest scaled off-diagonal entry of the Gram matrix of the stored eigenvectors
    pub fn check_orthogonality(&self) -> Result<f64> {
        if self.convergence.is_none() {
            return Err(EigenError::NotSolved);
        }
        Ok(ortho::max_off_diagonal(&self.gram_matrix()))
    }

    pub fn print_orthogonality(&self, out: &mut dyn Write) -> Result<()> {
        if self.convergence.is_none() {
            return Err(EigenError::NotSolved);
        }
        ortho::write_gram(&self.gram_matrix(), out)
    }

    fn gram_matrix(&self) -> nalgebra::DMatrix<T> {
        let vectors: Vec<DVector<T>> = self.pairs.iter().map(|p| p.vector.clone()).collect();
        ortho::gram_matrix(&self.op, &vectors)
    }
}

/// Check that a caller-owned gradient has one entry per design variable
pub(crate) fn check_gradient_len<T>(out: &[T], num_design_vars: usize) -> Result<()> {
    if out.len() != num_design_vars {
        return Err(EigenError::DimensionMismatch {
            expected: num_design_vars,
            found: out.len(),
        });
    }
    Ok(())
}
