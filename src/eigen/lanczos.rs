//! Symmetric Lanczos eigensolver with full reorthogonalization.
//!
//! The engine iterates with an [EigenOperator] `C` which is self-adjoint in the inner product `x^T W y`.
//! Each new Krylov vector is orthogonalized against every previously generated vector (two passes of classical
//! Gram-Schmidt), so the basis stays `W`-orthonormal to working precision and no spurious copies of converged
//! eigenvalues appear. The projected tridiagonal matrix is decomposed after every step; the Ritz values of largest
//! magnitude correspond to the physical eigenvalues closest to the shift.

use super::operator::EigenOperator;
use super::tridiagonal::{tridiagonal_eigen, TridiagonalEigen};
use crate::error::{EigenError, Result};
use crate::scalar::{axpy, dot, Scalar};

use nalgebra::DVector;
use std::io::Write;
use tracing::{debug, info, warn};

/// Relative size of the Lanczos off-diagonal below which the Krylov subspace is considered invariant
const BREAKDOWN_TOL: f64 = 1e-12;

/// An approximate eigenpair of the generalized problem
#[derive(Clone, Debug)]
pub struct RitzPair<T: Scalar> {
    /// Physical eigenvalue
    pub value: T,
    /// Eigenvalue of the transformed operator
    pub theta: T,
    /// Eigenvector, normalized so that `x^T W x = 1`
    pub vector: DVector<T>,
    /// Relative generalized residual `||A x - lambda B x|| / (|lambda| ||B x||)`
    pub error: f64,
}

/// Outcome of a Lanczos solve
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Convergence {
    /// Every requested eigenvalue met the tolerance
    Converged { iterations: usize },
    /// The basis was exhausted (or became invariant) first; the best estimates are still returned
    NotConverged {
        requested: usize,
        converged: usize,
        max_error: f64,
        iterations: usize,
    },
}

impl Convergence {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    pub fn iterations(&self) -> usize {
        match self {
            Self::Converged { iterations } | Self::NotConverged { iterations, .. } => *iterations,
        }
    }

    /// Convert a partial result into [EigenError::NonConvergence] for callers which cannot use it
    pub fn into_result(self) -> Result<usize> {
        match self {
            Self::Converged { iterations } => Ok(iterations),
            Self::NotConverged {
                requested,
                converged,
                max_error,
                ..
            } => Err(EigenError::NonConvergence {
                requested,
                converged,
                max_error,
            }),
        }
    }
}

/// Ritz pairs sorted by ascending physical eigenvalue, and the convergence status
#[derive(Clone, Debug)]
pub struct LanczosOutput<T: Scalar> {
    pub pairs: Vec<RitzPair<T>>,
    pub convergence: Convergence,
}

/// Lanczos engine and its basis storage.
///
/// The basis vectors are kept between solves so their storage can be reused; they are overwritten by each call
/// to [Lanczos::solve].
pub struct Lanczos<T: Scalar> {
    max_lanczos_vecs: usize,
    num_eigvals: usize,
    eig_tol: f64,
    basis: Vec<DVector<T>>,
    metric_basis: Vec<DVector<T>>,
    alpha: Vec<T>,
    beta: Vec<T>,
}

impl<T: Scalar> Lanczos<T> {
    /// * `max_lanczos_vecs`: the largest Krylov basis which will be built
    /// * `num_eigvals`: the number of eigenpairs requested
    /// * `eig_tol`: relative generalized residual each requested pair must meet
    pub fn new(max_lanczos_vecs: usize, num_eigvals: usize, eig_tol: f64) -> Self {
        Self {
            max_lanczos_vecs,
            num_eigvals,
            eig_tol,
            basis: Vec::with_capacity(max_lanczos_vecs),
            metric_basis: Vec::with_capacity(max_lanczos_vecs),
            alpha: Vec::with_capacity(max_lanczos_vecs),
            beta: Vec::with_capacity(max_lanczos_vecs),
        }
    }

    pub fn max_lanczos_vecs(&self) -> usize {
        self.max_lanczos_vecs
    }

    pub fn num_eigvals(&self) -> usize {
        self.num_eigvals
    }

    pub fn eig_tol(&self) -> f64 {
        self.eig_tol
    }

    /// Number of basis vectors generated by the last solve
    pub fn basis_size(&self) -> usize {
        self.basis.len()
    }

    /// Run the Lanczos iteration from `start` until `num_eigvals` Ritz pairs meet `eig_tol` or the basis is exhausted.
    ///
    /// Progress is written to `print` when it is provided. Failure of the operator's inner solve aborts the iteration.
    pub fn solve<O: EigenOperator<T>>(
        &mut self,
        op: &O,
        start: &DVector<T>,
        mut print: Option<&mut dyn Write>,
    ) -> Result<LanczosOutput<T>> {
        let n = op.dimension();
        if start.len() != n {
            return Err(EigenError::DimensionMismatch {
                expected: n,
                found: start.len(),
            });
        }
        let max_vecs = self.max_lanczos_vecs.min(n);

        self.basis.clear();
        self.metric_basis.clear();
        self.alpha.clear();
        self.beta.clear();

        let mut q = start.clone();
        let mut wq = DVector::zeros(n);
        op.metric_mult(&q, &mut wq);
        let q_norm = dot(&q, &wq).sqrt();
        if !(q_norm.re() > 0.0) {
            return Err(EigenError::InvalidConfig(String::from(
                "Lanczos starting vector has no component in the operator inner product",
            )));
        }
        q /= q_norm;
        wq /= q_norm;

        info!(
            dimension = n,
            max_vecs,
            num_eigvals = self.num_eigvals,
            "Starting Lanczos iteration"
        );

        let mut w = DVector::zeros(n);
        let mut ww = DVector::zeros(n);
        let mut pairs = Vec::new();
        let mut converged = false;

        for j in 0..max_vecs {
            self.basis.push(q.clone());
            self.metric_basis.push(wq.clone());

            // w = (A - sigma B)^{-1} W q_j
            op.solve_shifted(&wq, &mut w)?;

            let mut alpha_j = T::zero();
            for _ in 0..2 {
                for (i, (qi, wqi)) in self.basis.iter().zip(self.metric_basis.iter()).enumerate() {
                    let h = dot(wqi, &w);
                    axpy(-h, qi, &mut w);
                    if i == j {
                        alpha_j += h;
                    }
                }
            }

            op.metric_mult(&w, &mut ww);
            let beta_j = dot(&w, &ww).sqrt();
            self.alpha.push(alpha_j);
            self.beta.push(beta_j);
            let steps = j + 1;

            let eig = tridiagonal_eigen(&self.alpha, &self.beta)?;
            let order = rank_by_magnitude(&eig.values);
            let num_check = self.num_eigvals.min(steps);

            let scale = self.alpha.iter().map(|a| a.re_abs()).fold(0.0, f64::max);
            let breakdown = beta_j.re_abs() <= BREAKDOWN_TOL * scale;

            // |beta_j * z_{j,k}| is the residual of the k-th Ritz pair of the transformed operator
            let estimates_pass = num_check == self.num_eigvals
                && order[..num_check].iter().all(|&k| {
                    (beta_j * eig.vectors[(j, k)]).re_abs() <= self.eig_tol * eig.values[k].re_abs()
                });

            debug!(
                step = steps,
                beta = beta_j.re(),
                leading_theta = eig.values[order[0]].re(),
                "Lanczos step"
            );

            if estimates_pass || breakdown || steps == max_vecs {
                pairs = self.ritz_pairs(op, &eig, &order[..num_check]);
                let num_converged = pairs.iter().filter(|p| p.error <= self.eig_tol).count();

                if let Some(out) = print.as_deref_mut() {
                    writeln!(out, "Lanczos step {:>4}: {} of {} eigenvalues converged", steps, num_converged, self.num_eigvals)?;
                    for (k, pair) in pairs.iter().enumerate() {
                        writeln!(out, "    eigenvalue[{:>3}] = {:>24.15e}  error = {:>10.3e}", k, pair.value.re(), pair.error)?;
                    }
                }

                if num_converged == self.num_eigvals {
                    converged = true;
                    break;
                }
                if breakdown {
                    warn!(step = steps, "Lanczos breakdown: the Krylov subspace is invariant");
                    break;
                }
                if steps == max_vecs {
                    break;
                }
            } else if let Some(out) = print.as_deref_mut() {
                let k = order[0];
                writeln!(
                    out,
                    "Lanczos step {:>4}: leading estimate {:>24.15e}",
                    steps,
                    op.eigenvalue(eig.values[k]).re()
                )?;
            }

            q.copy_from(&w);
            q /= beta_j;
            wq.copy_from(&ww);
            wq /= beta_j;
        }

        let iterations = self.basis.len();
        let convergence = if converged {
            info!(iterations, "Lanczos converged");
            Convergence::Converged { iterations }
        } else {
            let num_converged = pairs.iter().filter(|p| p.error <= self.eig_tol).count();
            let max_error = pairs
                .iter()
                .map(|p| p.error)
                .fold(if pairs.is_empty() { f64::INFINITY } else { 0.0 }, f64::max);
            warn!(
                iterations,
                converged = num_converged,
                requested = self.num_eigvals,
                max_error,
                "Lanczos basis exhausted before convergence"
            );
            Convergence::NotConverged {
                requested: self.num_eigvals,
                converged: num_converged,
                max_error,
                iterations,
            }
        };

        // stable: pairs with equal eigenvalues keep the order in which they were ranked
        pairs.sort_by(|a, b| a.value.re().total_cmp(&b.value.re()));

        Ok(LanczosOutput { pairs, convergence })
    }

    /// Form the Ritz vectors of the selected tridiagonal eigenpairs and evaluate their generalized residuals
    fn ritz_pairs<O: EigenOperator<T>>(
        &self,
        op: &O,
        eig: &TridiagonalEigen<T>,
        selected: &[usize],
    ) -> Vec<RitzPair<T>> {
        let n = op.dimension();
        let steps = self.basis.len();

        selected
            .iter()
            .map(|&k| {
                let mut vector = DVector::zeros(n);
                for i in 0..steps {
                    axpy(eig.vectors[(i, k)], &self.basis[i], &mut vector);
                }
                orient(&mut vector);

                let theta = eig.values[k];
                let value = op.eigenvalue(theta);
                let error = op.residual_error(value, &vector);

                RitzPair {
                    value,
                    theta,
                    vector,
                    error,
                }
            })
            .collect()
    }
}

/// Indices of the Ritz values sorted by decreasing magnitude (nearest to the shift first)
fn rank_by_magnitude<T: Scalar>(values: &[T]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].re_abs().total_cmp(&values[a].re_abs()));
    order
}

/// Flip the sign of `x` so that its largest entry is positive
fn orient<T: Scalar>(x: &mut DVector<T>) {
    let largest = x
        .iter()
        .copied()
        .max_by(|a, b| a.re_abs().total_cmp(&b.re_abs()));

    if let Some(v) = largest {
        if v.re() < 0.0 {
            x.neg_mut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eigen::operator::{ShiftInvertOperator, SpectralTransform};
    use crate::linalg::dense::DenseLuSolver;
    use nalgebra::DMatrix;

    type DenseOp = ShiftInvertOperator<f64, DMatrix<f64>, DenseLuSolver<f64>>;

    fn operator(a: DMatrix<f64>, b: DMatrix<f64>, sigma: f64) -> DenseOp {
        let n = a.nrows();
        let mut op = ShiftInvertOperator::new(
            a,
            b,
            DMatrix::zeros(n, n),
            DenseLuSolver::new(),
            sigma,
            SpectralTransform::Regular,
        );
        op.factor().unwrap();
        op
    }

    fn start(n: usize) -> DVector<f64> {
        DVector::from_fn(n, |i, _| 1.0 + 0.37 * ((i * 7 + 3) % 11) as f64)
    }

    fn spring_chain(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                2.0
            } else if i + 1 == j || j + 1 == i {
                -1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn two_by_two_problem() {
        let op = operator(
            DMatrix::from_diagonal(&DVector::from_vec(vec![4.0, 9.0])),
            DMatrix::identity(2, 2),
            0.0,
        );

        let mut lanczos = Lanczos::new(2, 2, 1e-10);
        let output = lanczos.solve(&op, &start(2), None).unwrap();

        assert!(output.convergence.is_converged());
        assert_eq!(output.pairs.len(), 2);
        assert!((output.pairs[0].value - 4.0).abs() < 1e-10);
        assert!((output.pairs[1].value - 9.0).abs() < 1e-10);
        assert!((output.pairs[0].vector[0] - 1.0).abs() < 1e-10);
        assert!((output.pairs[1].vector[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn spring_chain_lowest_modes() {
        let n = 30;
        let op = operator(spring_chain(n), DMatrix::identity(n, n), 0.0);

        let mut lanczos = Lanczos::new(n, 4, 1e-8);
        let output = lanczos.solve(&op, &start(n), None).unwrap();
        assert!(output.convergence.is_converged());

        for (k, pair) in output.pairs.iter().enumerate() {
            let exact =
                2.0 - 2.0 * ((k + 1) as f64 * std::f64::consts::PI / (n as f64 + 1.0)).cos();
            assert!((pair.value - exact).abs() < 1e-7 * exact, "{} != {}", pair.value, exact);
            assert!(pair.error <= 1e-8);
        }
    }

    #[test]
    fn ritz_vectors_are_orthonormal() {
        let n = 20;
        let mass = DMatrix::from_fn(n, n, |i, j| if i == j { 1.0 + 0.05 * i as f64 } else { 0.0 });
        let op = operator(spring_chain(n), mass.clone(), 0.01);

        let mut lanczos = Lanczos::new(n, 5, 1e-8);
        let output = lanczos.solve(&op, &start(n), None).unwrap();

        for (i, pi) in output.pairs.iter().enumerate() {
            for (j, pj) in output.pairs.iter().enumerate() {
                let product = pi.vector.dot(&(&mass * &pj.vector));
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((product - expected).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn small_basis_does_not_converge() {
        let op = operator(
            DMatrix::from_diagonal(&DVector::from_vec(vec![4.0, 9.0])),
            DMatrix::identity(2, 2),
            0.0,
        );

        let mut lanczos = Lanczos::new(1, 2, 1e-10);
        let output = lanczos.solve(&op, &start(2), None).unwrap();

        match output.convergence {
            Convergence::NotConverged {
                requested,
                converged,
                max_error,
                iterations,
            } => {
                assert_eq!(requested, 2);
                assert_eq!(converged, 0);
                assert_eq!(iterations, 1);
                assert!(max_error > 1e-10);
            }
            Convergence::Converged { .. } => panic!("a single Lanczos vector cannot resolve two eigenvalues"),
        }
        assert_eq!(output.pairs.len(), 1);
        assert!(output.pairs[0].error > 1e-10);
        assert!(matches!(
            output.convergence.into_result(),
            Err(EigenError::NonConvergence { .. })
        ));
    }

    #[test]
    fn progress_is_written_to_sink() {
        let op = operator(
            DMatrix::from_diagonal(&DVector::from_vec(vec![4.0, 9.0])),
            DMatrix::identity(2, 2),
            0.0,
        );

        let mut sink: Vec<u8> = Vec::new();
        let mut lanczos = Lanczos::new(2, 2, 1e-10);
        lanczos.solve(&op, &start(2), Some(&mut sink)).unwrap();

        let text = String::from_utf8(sink).unwrap();
        assert!(text.contains("2 of 2 eigenvalues converged"));
    }

    #[test]
    fn mismatched_start_vector() {
        let op = operator(DMatrix::identity(3, 3) * 2.0, DMatrix::identity(3, 3), 0.0);
        let mut lanczos = Lanczos::new(3, 1, 1e-10);
        assert!(matches!(
            lanczos.solve(&op, &start(2), None),
            Err(EigenError::DimensionMismatch { expected: 3, found: 2 })
        ));
    }

    #[test]
    fn ranking_puts_largest_magnitude_first() {
        assert_eq!(rank_by_magnitude(&[0.5, -3.0, 2.0]), vec![1, 2, 0]);
    }
}
