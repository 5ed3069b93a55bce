use fem_eigen::{
    Assembler, Convergence, DenseLuSolver, EigenConfig, EigenError, FrequencyAnalysis,
    JacobiPreconditioner, LinearOperator, MatrixKind, PcgSolver, Scalar, SparseMatrix,
};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;
use rayon::prelude::*;

/// Two uncoupled unit masses on springs of stiffness `4 + p` and `9`
struct TwoSprings<T: Scalar> {
    p: T,
}

impl<T: Scalar> Assembler<T, DMatrix<T>> for TwoSprings<T> {
    fn num_variables(&self) -> usize {
        2
    }

    fn num_design_vars(&self) -> usize {
        1
    }

    fn set_variables(&mut self, _vars: &DVector<T>) {}

    fn assemble_jacobian(&mut self, load_case: usize, res: &mut DVector<T>, mat: &mut DMatrix<T>) {
        res.fill(T::zero());
        self.assemble_mat_type(load_case, MatrixKind::Stiffness, mat);
    }

    fn assemble_mat_type(&mut self, _: usize, kind: MatrixKind, mat: &mut DMatrix<T>) {
        mat.fill(T::zero());
        match kind {
            MatrixKind::Stiffness => {
                mat[(0, 0)] = T::from_real(4.0) + self.p;
                mat[(1, 1)] = T::from_real(9.0);
            }
            MatrixKind::Mass => mat.fill_with_identity(),
            MatrixKind::GeometricStiffness => {}
        }
    }

    fn add_mat_dv_sens_inner_product(
        &mut self,
        _: usize,
        kind: MatrixKind,
        scale: T,
        psi: &DVector<T>,
        phi: &DVector<T>,
        out: &mut [T],
    ) {
        if kind == MatrixKind::Stiffness {
            out[0] += scale * psi[0] * phi[0];
        }
    }

    fn eval_mat_sv_sens_inner_product(
        &mut self,
        _: usize,
        _: MatrixKind,
        _: &DVector<T>,
        _: &DVector<T>,
        out: &mut DVector<T>,
    ) {
        out.fill(T::zero());
    }

    fn add_adjoint_res_products(&mut self, _: usize, _: T, _: &DVector<T>, _: &mut [T]) {}
}

type ToyFrequency<T> = FrequencyAnalysis<T, DMatrix<T>, DenseLuSolver<T>, TwoSprings<T>>;

fn toy_frequency<T: Scalar>(p: T, config: &EigenConfig) -> ToyFrequency<T> {
    FrequencyAnalysis::new(
        TwoSprings { p },
        0,
        DMatrix::zeros(2, 2),
        DMatrix::zeros(2, 2),
        DMatrix::zeros(2, 2),
        DenseLuSolver::new(),
        config,
    )
    .unwrap()
}

fn toy_config() -> EigenConfig {
    EigenConfig::default().with_num_eigvals(2).with_eig_tol(1e-10)
}

#[test]
fn two_by_two_residual_scenario() {
    let mut freq = toy_frequency(0.0, &toy_config());
    let status = freq.solve(None).unwrap();
    assert!(status.is_converged());
    assert_eq!(freq.num_converged(), 2);

    let expected_values = [4.0, 9.0];
    let expected_vectors = [[1.0, 0.0], [0.0, 1.0]];
    let mut mode = DVector::zeros(2);

    for n in 0..2 {
        let (value, error) = freq.extract_eigenvalue(n).unwrap();
        assert!((value - expected_values[n]).abs() < 1e-10);
        assert!(error <= 1e-10 * value.abs());

        let vec_error = freq.extract_eigenvector(n, &mut mode).unwrap();
        assert_eq!(vec_error, error);
        for i in 0..2 {
            assert!((mode[i].abs() - expected_vectors[n][i]).abs() < 1e-10);
        }

        assert!(freq.check_eigenvector(n).unwrap() < 1e-12);
    }

    assert!(freq.check_orthogonality().unwrap() < 1e-12);
}

#[test]
fn out_of_range_extraction_leaves_state_intact() {
    let mut freq = toy_frequency(0.0, &toy_config());
    freq.solve(None).unwrap();

    assert!(matches!(
        freq.extract_eigenvalue(2),
        Err(EigenError::IndexOutOfRange { index: 2, available: 2 })
    ));
    let mut mode = DVector::zeros(2);
    assert!(matches!(
        freq.extract_eigenvector(5, &mut mode),
        Err(EigenError::IndexOutOfRange { .. })
    ));

    let (value, _) = freq.extract_eigenvalue(0).unwrap();
    assert!((value - 4.0).abs() < 1e-10);
}

#[test]
fn sensitivity_matches_finite_difference() {
    let mut freq = toy_frequency(0.0, &toy_config());
    freq.solve(None).unwrap();

    let mut grad = [0.0];
    freq.eval_eigen_dv_sens(0, &mut grad).unwrap();
    assert!((grad[0] - 1.0).abs() < 1e-10);

    let dh = 1e-6;
    let lambda_at = |p: f64| {
        let mut perturbed = toy_frequency(p, &toy_config());
        perturbed.solve(None).unwrap();
        perturbed.extract_eigenvalue(0).unwrap().0
    };
    let fd = (lambda_at(dh) - lambda_at(-dh)) / (2.0 * dh);

    assert!(((fd - grad[0]) / grad[0]).abs() < 1e-4);
}

#[test]
fn sensitivity_matches_complex_step() {
    let h = 1e-30;
    let mut freq = toy_frequency(Complex::new(0.0, h), &toy_config());
    assert!(freq.solve(None).unwrap().is_converged());

    let (lambda, _) = freq.extract_eigenvalue(0).unwrap();
    assert!((lambda.re - 4.0).abs() < 1e-10);
    assert!((lambda.im / h - 1.0).abs() < 1e-8);

    // the analytic sensitivity itself is carried through complex arithmetic
    let mut grad = [Complex::new(0.0, 0.0)];
    freq.eval_eigen_dv_sens(0, &mut grad).unwrap();
    assert!((grad[0].re - 1.0).abs() < 1e-10);
}

#[test]
fn small_basis_reports_non_convergence() {
    let config = EigenConfig::default()
        .with_num_eigvals(2)
        .with_max_lanczos_vecs(1)
        .with_eig_tol(1e-10);
    let mut freq = toy_frequency(0.0, &config);

    let status = freq.solve(None).unwrap();
    assert!(!status.is_converged());
    assert_eq!(freq.convergence(), Some(status));

    match status {
        Convergence::NotConverged {
            requested,
            max_error,
            ..
        } => {
            assert_eq!(requested, 2);
            assert!(max_error > 1e-10);
        }
        Convergence::Converged { .. } => panic!("one Lanczos vector cannot resolve two eigenvalues"),
    }

    // the best estimate is still available, with an error above the tolerance
    let (_, error) = freq.extract_eigenvalue(0).unwrap();
    assert!(error > 1e-10);

    assert!(matches!(
        status.into_result(),
        Err(EigenError::NonConvergence { requested: 2, .. })
    ));
}

#[test]
fn resetting_the_same_shift_reproduces_the_solution() {
    let mut freq = toy_frequency(0.0, &toy_config().with_sigma(1.0));
    freq.solve(None).unwrap();
    let first: Vec<f64> = (0..2).map(|n| freq.extract_eigenvalue(n).unwrap().0).collect();

    let sigma = freq.sigma();
    freq.set_sigma(sigma).unwrap();
    assert!(matches!(freq.extract_eigenvalue(0), Err(EigenError::NotSolved)));

    freq.solve(None).unwrap();
    for (n, value) in first.iter().enumerate() {
        let (again, _) = freq.extract_eigenvalue(n).unwrap();
        assert!((again - value).abs() < 1e-12 * value.abs());
    }
}

#[test]
fn shift_between_eigenvalues() {
    let mut freq = toy_frequency(0.0, &toy_config().with_num_eigvals(1).with_sigma(8.0));
    assert!(freq.solve(None).unwrap().is_converged());

    let (value, _) = freq.extract_eigenvalue(0).unwrap();
    assert!((value - 9.0).abs() < 1e-10);
}

/// `n` unit masses joined by unit springs, with both ends fixed
struct SpringChain {
    n: usize,
}

impl SpringChain {
    fn spring(&self, e: usize) -> SparseMatrix<f64> {
        let mut element = SparseMatrix::new(self.n);
        let nodes = [e.checked_sub(1), if e < self.n { Some(e) } else { None }];

        for node in nodes.iter().flatten() {
            element.insert([*node, *node], 1.0);
        }
        if let [Some(a), Some(b)] = nodes {
            element.insert([a, b], -1.0);
        }
        element
    }
}

impl Assembler<f64, SparseMatrix<f64>> for SpringChain {
    fn num_variables(&self) -> usize {
        self.n
    }

    fn num_design_vars(&self) -> usize {
        0
    }

    fn set_variables(&mut self, _vars: &DVector<f64>) {}

    fn assemble_jacobian(&mut self, load_case: usize, res: &mut DVector<f64>, mat: &mut SparseMatrix<f64>) {
        res.fill(0.0);
        self.assemble_mat_type(load_case, MatrixKind::Stiffness, mat);
    }

    fn assemble_mat_type(&mut self, _: usize, kind: MatrixKind, mat: &mut SparseMatrix<f64>) {
        mat.zero_entries();
        match kind {
            MatrixKind::Stiffness => {
                let springs: Vec<SparseMatrix<f64>> = (0..=self.n).map(|e| self.spring(e)).collect();
                mat.par_extend(springs.into_par_iter());
            }
            MatrixKind::Mass => {
                mat.consume_matrix(&mut SparseMatrix::from_diagonal(&vec![1.0; self.n]));
            }
            MatrixKind::GeometricStiffness => {}
        }
    }

    fn add_mat_dv_sens_inner_product(
        &mut self,
        _: usize,
        _: MatrixKind,
        _: f64,
        _: &DVector<f64>,
        _: &DVector<f64>,
        _: &mut [f64],
    ) {
    }

    fn eval_mat_sv_sens_inner_product(
        &mut self,
        _: usize,
        _: MatrixKind,
        _: &DVector<f64>,
        _: &DVector<f64>,
        out: &mut DVector<f64>,
    ) {
        out.fill(0.0);
    }

    fn add_adjoint_res_products(&mut self, _: usize, _: f64, _: &DVector<f64>, _: &mut [f64]) {}
}

#[test]
fn spring_chain_with_iterative_solver() {
    let n = 20;
    let config = EigenConfig::default()
        .with_num_eigvals(4)
        .with_max_lanczos_vecs(n)
        .with_eig_tol(1e-8);

    let solver: PcgSolver<f64, SparseMatrix<f64>, _> =
        PcgSolver::new(JacobiPreconditioner::new(), 1e-12, 500);
    let mut freq = FrequencyAnalysis::new(
        SpringChain { n },
        0,
        SparseMatrix::new(n),
        SparseMatrix::new(n),
        SparseMatrix::new(n),
        solver,
        &config,
    )
    .unwrap();

    let mut sink: Vec<u8> = Vec::new();
    assert!(freq.solve(Some(&mut sink)).unwrap().is_converged());
    assert!(!sink.is_empty());

    for k in 0..4 {
        let exact = 2.0 - 2.0 * ((k + 1) as f64 * std::f64::consts::PI / (n as f64 + 1.0)).cos();
        let (value, error) = freq.extract_eigenvalue(k).unwrap();
        assert!((value - exact).abs() < 1e-7 * exact, "{} != {}", value, exact);
        assert!(error <= 1e-8);

        let (omega, _) = freq.extract_frequency(k).unwrap();
        assert!((omega - exact.sqrt()).abs() < 1e-7);
    }

    assert!(freq.check_orthogonality().unwrap() < 1e-8);

    let mut report: Vec<u8> = Vec::new();
    freq.print_orthogonality(&mut report).unwrap();
    let report = String::from_utf8(report).unwrap();
    assert!(report.contains("4x4 Gram matrix"));
    assert!(report.contains("Max off-diagonal"));
}

#[cfg(feature = "json_export")]
#[test]
fn summary_export() {
    let mut freq = toy_frequency(0.0, &toy_config());
    freq.solve(None).unwrap();

    let exported = freq.summary().to_json();
    assert_eq!(exported["analysis"], "frequency");
    assert_eq!(exported["status"], "converged");
    assert_eq!(exported["eigenvalues"].len(), 2);
}
