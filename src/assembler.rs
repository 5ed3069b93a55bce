use crate::scalar::Scalar;
use nalgebra::DVector;
use std::fmt;

/// The kinds of operator an [Assembler] can build
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatrixKind {
    Stiffness,
    Mass,
    GeometricStiffness,
}

impl fmt::Display for MatrixKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Stiffness => write!(f, "Stiffness"),
            Self::Mass => write!(f, "Mass"),
            Self::GeometricStiffness => write!(f, "Geometric Stiffness"),
        }
    }
}

/// Finite element assembly of the operators, residuals, and derivative products needed by the eigen-analysis
///
/// The mesh, element formulations and the parallel decomposition all live behind this trait. The analysis
/// drivers only ever ask for assembled operators of type `M`, residual vectors, and inner products of
/// derivative operators with (eigen/adjoint) vectors.
pub trait Assembler<T: Scalar, M> {
    /// Number of state variables (the dimension of every operator)
    fn num_variables(&self) -> usize;

    /// Number of design variables
    fn num_design_vars(&self) -> usize;

    /// Set the state variables about which operators are linearized
    fn set_variables(&mut self, vars: &DVector<T>);

    /// Assemble the residual and tangent stiffness at the current state
    fn assemble_jacobian(&mut self, load_case: usize, res: &mut DVector<T>, mat: &mut M);

    /// Assemble an operator of the given kind at the current state
    fn assemble_mat_type(&mut self, load_case: usize, kind: MatrixKind, mat: &mut M);

    /// `out[p] += scale * psi^T (d M_kind / d x_p) phi` for every design variable `p`
    fn add_mat_dv_sens_inner_product(
        &mut self,
        load_case: usize,
        kind: MatrixKind,
        scale: T,
        psi: &DVector<T>,
        phi: &DVector<T>,
        out: &mut [T],
    );

    /// `out = d(psi^T M_kind(u) phi) / du`, the derivative with respect to the state variables
    fn eval_mat_sv_sens_inner_product(
        &mut self,
        load_case: usize,
        kind: MatrixKind,
        psi: &DVector<T>,
        phi: &DVector<T>,
        out: &mut DVector<T>,
    );

    /// `out[p] += scale * adjoint^T (d R / d x_p)` for every design variable `p`
    fn add_adjoint_res_products(
        &mut self,
        load_case: usize,
        scale: T,
        adjoint: &DVector<T>,
        out: &mut [T],
    );

    /// Zero the entries of `vec` which correspond to constrained degrees of freedom
    fn apply_bcs(&self, _vec: &mut DVector<T>) {}
}
