//! Buckling and natural frequency eigen-analysis of finite element models, with design sensitivities of the
//! computed eigenvalues.
//!
//! The generalized eigenproblem `A x = lambda B x` is solved with a shift-and-invert Lanczos iteration
//! (full reorthogonalization). The finite element model and the linear algebra backends are supplied by the
//! caller through the [Assembler], [LinearOperator] and [LinearSolver] traits.

pub mod analysis;
pub mod assembler;
pub mod config;
pub mod eigen;
pub mod error;
pub mod linalg;
pub mod scalar;

pub use analysis::buckling::LinearBuckling;
pub use analysis::frequency::FrequencyAnalysis;
pub use analysis::EigenAnalysis;
pub use assembler::{Assembler, MatrixKind};
pub use config::EigenConfig;
pub use eigen::{Convergence, EigenOperator, Lanczos, RitzPair, ShiftInvertOperator, SpectralTransform};
pub use error::{EigenError, Result};
pub use linalg::dense::DenseLuSolver;
pub use linalg::pcg::{JacobiPreconditioner, PcgSolver};
pub use linalg::sparse_matrix::SparseMatrix;
pub use linalg::{DenseForm, LinearOperator, LinearSolver, Preconditioner};
pub use scalar::Scalar;

#[cfg(feature = "json_export")]
pub use analysis::export::EigenSummary;
