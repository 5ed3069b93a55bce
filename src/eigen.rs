/// Krylov eigen-iteration with full reorthogonalization
pub mod lanczos;
/// Shift-and-invert spectral transformation of a generalized eigenproblem
pub mod operator;
/// Basis quality diagnostics
pub mod ortho;
/// Eigen-decomposition of the projected symmetric tridiagonal matrix
pub mod tridiagonal;

pub use lanczos::{Convergence, Lanczos, LanczosOutput, RitzPair};
pub use operator::{EigenOperator, ShiftInvertOperator, SpectralTransform};
