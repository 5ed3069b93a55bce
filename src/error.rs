//! Error type shared by the operators, the Lanczos engine and the analysis drivers.
use thiserror::Error;

/// Errors that can occur while setting up or solving a Buckling or Frequency eigenproblem
#[derive(Error, Debug)]
pub enum EigenError {
    /// The shifted linear system could not be factored or solved to tolerance.
    ///
    /// An inaccurate solve corrupts the orthogonality of the whole Lanczos basis, so this always aborts the eigensolve.
    #[error("Linear solve failed: {reason}")]
    LinearSolveFailure { reason: String },

    /// The Lanczos basis was exhausted before all requested eigenvalues met the tolerance
    #[error(
        "Lanczos did not converge: {converged} of {requested} eigenvalues met the tolerance (largest error {max_error:.3e})"
    )]
    NonConvergence {
        requested: usize,
        converged: usize,
        max_error: f64,
    },

    #[error("Eigenpair index {index} is out of range; only {available} are available")]
    IndexOutOfRange { index: usize, available: usize },

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid shift: {0}")]
    InvalidShift(String),

    /// Eigenpairs were requested before a successful solve, or after they were invalidated by a new shift
    #[error("No eigenpairs are available; call solve first")]
    NotSolved,

    #[error("Shifted operator has not been factored for the current shift")]
    NotFactored,

    #[error("Tridiagonal eigenvalue iteration failed to converge for eigenvalue {index}")]
    TridiagonalNoConvergence { index: usize },

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EigenError>;

impl EigenError {
    pub(crate) fn solve_failure(reason: impl Into<String>) -> Self {
        Self::LinearSolveFailure {
            reason: reason.into(),
        }
    }
}

impl From<json::Error> for EigenError {
    fn from(err: json::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}
