use crate::error::{EigenError, Result};
use json::JsonValue;
use std::fs::read_to_string;
use tracing::warn;

const DEFAULT_SEED: u64 = 1234;

/// Shift, Lanczos sizing, and tolerance parameters shared by the Buckling and Frequency analyses
#[derive(Clone, Debug, PartialEq)]
pub struct EigenConfig {
    /// Spectral shift; eigenvalues nearest to it are found first
    pub sigma: f64,
    /// Largest Lanczos basis which will be built
    pub max_lanczos_vecs: usize,
    /// Number of eigenpairs requested
    pub num_eigvals: usize,
    /// Relative generalized residual which every requested eigenpair must meet
    pub eig_tol: f64,
    /// Seed of the random Lanczos starting vector
    pub seed: u64,
}

impl Default for EigenConfig {
    fn default() -> Self {
        Self {
            sigma: 0.0,
            max_lanczos_vecs: 50,
            num_eigvals: 10,
            eig_tol: 1e-8,
            seed: DEFAULT_SEED,
        }
    }
}

impl EigenConfig {
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn with_max_lanczos_vecs(mut self, max_lanczos_vecs: usize) -> Self {
        self.max_lanczos_vecs = max_lanczos_vecs;
        self
    }

    pub fn with_num_eigvals(mut self, num_eigvals: usize) -> Self {
        self.num_eigvals = num_eigvals;
        self
    }

    pub fn with_eig_tol(mut self, eig_tol: f64) -> Self {
        self.eig_tol = eig_tol;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check that the parameters describe a solvable problem.
    ///
    /// Requesting more eigenvalues than Lanczos vectors is allowed (the solve will report non-convergence),
    /// but it is logged.
    pub fn validate(&self) -> Result<()> {
        if self.num_eigvals == 0 {
            return Err(EigenError::InvalidConfig(String::from(
                "num_eigvals must be at least 1",
            )));
        }
        if self.max_lanczos_vecs == 0 {
            return Err(EigenError::InvalidConfig(String::from(
                "max_lanczos_vecs must be at least 1",
            )));
        }
        if !(self.eig_tol > 0.0 && self.eig_tol < 1.0) {
            return Err(EigenError::InvalidConfig(format!(
                "eig_tol must be in (0, 1); got {}",
                self.eig_tol
            )));
        }
        if !self.sigma.is_finite() {
            return Err(EigenError::InvalidConfig(format!(
                "sigma must be finite; got {}",
                self.sigma
            )));
        }

        if self.num_eigvals > self.max_lanczos_vecs {
            warn!(
                num_eigvals = self.num_eigvals,
                max_lanczos_vecs = self.max_lanczos_vecs,
                "More eigenvalues requested than Lanczos vectors allowed; the solve cannot converge"
            );
        }

        Ok(())
    }

    /// Parse a configuration from a JSON object. Missing fields take their default values.
    ///
    /// ```json
    /// {
    ///     "sigma": 10.0,
    ///     "max_lanczos_vecs": 80,
    ///     "num_eigvals": 6,
    ///     "eig_tol": 1e-10,
    ///     "seed": 7
    /// }
    /// ```
    pub fn from_json(source: &str) -> Result<Self> {
        let parsed = json::parse(source)?;
        if !parsed.is_object() {
            return Err(EigenError::ConfigParse(String::from(
                "Eigen configuration must be a JSON object",
            )));
        }

        let defaults = Self::default();
        let config = Self {
            sigma: parse_field(&parsed, "sigma", JsonValue::as_f64)?.unwrap_or(defaults.sigma),
            max_lanczos_vecs: parse_field(&parsed, "max_lanczos_vecs", JsonValue::as_usize)?
                .unwrap_or(defaults.max_lanczos_vecs),
            num_eigvals: parse_field(&parsed, "num_eigvals", JsonValue::as_usize)?
                .unwrap_or(defaults.num_eigvals),
            eig_tol: parse_field(&parsed, "eig_tol", JsonValue::as_f64)?.unwrap_or(defaults.eig_tol),
            seed: parse_field(&parsed, "seed", JsonValue::as_u64)?.unwrap_or(defaults.seed),
        };

        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file (see [EigenConfig::from_json])
    pub fn from_file(path: impl AsRef<str>) -> Result<Self> {
        let contents = read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }
}

fn parse_field<V>(
    parsed: &JsonValue,
    key: &str,
    convert: impl Fn(&JsonValue) -> Option<V>,
) -> Result<Option<V>> {
    let field = &parsed[key];
    if field.is_null() {
        return Ok(None);
    }

    convert(field).map(Some).ok_or_else(|| {
        EigenError::ConfigParse(format!("Field '{}' has an invalid value: {}", key, field.dump()))
    })
}
