use crate::eigen::{Convergence, RitzPair};
use crate::scalar::Scalar;
use json::{object, JsonValue};

/// One stored eigenvalue and its error estimate
#[derive(Clone, Debug, PartialEq)]
pub struct EigenvalueSummary {
    pub value: f64,
    pub error: f64,
}

/// Shift, convergence status, and eigenvalues of a solved analysis
#[derive(Clone, Debug, PartialEq)]
pub struct EigenSummary {
    pub analysis: String,
    pub sigma: f64,
    pub convergence: Option<Convergence>,
    pub eigenvalues: Vec<EigenvalueSummary>,
}

impl EigenSummary {
    pub fn new<T: Scalar>(
        analysis: impl Into<String>,
        sigma: T,
        convergence: Option<Convergence>,
        pairs: &[RitzPair<T>],
    ) -> Self {
        Self {
            analysis: analysis.into(),
            sigma: sigma.re(),
            convergence,
            eigenvalues: pairs
                .iter()
                .map(|p| EigenvalueSummary {
                    value: p.value.re(),
                    error: p.error,
                })
                .collect(),
        }
    }

    /// Produce a Json Object that describes this analysis result
    pub fn to_json(&self) -> JsonValue {
        object! {
            "analysis": self.analysis.as_str(),
            "sigma": self.sigma,
            "status": match self.convergence {
                Some(Convergence::Converged { .. }) => "converged",
                Some(Convergence::NotConverged { .. }) => "not_converged",
                None => "not_solved",
            },
            "iterations": self.convergence.map(|c| c.iterations()).unwrap_or(0),
            "eigenvalues": JsonValue::Array(
                self.eigenvalues
                    .iter()
                    .map(|eig| object! { "value": eig.value, "error": eig.error })
                    .collect()
            ),
        }
    }
}
