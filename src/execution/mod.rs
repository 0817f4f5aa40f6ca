//! Execution engine: outcome protocol and result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod python;

/// The structured mapping a successful script run must produce.
///
/// Mirrors the `ANALYTICS_RESULT` binding of the generated script. Missing
/// `metrics`/`plots` keys default to empty; any extra top-level keys are
/// preserved untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResult {
    #[serde(default)]
    pub metrics: serde_json::Map<String, Value>,
    #[serde(default)]
    pub plots: Vec<PlotDescriptor>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One entry of the `plots` sequence: a produced figure and where it lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotDescriptor {
    pub name: String,
    pub path: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Why a validated script still failed to produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// The required result binding was absent or had the wrong shape.
    #[error("generated code did not produce a usable ANALYTICS_RESULT: {0}")]
    Contract(String),

    /// The script raised while evaluating. `kind` is the Python exception
    /// class name.
    #[error("generated code raised {kind}: {message}")]
    Runtime { kind: String, message: String },

    /// The interpreter itself could not be run or broke the outcome protocol.
    #[error("python interpreter failed: {0}")]
    Interpreter(String),
}
