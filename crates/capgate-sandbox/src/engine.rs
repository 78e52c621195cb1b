//! The fixed contract with the external sandbox engine.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SandboxError;
use crate::CapabilityDispatcher;

/// Script identifier handed to the engine unless configured otherwise.
pub const DEFAULT_SCRIPT_NAME: &str = "sandbox.py";

/// Everything the engine receives for one run. Passed through unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Untrusted snippet text.
    pub code: String,
    /// External inputs. Always empty.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Names of the filtered capabilities, sorted.
    pub external_functions: Vec<String>,
    /// Script identifier used in engine diagnostics.
    pub script_name: String,
    /// Strict type checking. Always disabled.
    pub type_check: bool,
    /// Full catalog source, for signature checking only.
    pub type_check_stubs: String,
    /// Advisory execution timeout.
    pub timeout_secs: u64,
}

/// Failure category reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The snippet does not parse.
    Syntax,
    /// An undefined name was referenced.
    Name,
    /// Division or modulo by zero.
    ZeroDivision,
    /// Sequence index out of range.
    Index,
    /// The engine's own deadline expired.
    Timeout,
    /// Any other runtime error.
    Runtime,
    /// Unrecognized category.
    #[serde(other)]
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Syntax => "SyntaxError",
            Self::Name => "NameError",
            Self::ZeroDivision => "ZeroDivisionError",
            Self::Index => "IndexError",
            Self::Timeout => "TimeoutError",
            Self::Runtime => "RuntimeError",
            Self::Other => "Error",
        };
        f.write_str(label)
    }
}

/// Tagged outcome of one engine run. Never retried or cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// The snippet ran. `output` is absent when the engine produced none.
    Output {
        /// Captured textual output.
        #[serde(default)]
        output: Option<String>,
    },
    /// The snippet failed inside the engine.
    Failure {
        /// Failure category.
        kind: FailureKind,
        /// Engine-provided message.
        message: String,
    },
}

impl ExecutionResult {
    /// Successful result with output text.
    pub fn output(text: impl Into<String>) -> Self {
        Self::Output {
            output: Some(text.into()),
        }
    }

    /// Failed result.
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }
}

/// The opaque sandbox engine: `Execute(request) -> result`.
///
/// Implementations interpret the snippet under their own isolation and call
/// back into `capabilities` for every external function the snippet invokes.
/// An `Err` means the engine itself could not be driven; snippet errors are
/// an `Ok(ExecutionResult::Failure { .. })`.
#[async_trait::async_trait]
pub trait SandboxEngine: Send + Sync {
    /// Run one request to completion.
    async fn execute(
        &self,
        request: &ExecutionRequest,
        capabilities: Arc<dyn CapabilityDispatcher>,
    ) -> Result<ExecutionResult, SandboxError>;
}
