//! Error types for the capgate sandbox layer.

use thiserror::Error;

use crate::engine::FailureKind;

/// Errors that can occur while mediating a sandbox execution.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The snippet uses an indirection marker and indirection is rejected.
    #[error("indirect invocation is not supported: `{pattern}` hides which capabilities the snippet calls. Call capabilities by name.")]
    IndirectInvocation {
        /// The marker that was matched.
        pattern: String,
    },

    /// The engine ran the snippet and reported a failure.
    #[error("{kind}: {message}")]
    Execution {
        /// Failure category reported by the engine.
        kind: FailureKind,
        /// Engine message, folded onto a single line.
        message: String,
    },

    /// The local watchdog fired before the engine returned.
    #[error("execution timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The engine could not be started or broke the IPC contract.
    #[error("sandbox engine failed: {0:#}")]
    Engine(anyhow::Error),
}

// Not `#[from]`: the anyhow chain is already rendered in the message.
impl From<anyhow::Error> for SandboxError {
    fn from(err: anyhow::Error) -> Self {
        Self::Engine(err)
    }
}
