//! Sandbox invocation adapter: one fixed request per run, one result back.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::{ExecutionRequest, ExecutionResult, SandboxEngine, DEFAULT_SCRIPT_NAME};
use crate::error::SandboxError;
use crate::filter::FilteredCapabilitySet;

/// Adapter configuration.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Advisory timeout handed to the engine.
    pub timeout: Duration,
    /// Extra time past `timeout` before the local watchdog gives up.
    pub watchdog_grace: Duration,
    /// Script identifier for engine diagnostics.
    pub script_name: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            watchdog_grace: Duration::from_secs(2),
            script_name: DEFAULT_SCRIPT_NAME.to_string(),
        }
    }
}

/// Invokes a [`SandboxEngine`] with a filtered capability set.
pub struct SandboxAdapter {
    engine: Arc<dyn SandboxEngine>,
    config: AdapterConfig,
}

impl SandboxAdapter {
    /// Create an adapter around `engine`.
    pub fn new(engine: Arc<dyn SandboxEngine>, config: AdapterConfig) -> Self {
        Self { engine, config }
    }

    /// The active configuration.
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Build the request the engine will receive.
    pub fn build_request(
        &self,
        code: &str,
        capabilities: &FilteredCapabilitySet,
        catalog_source: &str,
    ) -> ExecutionRequest {
        ExecutionRequest {
            code: code.to_string(),
            inputs: Vec::new(),
            external_functions: capabilities.names(),
            script_name: self.config.script_name.clone(),
            type_check: false,
            type_check_stubs: catalog_source.to_string(),
            timeout_secs: self.config.timeout.as_secs(),
        }
    }

    /// Run `code` in the engine, exposing only `capabilities`.
    ///
    /// Returns the engine's output verbatim (empty when it produced none).
    /// Engine-reported failures become [`SandboxError::Execution`] and are
    /// never retried.
    pub async fn invoke(
        &self,
        code: &str,
        capabilities: &FilteredCapabilitySet,
        catalog_source: &str,
    ) -> Result<String, SandboxError> {
        let request = self.build_request(code, capabilities, catalog_source);
        tracing::debug!(
            exposed = ?request.external_functions,
            timeout_secs = request.timeout_secs,
            "invoking sandbox engine"
        );

        let dispatcher = Arc::new(capabilities.clone());
        let deadline = self.config.timeout.saturating_add(self.config.watchdog_grace);
        let outcome = tokio::time::timeout(deadline, self.engine.execute(&request, dispatcher)).await;

        let result = match outcome {
            Ok(result) => result?,
            Err(_elapsed) => {
                tracing::warn!(timeout_ms = deadline.as_millis() as u64, "sandbox watchdog fired");
                return Err(SandboxError::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                });
            }
        };

        match result {
            ExecutionResult::Output { output } => Ok(output.unwrap_or_default()),
            ExecutionResult::Failure { kind, message } => Err(SandboxError::Execution {
                kind,
                message: single_line(&message),
            }),
        }
    }
}

/// Collapse a possibly multi-line engine message onto one line.
fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
