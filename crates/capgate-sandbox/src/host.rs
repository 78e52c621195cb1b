//! ProcessEngine: drives an external engine binary as a child process.
//!
//! Spawns the engine with a filtered environment, communicates over
//! length-delimited JSON IPC (stdin/stdout), and routes capability calls
//! through the [`CapabilityDispatcher`] it was handed for the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use capgate_catalog::Arguments;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::Command;

use crate::engine::{ExecutionRequest, ExecutionResult, SandboxEngine};
use crate::error::SandboxError;
use crate::ipc::{
    read_message_with_limit, write_message, EngineMessage, HostMessage,
    DEFAULT_MAX_IPC_MESSAGE_SIZE,
};
use crate::CapabilityDispatcher;

/// Environment variable naming the engine binary (absolute path).
pub const ENGINE_BIN_ENV: &str = "CAPGATE_ENGINE_BIN";

/// Engine binary name looked up next to the current executable.
pub const ENGINE_BIN_NAME: &str = "capgate-engine";

/// Variables the engine needs to see the provisioned runtime.
const FORWARDED_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "VIRTUAL_ENV",
    "PYTHONPATH",
    "PYTHONHOME",
];

const FORWARDED_ENV_PREFIX: &str = "UV_";

/// A [`SandboxEngine`] backed by an external engine process.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    command: PathBuf,
    args: Vec<String>,
    pass_env: Vec<String>,
    max_message_size: usize,
}

impl ProcessEngine {
    /// Use `command` as the engine, as given.
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            pass_env: Vec::new(),
            max_message_size: DEFAULT_MAX_IPC_MESSAGE_SIZE,
        }
    }

    /// Use the configured command if any, otherwise discover the engine binary.
    pub fn resolve(command: Option<&str>) -> Result<Self, SandboxError> {
        match command {
            Some(command) => {
                let path = PathBuf::from(command);
                if path.components().count() > 1 && path.exists() {
                    validate_binary_permissions(&path)?;
                }
                Ok(Self::new(path))
            }
            None => Ok(Self::new(find_engine_binary()?)),
        }
    }

    /// Extra arguments passed to the engine command.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Additional environment variable names forwarded to the engine.
    pub fn with_pass_env(mut self, names: Vec<String>) -> Self {
        self.pass_env = names;
        self
    }

    /// Maximum size of a single IPC message from the engine.
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// The engine command.
    pub fn command(&self) -> &Path {
        &self.command
    }
}

#[async_trait::async_trait]
impl SandboxEngine for ProcessEngine {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        capabilities: Arc<dyn CapabilityDispatcher>,
    ) -> Result<ExecutionResult, SandboxError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(if std::env::var("CAPGATE_DEBUG").is_ok() {
                std::process::Stdio::inherit()
            } else {
                std::process::Stdio::null()
            })
            .env_clear()
            .envs(forwarded_env(std::env::vars(), &self.pass_env))
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn engine at {}", self.command.display()))?;

        tracing::debug!(engine = %self.command.display(), "engine process started");

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("no stdin on engine process"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("no stdout on engine process"))?;
        let mut stdout = BufReader::new(stdout);

        drive_engine(
            &mut stdout,
            &mut stdin,
            request,
            capabilities,
            self.max_message_size,
        )
        .await
    }
}

/// Send the request, then serve capability calls until the engine reports
/// completion.
pub async fn drive_engine<R, W>(
    reader: &mut R,
    writer: &mut W,
    request: &ExecutionRequest,
    capabilities: Arc<dyn CapabilityDispatcher>,
    max_message_size: usize,
) -> Result<ExecutionResult, SandboxError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let execute = HostMessage::Execute {
        request: request.clone(),
    };
    write_message(writer, &execute)
        .await
        .context("failed to send Execute")?;

    loop {
        let msg: Option<EngineMessage> = read_message_with_limit(reader, max_message_size)
            .await
            .context("IPC read error")?;

        match msg {
            Some(EngineMessage::ExecutionComplete { result }) => return Ok(result),
            Some(EngineMessage::CapabilityCall {
                request_id,
                name,
                args,
                kwargs,
            }) => {
                let result = capabilities
                    .call_capability(&name, Arguments { args, kwargs })
                    .await
                    .map_err(|e| e.to_string());
                if let Err(err) = &result {
                    tracing::debug!(capability = %name, error = %err, "capability call failed");
                }

                let response = HostMessage::CapabilityResult { request_id, result };
                write_message(writer, &response)
                    .await
                    .context("failed to send capability result")?;
            }
            Some(EngineMessage::Log { message }) => {
                tracing::info!(target: "capgate::sandbox::engine", "{}", message);
            }
            None => {
                return Err(SandboxError::Engine(anyhow!(
                    "engine exited without sending a result"
                )))
            }
        }
    }
}

/// Keep only the variables the engine is allowed to inherit.
fn forwarded_env<I>(vars: I, pass_env: &[String]) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter(|(key, _)| {
            FORWARDED_ENV.contains(&key.as_str())
                || key.starts_with(FORWARDED_ENV_PREFIX)
                || pass_env.iter().any(|name| name == key)
        })
        .collect()
}

/// Find the `capgate-engine` binary.
///
/// Search order:
/// 1. `CAPGATE_ENGINE_BIN` environment variable (must be absolute path)
/// 2. Same directory as the current executable, or its parent
///
/// On Unix, rejects world-writable binaries (mode & 0o002 != 0).
fn find_engine_binary() -> Result<PathBuf, SandboxError> {
    if let Ok(path) = std::env::var(ENGINE_BIN_ENV) {
        let p = PathBuf::from(&path);
        if !p.is_absolute() {
            return Err(SandboxError::Engine(anyhow!(
                "{ENGINE_BIN_ENV} must be an absolute path, got: {path}"
            )));
        }
        if p.exists() {
            validate_binary_permissions(&p)?;
            return Ok(p);
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            // Test binaries live in target/<profile>/deps/.
            for candidate in [Some(dir), dir.parent()].into_iter().flatten() {
                let engine = candidate.join(ENGINE_BIN_NAME);
                if engine.exists() {
                    validate_binary_permissions(&engine)?;
                    return Ok(engine);
                }
            }
        }
    }

    Err(SandboxError::Engine(anyhow!(
        "{ENGINE_BIN_NAME} binary not found. Set {ENGINE_BIN_ENV}, configure [engine] command, or install it alongside capgate"
    )))
}

/// Rejects world-writable binaries (Unix only).
fn validate_binary_permissions(path: &Path) -> Result<(), SandboxError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("cannot read metadata for {}", path.display()))?;
        let mode = metadata.permissions().mode();
        if mode & 0o002 != 0 {
            return Err(SandboxError::Engine(anyhow!(
                "insecure permissions on engine binary {}: mode {:o} is world-writable",
                path.display(),
                mode,
            )));
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
