#![warn(missing_docs)]

//! # capgate
//!
//! Runs an untrusted snippet in an external sandbox engine, exposing only the
//! host capabilities the snippet actually calls.
//!
//! [`Gate::run`] is the whole per-run pipeline: load the catalog, scan the
//! snippet, filter the catalog down to referenced names, invoke the engine.
//! The dependency bootstrap runs before it, from the binary.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use capgate_bootstrap::{Provisioner, ProvisioningError};
use capgate_catalog::{CapabilityLibrary, CatalogError, CatalogLoader};
use capgate_config::{BootstrapOverrides, ConfigError, GateConfig, ScannerOverrides};
use capgate_sandbox::{
    detect_indirection, filter, AdapterConfig, BuiltinExclusions, ProcessEngine,
    ReferenceScanner, SandboxAdapter, SandboxEngine, SandboxError,
};
use thiserror::Error;

/// Why a run failed. Every variant is fatal for the run.
#[derive(Debug, Error)]
pub enum GateError {
    /// The configuration or catalog could not be loaded.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Required packages could not be provisioned.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// The engine could not run the snippet, or the snippet failed.
    #[error(transparent)]
    Execution(#[from] SandboxError),
}

/// Configuration-stage failures.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// `capgate.toml` is unreadable or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The catalog exists but does not load.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl From<CatalogError> for GateError {
    fn from(err: CatalogError) -> Self {
        Self::Configuration(err.into())
    }
}

impl From<ConfigError> for GateError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.into())
    }
}

/// The per-run mediation pipeline.
pub struct Gate {
    library: CapabilityLibrary,
    scanner: ReferenceScanner,
    adapter: SandboxAdapter,
    reject_indirection: bool,
}

impl Gate {
    /// Create a pipeline binding catalogs to `library` and running snippets
    /// through `adapter`.
    pub fn new(library: CapabilityLibrary, scanner: ReferenceScanner, adapter: SandboxAdapter) -> Self {
        Self {
            library,
            scanner,
            adapter,
            reject_indirection: false,
        }
    }

    /// Assemble a pipeline from configuration.
    ///
    /// `timeout_secs` overrides the configured timeout when given.
    pub fn from_config(
        config: &GateConfig,
        library: CapabilityLibrary,
        engine: Arc<dyn SandboxEngine>,
        timeout_secs: Option<u64>,
    ) -> Self {
        let adapter = SandboxAdapter::new(engine, adapter_config(config, timeout_secs));
        Self::new(library, scanner(&config.scanner), adapter)
            .with_reject_indirection(config.scanner.reject_indirection)
    }

    /// Refuse snippets that invoke capabilities indirectly.
    pub fn with_reject_indirection(mut self, reject: bool) -> Self {
        self.reject_indirection = reject;
        self
    }

    /// Run `code` against the catalog at `catalog_path`.
    pub async fn run(&self, code: &str, catalog_path: &Path) -> Result<String, GateError> {
        let loaded = CatalogLoader::new(&self.library).load(catalog_path)?;

        let shadowed: Vec<&str> = loaded
            .catalog
            .names()
            .filter(|name| self.scanner.exclusions().contains(name))
            .collect();
        if !shadowed.is_empty() {
            tracing::warn!(
                capabilities = ?shadowed,
                "catalog declares names that are also excluded builtins; they can never be exposed"
            );
        }

        let markers = detect_indirection(code);
        if let Some(pattern) = markers.first() {
            if self.reject_indirection {
                return Err(SandboxError::IndirectInvocation {
                    pattern: pattern.to_string(),
                }
                .into());
            }
            tracing::warn!(
                markers = ?markers,
                "snippet uses indirect invocation; capabilities called this way are not exposed"
            );
        }

        let refs = self.scanner.scan(code);
        let exposed = filter(&loaded.catalog, &refs);
        tracing::info!(
            referenced = refs.len(),
            exposed = exposed.len(),
            catalog = loaded.catalog.len(),
            "filtered capabilities"
        );

        let output = self.adapter.invoke(code, &exposed, &loaded.source).await?;
        Ok(output)
    }
}

/// Scanner with the configured builtin exclusions.
pub fn scanner(overrides: &ScannerOverrides) -> ReferenceScanner {
    ReferenceScanner::new(BuiltinExclusions::from_overrides(
        overrides.builtins.as_deref(),
        &overrides.extra_builtins,
    ))
}

/// Adapter settings from config, with an optional timeout override.
pub fn adapter_config(config: &GateConfig, timeout_secs: Option<u64>) -> AdapterConfig {
    let mut adapter = AdapterConfig {
        timeout: Duration::from_secs(timeout_secs.unwrap_or_else(|| config.timeout_secs())),
        ..AdapterConfig::default()
    };
    if let Some(ms) = config.engine.watchdog_grace_ms {
        adapter.watchdog_grace = Duration::from_millis(ms);
    }
    if let Some(name) = &config.engine.script_name {
        adapter.script_name = name.clone();
    }
    adapter
}

/// The child-process engine described by `[engine]`.
pub fn process_engine(config: &GateConfig) -> Result<ProcessEngine, SandboxError> {
    let overrides = &config.engine;
    let mut engine = ProcessEngine::resolve(overrides.command.as_deref())?
        .with_args(overrides.args.clone())
        .with_pass_env(overrides.pass_env.clone());
    if let Some(mb) = overrides.max_ipc_message_size_mb {
        engine = engine.with_max_message_size(mb.saturating_mul(1024 * 1024));
    }
    Ok(engine)
}

/// Provisioner described by `[bootstrap]`.
pub fn provisioner(overrides: &BootstrapOverrides) -> Provisioner {
    let mut provisioner = Provisioner::default();
    if let Some(enabled) = overrides.enabled {
        provisioner.enabled = enabled;
    }
    if let Some(program) = &overrides.program {
        provisioner.program = program.clone();
    }
    if let Some(args) = &overrides.args {
        provisioner.args = args.clone();
    }
    if let Some(flag) = &overrides.with_flag {
        provisioner.with_flag = flag.clone();
    }
    provisioner
}
