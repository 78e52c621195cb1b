#![warn(missing_docs)]

//! capgate: run an untrusted snippet with only the capabilities it calls.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use capgate::{process_engine, provisioner, Gate, GateError};
use capgate_bootstrap::{ensure_provisioned, ExecRelauncher};
use capgate_catalog::CapabilityLibrary;
use capgate_config::{find_config_file, GateConfig, MAX_TIMEOUT_SECS};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "capgate", version, about)]
struct Cli {
    /// Snippet to execute in the sandbox.
    code: String,

    /// Capability catalog source.
    #[arg(short = 'f', long = "functions", value_name = "PATH")]
    functions: Option<PathBuf>,

    /// External dependency manifest (requirements-style).
    #[arg(short = 'd', long = "deps", value_name = "PATH")]
    deps: Option<PathBuf>,

    /// Execution timeout in seconds.
    #[arg(
        short = 't',
        long,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS)
    )]
    timeout: Option<u64>,

    /// Config file (default: $CAPGATE_CONFIG, then ./capgate.toml).
    #[arg(short = 'c', long, value_name = "PATH")]
    config: Option<PathBuf>,
}

enum Outcome {
    Output(String),
    Relaunched(i32),
}

fn load_config(explicit: Option<PathBuf>) -> Result<GateConfig> {
    match explicit.or_else(find_config_file) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            GateConfig::from_file_with_env(&path).map_err(|err| {
                anyhow!(
                    "failed to load config from {}: {}",
                    path.display(),
                    GateError::from(err)
                )
            })
        }
        None => Ok(GateConfig::default()),
    }
}

async fn run(cli: Cli) -> Result<Outcome> {
    let config = load_config(cli.config)?;
    let catalog_path = cli.functions.unwrap_or_else(|| config.catalog_path());

    let relaunched = ensure_provisioned(
        cli.deps.as_deref(),
        &catalog_path,
        &provisioner(&config.bootstrap),
        &ExecRelauncher,
    )
    .map_err(GateError::from)?;
    if let Some(code) = relaunched {
        return Ok(Outcome::Relaunched(code));
    }

    let engine = process_engine(&config).map_err(GateError::from)?;
    let gate = Gate::from_config(
        &config,
        CapabilityLibrary::builtin(),
        Arc::new(engine),
        cli.timeout,
    );
    let output = gate.run(&cli.code, &catalog_path).await?;
    Ok(Outcome::Output(output))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(Outcome::Output(output)) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Relaunched(code)) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
