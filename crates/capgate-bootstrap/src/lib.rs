#![warn(missing_docs)]

//! # capgate-bootstrap
//!
//! Makes sure the process hosting the engine has the runtime packages the
//! catalog's capabilities need, before any snippet runs.
//!
//! The bootstrap is a two-phase state machine:
//!
//! - **NeedsProvisioning**: packages are declared and this process was not
//!   launched for them. The process relaunches itself once under a
//!   provisioner (`uv run --with pkg ... -- capgate ...`) with a marker set.
//! - **Provisioned**: nothing is declared, or the marker shows this process
//!   is already the relaunched one. Execution proceeds.
//!
//! The marker bounds the process to at most one relaunch per logical run.

pub mod error;
pub mod marker;
pub mod plan;
pub mod relaunch;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use capgate_catalog::{CatalogError, DependencyManifest, ManifestSource};

pub use error::ProvisioningError;
pub use marker::{MarkerSource, ProvisionMarker, MARKER_ENV};
pub use plan::{strip_manifest_flag, Provisioner, RelaunchPlan};
pub use relaunch::{ExecRelauncher, Relauncher};

/// Where the bootstrap stands for the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapState {
    /// Packages are declared but not yet provisioned.
    NeedsProvisioning(RelaunchPlan),
    /// Execution may proceed.
    Provisioned,
}

/// Resolve the manifest for this run.
///
/// A non-empty external manifest file wins. Otherwise the catalog's inline
/// directive is used. A missing catalog or missing file means no packages.
pub fn resolve_manifest(
    deps_file: Option<&Path>,
    catalog_path: &Path,
) -> Result<DependencyManifest, ProvisioningError> {
    if let Some(path) = deps_file {
        let manifest = DependencyManifest::from_file(path)?;
        if !manifest.is_empty() {
            tracing::debug!(path = %path.display(), packages = ?manifest.packages(), "using dependency manifest file");
            return Ok(manifest);
        }
        tracing::debug!(path = %path.display(), "dependency manifest file is empty, falling back to catalog directive");
    }

    if !catalog_path.exists() {
        return Ok(DependencyManifest::empty());
    }
    let source = std::fs::read_to_string(catalog_path).map_err(|source| CatalogError::Read {
        path: catalog_path.to_path_buf(),
        source,
    })?;
    Ok(DependencyManifest::from_directive(&source))
}

/// Decide whether this process must relaunch.
///
/// - `marker`: the marker this process was started with, if any
/// - `exe`, `args`: how to start this program again (args exclude argv\[0\])
pub fn evaluate(
    manifest: &DependencyManifest,
    marker: Option<&ProvisionMarker>,
    provisioner: &Provisioner,
    exe: &Path,
    args: &[OsString],
) -> Result<BootstrapState, ProvisioningError> {
    let Some(wanted) = ProvisionMarker::for_manifest(manifest) else {
        return Ok(BootstrapState::Provisioned);
    };

    if let Some(marker) = marker {
        if marker.source == MarkerSource::Directive
            && *manifest.source() == ManifestSource::Directive
        {
            let missing = marker.missing_from(manifest);
            if !missing.is_empty() {
                return Err(ProvisioningError::StillMissing { packages: missing });
            }
        }
        tracing::debug!(marker = %marker, "dependencies already provisioned");
        return Ok(BootstrapState::Provisioned);
    }

    if !provisioner.enabled {
        tracing::warn!(
            packages = ?manifest.packages(),
            "dependency bootstrap disabled, assuming packages are installed"
        );
        return Ok(BootstrapState::Provisioned);
    }

    Ok(BootstrapState::NeedsProvisioning(RelaunchPlan::new(
        provisioner,
        &wanted,
        exe,
        args,
    )))
}

/// How this process was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    /// Marker inherited from a previous relaunch, if any.
    pub marker: Option<ProvisionMarker>,
    /// Program to start again.
    pub exe: PathBuf,
    /// Arguments after argv\[0\], unmodified.
    pub args: Vec<OsString>,
}

impl Launch {
    /// Describe the running process.
    pub fn current() -> Result<Self, ProvisioningError> {
        Ok(Self {
            marker: ProvisionMarker::from_env(),
            exe: std::env::current_exe().map_err(ProvisioningError::CurrentExe)?,
            args: std::env::args_os().skip(1).collect(),
        })
    }
}

/// Run the bootstrap for the current process.
///
/// Returns `Some(code)` when the process was relaunched and should exit with
/// `code`, or `None` when execution should continue here.
pub fn ensure_provisioned(
    deps_file: Option<&Path>,
    catalog_path: &Path,
    provisioner: &Provisioner,
    relauncher: &dyn Relauncher,
) -> Result<Option<i32>, ProvisioningError> {
    provision(
        deps_file,
        catalog_path,
        &Launch::current()?,
        provisioner,
        relauncher,
    )
}

/// [`ensure_provisioned`] for an explicit [`Launch`].
pub fn provision(
    deps_file: Option<&Path>,
    catalog_path: &Path,
    launch: &Launch,
    provisioner: &Provisioner,
    relauncher: &dyn Relauncher,
) -> Result<Option<i32>, ProvisioningError> {
    let manifest = resolve_manifest(deps_file, catalog_path)?;
    match evaluate(
        &manifest,
        launch.marker.as_ref(),
        provisioner,
        &launch.exe,
        &launch.args,
    )? {
        BootstrapState::Provisioned => Ok(None),
        BootstrapState::NeedsProvisioning(plan) => relauncher.relaunch(&plan).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive(packages: &str) -> DependencyManifest {
        DependencyManifest::from_directive(&format!("# /// capability-deps: {packages}\n"))
    }

    fn exe() -> PathBuf {
        PathBuf::from("/opt/capgate/bin/capgate")
    }

    #[test]
    fn nothing_declared_is_provisioned() {
        let state = evaluate(
            &DependencyManifest::empty(),
            None,
            &Provisioner::default(),
            &exe(),
            &[],
        )
        .unwrap();
        assert_eq!(state, BootstrapState::Provisioned);
    }

    #[test]
    fn declared_without_marker_needs_provisioning() {
        let state = evaluate(
            &directive("requests"),
            None,
            &Provisioner::default(),
            &exe(),
            &["print(1)".into()],
        )
        .unwrap();
        match state {
            BootstrapState::NeedsProvisioning(plan) => {
                assert_eq!(plan.program, "uv");
                assert!(plan.args.iter().any(|arg| arg == "requests"));
            }
            other => panic!("expected NeedsProvisioning, got: {other:?}"),
        }
    }

    #[test]
    fn marker_prevents_a_second_relaunch() {
        let marker = ProvisionMarker::parse("file:requests").unwrap();
        // The file came and went; the marker still wins.
        let state = evaluate(
            &directive("numpy"),
            Some(&marker),
            &Provisioner::default(),
            &exe(),
            &[],
        )
        .unwrap();
        assert_eq!(state, BootstrapState::Provisioned);
    }

    #[test]
    fn directive_marker_missing_packages_fails_fast() {
        let marker = ProvisionMarker::parse("directive:requests").unwrap();
        let err = evaluate(
            &directive("requests, numpy"),
            Some(&marker),
            &Provisioner::default(),
            &exe(),
            &[],
        )
        .unwrap_err();
        assert!(matches!(
            &err,
            ProvisioningError::StillMissing { packages } if packages == &vec!["numpy".to_string()]
        ));
    }

    #[test]
    fn disabled_bootstrap_never_relaunches() {
        let provisioner = Provisioner {
            enabled: false,
            ..Provisioner::default()
        };
        let state = evaluate(&directive("requests"), None, &provisioner, &exe(), &[]).unwrap();
        assert_eq!(state, BootstrapState::Provisioned);
    }

    #[test]
    fn missing_catalog_and_file_resolve_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = resolve_manifest(
            Some(&dir.path().join("requirements.txt")),
            &dir.path().join("functions.py"),
        )
        .unwrap();
        assert!(manifest.is_empty());
    }
}
