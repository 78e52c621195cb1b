//! The provisioning marker carried across a relaunch.
//!
//! Format: `<source>:<pkg,pkg,...>` where `source` is `file` or `directive`.

use std::fmt;

use capgate_catalog::{DependencyManifest, ManifestSource};

/// Environment variable set on the relaunched process.
pub const MARKER_ENV: &str = "CAPGATE_PROVISIONED";

/// Which kind of manifest a provisioned process was launched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerSource {
    /// An external manifest file.
    File,
    /// The catalog's inline directive.
    Directive,
}

/// Records that this process was relaunched with `packages` provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionMarker {
    /// Manifest kind.
    pub source: MarkerSource,
    /// Packages provisioned for this process.
    pub packages: Vec<String>,
}

impl ProvisionMarker {
    /// Marker for a manifest. `None` when nothing needs provisioning.
    pub fn for_manifest(manifest: &DependencyManifest) -> Option<Self> {
        let source = match manifest.source() {
            ManifestSource::None => return None,
            ManifestSource::Directive => MarkerSource::Directive,
            ManifestSource::File(_) => MarkerSource::File,
        };
        Some(Self {
            source,
            packages: manifest.packages().to_vec(),
        })
    }

    /// Parse a marker value. Unrecognized values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let (source, packages) = value.split_once(':')?;
        let source = match source {
            "file" => MarkerSource::File,
            "directive" => MarkerSource::Directive,
            _ => return None,
        };
        let packages = packages
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        Some(Self { source, packages })
    }

    /// Read the marker from the process environment.
    pub fn from_env() -> Option<Self> {
        let value = std::env::var(MARKER_ENV).ok()?;
        let marker = Self::parse(&value);
        if marker.is_none() {
            tracing::warn!(value = %value, "ignoring unrecognized {MARKER_ENV} value");
        }
        marker
    }

    /// Packages of `manifest` this marker does not cover.
    pub fn missing_from(&self, manifest: &DependencyManifest) -> Vec<String> {
        manifest
            .packages()
            .iter()
            .filter(|pkg| !self.packages.contains(pkg))
            .cloned()
            .collect()
    }
}

impl fmt::Display for ProvisionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            MarkerSource::File => "file",
            MarkerSource::Directive => "directive",
        };
        write!(f, "{}:{}", source, self.packages.join(","))
    }
}
