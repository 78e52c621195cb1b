//! Dependency manifests: the runtime packages a catalog needs.
//!
//! A manifest comes from one of two places:
//!
//! - an inline directive in the catalog source,
//!   `# /// capability-deps: cryptography, requests`
//! - an external requirements-style file, one package per line.
//!
//! Package identifiers are always stored bare, with version qualifiers removed.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CatalogError;

static DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*///\s*capability-deps:\s*(.+)").unwrap());

/// Version qualifiers, in the order they are stripped.
const VERSION_QUALIFIERS: &[&str] = &["==", ">=", "<=", ">", "<"];

/// Where a manifest's package list came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ManifestSource {
    /// No packages declared anywhere.
    #[default]
    None,
    /// The catalog's inline `capability-deps` directive.
    Directive,
    /// An external manifest file.
    File(PathBuf),
}

/// Ordered list of bare package identifiers. Immutable once parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyManifest {
    packages: Vec<String>,
    source: ManifestSource,
}

impl DependencyManifest {
    /// A manifest with no packages.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a manifest from the catalog's inline directive, if any.
    pub fn from_directive(catalog_source: &str) -> Self {
        Self::with_source(extract_directive(catalog_source), ManifestSource::Directive)
    }

    /// Parse requirements-style text.
    ///
    /// Blank lines, `#` comments and `-e` editable installs are skipped.
    pub fn parse_requirements(text: &str) -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("-e"))
            .map(strip_version_qualifiers)
            .filter(|pkg| !pkg.is_empty())
            .collect()
    }

    /// Load an external manifest file. A missing file yields an empty manifest.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "dependency manifest not found");
            return Ok(Self::empty());
        }
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::with_source(
            Self::parse_requirements(&text),
            ManifestSource::File(path.to_path_buf()),
        ))
    }

    fn with_source(packages: Vec<String>, source: ManifestSource) -> Self {
        let source = if packages.is_empty() {
            ManifestSource::None
        } else {
            source
        };
        Self { packages, source }
    }

    /// Package identifiers, in declaration order.
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// Where the packages came from.
    pub fn source(&self) -> &ManifestSource {
        &self.source
    }

    /// Returns true if no packages are required.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Extract the package list from the first `capability-deps` directive line.
///
/// Later directives are ignored; lists are never merged.
pub fn extract_directive(source: &str) -> Vec<String> {
    source
        .lines()
        .find_map(|line| DIRECTIVE_RE.captures(line))
        .map(|caps| {
            caps[1]
                .split(',')
                .map(strip_version_qualifiers)
                .filter(|pkg| !pkg.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// `requests>=2.31` → `requests`.
fn strip_version_qualifiers(spec: &str) -> String {
    let mut bare = spec;
    for qualifier in VERSION_QUALIFIERS {
        if let Some((head, _)) = bare.split_once(qualifier) {
            bare = head;
        }
    }
    bare.trim().to_string()
}
