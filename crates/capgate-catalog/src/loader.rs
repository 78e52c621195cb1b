//! Catalog loading: source text → bound [`CapabilityCatalog`].

use std::path::{Path, PathBuf};

use crate::error::CatalogError;
use crate::manifest::DependencyManifest;
use crate::parse::parse_definitions;
use crate::{CapabilityCatalog, CapabilityDescriptor, CapabilityLibrary};

/// Everything a run needs from the catalog file.
#[derive(Debug, Clone, Default)]
pub struct LoadedCatalog {
    /// Declared capabilities bound to host implementations.
    pub catalog: CapabilityCatalog,
    /// Packages named by the inline directive.
    pub manifest: DependencyManifest,
    /// Raw catalog source, later handed to the engine as type stubs.
    pub source: String,
    /// Where the catalog was read from.
    pub path: PathBuf,
}

/// Loads catalog sources against a host [`CapabilityLibrary`].
pub struct CatalogLoader<'a> {
    library: &'a CapabilityLibrary,
}

impl<'a> CatalogLoader<'a> {
    /// Create a loader that binds declarations to `library`.
    pub fn new(library: &'a CapabilityLibrary) -> Self {
        Self { library }
    }

    /// Load the catalog at `path`.
    ///
    /// A missing file is not an error: it yields an empty catalog, an empty
    /// manifest and empty source. Any other failure aborts the load with no
    /// partial catalog.
    pub fn load(&self, path: &Path) -> Result<LoadedCatalog, CatalogError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no catalog file, no capabilities available");
            return Ok(LoadedCatalog {
                path: path.to_path_buf(),
                ..LoadedCatalog::default()
            });
        }

        let source = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let loaded = self.load_source(path, source)?;
        tracing::info!(
            path = %path.display(),
            capabilities = loaded.catalog.len(),
            dependencies = loaded.manifest.packages().len(),
            "loaded capability catalog"
        );
        Ok(loaded)
    }

    /// Load catalog text that has already been read. `path` is used for errors.
    pub fn load_source(&self, path: &Path, source: String) -> Result<LoadedCatalog, CatalogError> {
        let definitions = parse_definitions(&source).map_err(|issue| CatalogError::Malformed {
            path: path.to_path_buf(),
            line: issue.line,
            reason: issue.reason,
        })?;

        let mut catalog = CapabilityCatalog::new();
        for def in definitions {
            if def.name.starts_with('_') {
                tracing::trace!(name = %def.name, "skipping private catalog definition");
                continue;
            }

            let handle = self
                .library
                .get(&def.name)
                .ok_or_else(|| CatalogError::Unbound {
                    path: path.to_path_buf(),
                    name: def.name.clone(),
                    line: def.line,
                })?;

            tracing::debug!(
                capability = %def.name,
                signature = %def.signature,
                line = def.line,
                "bound capability"
            );
            catalog.insert(CapabilityDescriptor {
                name: def.name,
                signature: def.signature,
                is_async: def.is_async,
                line: def.line,
                handle,
            });
        }

        let manifest = DependencyManifest::from_directive(&source);

        Ok(LoadedCatalog {
            catalog,
            manifest,
            source,
            path: path.to_path_buf(),
        })
    }
}
