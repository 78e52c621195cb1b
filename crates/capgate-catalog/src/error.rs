//! Error types for catalog and manifest loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a run before any snippet executes.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file exists but could not be read.
    #[error("failed to read catalog {}: {source}", .path.display())]
    Read {
        /// Catalog path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A top-level definition could not be understood.
    #[error("malformed catalog {} at line {line}: {reason}", .path.display())]
    Malformed {
        /// Catalog path.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        reason: String,
    },

    /// A declared callable has no host implementation to bind to.
    #[error(
        "catalog {} line {line}: no host implementation for capability '{name}'; \
         register one with `CapabilityLibrary::register` (or `register_fn`) before loading, \
         or remove the definition",
        .path.display()
    )]
    Unbound {
        /// Catalog path.
        path: PathBuf,
        /// The declared name.
        name: String,
        /// 1-based line number of the declaration.
        line: usize,
    },

    /// The external dependency manifest exists but could not be read.
    #[error("failed to read dependency manifest {}: {source}", .path.display())]
    Manifest {
        /// Manifest path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
