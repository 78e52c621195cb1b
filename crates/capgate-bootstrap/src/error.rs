//! Error types for dependency provisioning.

use capgate_catalog::CatalogError;
use thiserror::Error;

/// Errors that stop the run before the catalog is loaded.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The dependency manifest or the catalog directive could not be read.
    #[error(transparent)]
    Manifest(#[from] CatalogError),

    /// The current executable path is needed to relaunch and is unavailable.
    #[error("cannot determine the current executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    /// The provisioning program could not be started.
    #[error("failed to relaunch under `{program}`: {source}")]
    Relaunch {
        /// Provisioner program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A relaunched process still lacks packages the catalog declares.
    #[error("required packages still missing after provisioning: {}", .packages.join(", "))]
    StillMissing {
        /// Packages that the provisioned environment was not told about.
        packages: Vec<String>,
    },
}
