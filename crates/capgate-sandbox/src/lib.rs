#![warn(missing_docs)]

//! # capgate-sandbox
//!
//! The guest side of capgate: everything between untrusted snippet text and
//! the external sandbox engine.
//!
//! ## Pipeline
//!
//! 1. [`scan::ReferenceScanner`] extracts call-like identifiers from the snippet
//! 2. [`filter::filter`] narrows the catalog to the names the snippet mentions
//! 3. [`adapter::SandboxAdapter`] builds the fixed request and invokes a
//!    [`SandboxEngine`], routing capability calls through the filtered set
//!
//! ## Security model
//!
//! - **Least privilege**: the engine only ever sees the filtered names
//! - **Host-side enforcement**: capability calls for unexposed names are
//!   refused by the dispatcher, whatever the engine asks for
//! - **Opaque engine**: isolation, interpretation and type checking are the
//!   engine's job; this crate never executes snippet code itself

pub mod adapter;
pub mod engine;
pub mod error;
pub mod filter;
pub mod host;
pub mod ipc;
pub mod scan;

use capgate_catalog::Arguments;
use capgate_error::CapabilityError;

pub use adapter::{AdapterConfig, SandboxAdapter};
pub use engine::{ExecutionRequest, ExecutionResult, FailureKind, SandboxEngine};
pub use error::SandboxError;
pub use filter::{filter, FilteredCapabilitySet};
pub use host::ProcessEngine;
pub use scan::{detect_indirection, BuiltinExclusions, ReferenceScanner, ReferenceSet};

/// Trait for dispatching capability calls from the engine back to the host.
///
/// This is the guest domain's only route to host capabilities. The
/// implementation handed to an engine holds the filtered set, never the full
/// catalog.
#[async_trait::async_trait]
pub trait CapabilityDispatcher: Send + Sync {
    /// Call an exposed capability.
    ///
    /// - `name`: capability name as written in the snippet
    /// - `args`: positional and keyword arguments relayed by the engine
    async fn call_capability(
        &self,
        name: &str,
        args: Arguments,
    ) -> Result<serde_json::Value, CapabilityError>;

    /// Names this dispatcher exposes, sorted.
    fn exposed(&self) -> Vec<String>;
}
