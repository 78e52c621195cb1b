#![warn(missing_docs)]

//! # capgate-catalog
//!
//! The capability catalog: the trusted description of every host-side
//! callable a snippet could be offered, plus the runtime packages those
//! callables need.
//!
//! ## Trust model
//!
//! The catalog source is authored by the operator and loaded with full host
//! privilege. Each public top-level callable it declares is bound to a host
//! implementation from a [`CapabilityLibrary`]. Untrusted snippet text never
//! influences this step; it only narrows the result later, in the filter.

pub mod builtin;
pub mod error;
pub mod loader;
pub mod manifest;
mod parse;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use capgate_error::CapabilityError;
pub use error::CatalogError;
pub use loader::{CatalogLoader, LoadedCatalog};
pub use manifest::{extract_directive, DependencyManifest, ManifestSource};

/// A host-side callable that sandboxed code may invoke once exposed.
///
/// Implementations run in the host domain with full privilege. The sandbox
/// reaches them only through the filtered dispatcher, never directly.
#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    /// Name the snippet uses to call this capability.
    fn name(&self) -> &str;

    /// Invoke the capability with the arguments the snippet supplied.
    async fn call(&self, args: Arguments) -> Result<Value, CapabilityError>;
}

/// Arguments of a single capability call, as relayed by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    /// Positional arguments, in call order.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl Arguments {
    /// Build positional-only arguments.
    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: Map::new(),
        }
    }

    /// Attach the capability name so accessor errors say who rejected what.
    pub fn bind<'a>(&'a self, capability: &'a str) -> BoundArguments<'a> {
        BoundArguments {
            capability,
            args: self,
        }
    }
}

/// Typed access to [`Arguments`] on behalf of one capability.
///
/// Each accessor looks a parameter up by position first, then by keyword.
pub struct BoundArguments<'a> {
    capability: &'a str,
    args: &'a Arguments,
}

impl<'a> BoundArguments<'a> {
    /// Raw value of a parameter.
    pub fn value(&self, index: usize, name: &str) -> Result<&'a Value, CapabilityError> {
        self.args
            .args
            .get(index)
            .or_else(|| self.args.kwargs.get(name))
            .ok_or_else(|| {
                CapabilityError::invalid(self.capability, format!("missing argument '{name}'"))
            })
    }

    /// String parameter.
    pub fn str(&self, index: usize, name: &str) -> Result<&'a str, CapabilityError> {
        self.value(index, name)?.as_str().ok_or_else(|| {
            CapabilityError::invalid(self.capability, format!("'{name}' must be a string"))
        })
    }

    /// Integer parameter.
    pub fn int(&self, index: usize, name: &str) -> Result<i64, CapabilityError> {
        self.value(index, name)?.as_i64().ok_or_else(|| {
            CapabilityError::invalid(self.capability, format!("'{name}' must be an integer"))
        })
    }

    /// Numeric parameter (integer or float).
    pub fn number(&self, index: usize, name: &str) -> Result<&'a serde_json::Number, CapabilityError> {
        match self.value(index, name)? {
            Value::Number(n) => Ok(n),
            _ => Err(CapabilityError::invalid(
                self.capability,
                format!("'{name}' must be a number"),
            )),
        }
    }
}

/// Capability backed by a plain synchronous function.
pub struct FnCapability<F> {
    name: String,
    func: F,
}

impl<F> FnCapability<F>
where
    F: Fn(&Arguments) -> Result<Value, CapabilityError> + Send + Sync,
{
    /// Wrap `func` as the capability `name`.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait::async_trait]
impl<F> Capability for FnCapability<F>
where
    F: Fn(&Arguments) -> Result<Value, CapabilityError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, args: Arguments) -> Result<Value, CapabilityError> {
        (self.func)(&args)
    }
}

/// Host registry of capability implementations, keyed by name.
#[derive(Clone, Default)]
pub struct CapabilityLibrary {
    entries: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Library pre-populated with the example capabilities in [`builtin`].
    pub fn builtin() -> Self {
        let mut library = Self::new();
        builtin::register_all(&mut library);
        library
    }

    /// Register an implementation under its own name, replacing any previous one.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.entries
            .insert(capability.name().to_string(), capability);
    }

    /// Register a synchronous function as a capability.
    pub fn register_fn<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&Arguments) -> Result<Value, CapabilityError> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnCapability::new(name, func)));
    }

    /// Look up an implementation.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.entries.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for CapabilityLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

/// One catalog entry: a declared callable bound to its host implementation.
#[derive(Clone)]
pub struct CapabilityDescriptor {
    /// Capability name (unique within a catalog).
    pub name: String,
    /// Declared parameter and return text, e.g. `(name: str) -> str`.
    pub signature: String,
    /// Whether the declaration was `async def`.
    pub is_async: bool,
    /// 1-based line of the declaration in the catalog source.
    pub line: usize,
    /// The host implementation.
    pub handle: Arc<dyn Capability>,
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("is_async", &self.is_async)
            .field("line", &self.line)
            .finish_non_exhaustive()
    }
}

/// The full set of capabilities declared by a catalog, keyed by name.
///
/// BTreeMap for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    entries: BTreeMap<String, CapabilityDescriptor>,
}

impl CapabilityCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor, replacing any earlier one with the same name.
    pub fn insert(&mut self, descriptor: CapabilityDescriptor) {
        self.entries.insert(descriptor.name.clone(), descriptor);
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.entries.get(name)
    }

    /// Whether the catalog declares `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Declared names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over `(name, descriptor)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CapabilityDescriptor)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of declared capabilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
