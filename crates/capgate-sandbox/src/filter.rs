//! Capability filter: narrows the catalog to what a snippet references.

use std::collections::BTreeMap;

use capgate_catalog::{Arguments, CapabilityCatalog, CapabilityDescriptor};
use capgate_error::{suggest_similar, CapabilityError};
use serde_json::Value;

use crate::scan::ReferenceSet;
use crate::CapabilityDispatcher;

/// The capabilities actually offered to one run.
///
/// Always a subset of the catalog, keyed only by referenced names.
#[derive(Debug, Clone, Default)]
pub struct FilteredCapabilitySet {
    entries: BTreeMap<String, CapabilityDescriptor>,
}

/// `{ (n, d) in catalog | n in refs }`.
///
/// A reference with no catalog entry is dropped silently; calling it is the
/// engine's problem. No mentions gives an empty set.
pub fn filter(catalog: &CapabilityCatalog, refs: &ReferenceSet) -> FilteredCapabilitySet {
    let entries = catalog
        .iter()
        .filter(|(name, _)| refs.contains(name))
        .map(|(name, descriptor)| (name.to_string(), descriptor.clone()))
        .collect();
    FilteredCapabilitySet { entries }
}

impl FilteredCapabilitySet {
    /// Exposed names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Look up an exposed descriptor.
    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.entries.get(name)
    }

    /// Whether `name` is exposed.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of exposed capabilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is exposed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl CapabilityDispatcher for FilteredCapabilitySet {
    async fn call_capability(&self, name: &str, args: Arguments) -> Result<Value, CapabilityError> {
        let Some(descriptor) = self.entries.get(name) else {
            let exposed: Vec<&str> = self.entries.keys().map(String::as_str).collect();
            tracing::warn!(
                capability = %name,
                suggestion = suggest_similar(name, &exposed).as_deref().unwrap_or("none"),
                "engine requested a capability that is not exposed"
            );
            return Err(CapabilityError::NotExposed {
                name: name.to_string(),
            });
        };

        tracing::debug!(capability = %name, "dispatching capability call");
        descriptor.handle.call(args).await
    }

    fn exposed(&self) -> Vec<String> {
        self.names()
    }
}
