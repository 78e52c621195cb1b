//! Static reference scanner for untrusted snippets.
//!
//! A lexical approximation, not a parser: every `identifier(` occurrence is a
//! candidate capability reference unless the identifier is a builtin. It never
//! resolves scope, so a local function named like a capability still counts.
//! That errs toward over-inclusion, which is safe: the worst case is a
//! capability offered but unused.
//!
//! Known gap: names assembled at runtime (`getattr(mod, "gr" + "eet")`) are
//! invisible to the scanner. [`detect_indirection`] flags the usual markers so
//! the caller can warn or refuse.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

static CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());

/// Reserved words and builtins of the guest language excluded by default.
pub const DEFAULT_BUILTINS: &[&str] = &[
    "print", "len", "str", "int", "float", "bool", "list", "dict", "set",
    "tuple", "range", "enumerate", "zip", "map", "filter", "sorted",
    "reversed", "type", "isinstance", "hasattr", "getattr", "setattr",
    "delattr", "break", "continue", "pass", "return", "yield", "raise",
    "try", "except", "finally", "async", "await", "if", "else", "elif",
    "for", "while", "def", "class", "import", "from", "as", "assert",
    "del", "global", "nonlocal", "lambda", "or", "and", "not", "in",
    "True", "False", "None", "self", "super", "__import__",
];

/// Markers of indirect invocation the scanner cannot see through.
const INDIRECTION_MARKERS: &[&str] = &[
    "getattr(",
    "globals(",
    "locals(",
    "vars(",
    "eval(",
    "exec(",
    "__import__",
    "__dict__",
    "__builtins__",
];

/// Names never treated as capability references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinExclusions {
    names: HashSet<String>,
}

impl Default for BuiltinExclusions {
    fn default() -> Self {
        Self::new(DEFAULT_BUILTINS.iter().copied())
    }
}

impl BuiltinExclusions {
    /// Build an exclusion set from exactly `names`.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from config: `replace` swaps out the defaults, `extra` adds to
    /// whichever base is in effect.
    pub fn from_overrides(replace: Option<&[String]>, extra: &[String]) -> Self {
        let mut set = match replace {
            Some(names) => Self::new(names.iter().cloned()),
            None => Self::default(),
        };
        set.extend(extra.iter().cloned());
        set
    }

    /// Add names to the set.
    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
    }

    /// Returns true if `name` is excluded.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of excluded names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Identifiers a snippet appears to call. Recomputed every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet(BTreeSet<String>);

impl ReferenceSet {
    /// Returns true if `name` was referenced.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Referenced names, sorted.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of referenced names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing was referenced.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ReferenceSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Extracts the [`ReferenceSet`] of a snippet.
#[derive(Debug, Clone, Default)]
pub struct ReferenceScanner {
    exclusions: BuiltinExclusions,
}

impl ReferenceScanner {
    /// Create a scanner with the given exclusion set.
    pub fn new(exclusions: BuiltinExclusions) -> Self {
        Self { exclusions }
    }

    /// The exclusion set in use.
    pub fn exclusions(&self) -> &BuiltinExclusions {
        &self.exclusions
    }

    /// Scan snippet text. Pure: identical input gives identical output.
    pub fn scan(&self, code: &str) -> ReferenceSet {
        CALL_RE
            .captures_iter(code)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|name| !self.exclusions.contains(name))
            .collect()
    }
}

/// Indirection markers present in `code`, in a fixed order.
pub fn detect_indirection(code: &str) -> Vec<&'static str> {
    INDIRECTION_MARKERS
        .iter()
        .copied()
        .filter(|marker| code.contains(marker))
        .collect()
}
