#![warn(missing_docs)]

//! Typed error for capability calls crossing the host/guest boundary.
//!
//! Provides [`CapabilityError`], returned by every host capability
//! implementation and by the guest-side dispatcher that only exposes the
//! filtered capability set.

use thiserror::Error;

/// Canonical error type for capability dispatch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CapabilityError {
    /// The snippet asked for a capability that was not exposed to it.
    #[error("capability not exposed to this snippet: {name}")]
    NotExposed {
        /// The requested capability name.
        name: String,
    },

    /// The arguments did not match what the capability expects.
    #[error("invalid arguments for '{name}': {reason}")]
    InvalidArguments {
        /// The capability that rejected its arguments.
        name: String,
        /// What was wrong with them.
        reason: String,
    },

    /// The host implementation ran and failed.
    #[error("capability '{name}' failed: {message}")]
    Failed {
        /// The capability that failed.
        name: String,
        /// Failure description from the implementation.
        message: String,
    },

    /// An internal error (catch-all for unexpected failures).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CapabilityError {
    /// Returns a static error code string for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotExposed { .. } => "NOT_EXPOSED",
            Self::InvalidArguments { .. } => "INVALID_ARGUMENTS",
            Self::Failed { .. } => "CAPABILITY_FAILED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Shorthand for [`CapabilityError::InvalidArguments`].
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Convert to a structured JSON error object.
    ///
    /// `known` lists the capability names the caller could have used; for
    /// `NotExposed` errors the closest one is offered as `suggested_fix`.
    pub fn to_structured_error(&self, known: Option<&[&str]>) -> serde_json::Value {
        let suggested_fix = match self {
            Self::NotExposed { name } => known.and_then(|names| suggest_similar(name, names)),
            _ => None,
        };

        let mut obj = serde_json::json!({
            "error": true,
            "code": self.code(),
            "message": self.to_string(),
        });

        if let Some(fix) = suggested_fix {
            obj["suggested_fix"] = serde_json::Value::String(fix);
        }

        obj
    }
}

/// Find the closest name within Levenshtein distance 2.
///
/// Returns a "Did you mean" hint, or `None` if nothing is close enough or
/// the name is an exact match.
pub fn suggest_similar(name: &str, known: &[&str]) -> Option<String> {
    let mut best: Option<(usize, &str)> = None;

    for &candidate in known {
        let dist = strsim::levenshtein(name, candidate);
        if dist == 0 || dist > 2 {
            continue;
        }
        if best.is_none_or(|(d, _)| dist < d) {
            best = Some((dist, candidate));
        }
    }

    best.map(|(_, candidate)| format!("Did you mean '{candidate}'?"))
}

// Compile-time assertion: CapabilityError must be Send + Sync + 'static
const _: fn() = || {
    fn assert_bounds<T: Send + Sync + 'static>() {}
    assert_bounds::<CapabilityError>();
};
