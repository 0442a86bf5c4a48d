//! Error types for `correlate-core`.
//!
//! Every error carries a stable machine-readable code in addition to its
//! human-facing message, following the convention used by the rest of the
//! workspace: two categories, matching the two failure modes the engine can
//! produce.
//!
//! | Range | Category            |
//! |-------|---------------------|
//! | E1xxx | Invalid argument    |
//! | E9xxx | Internal invariant  |

use std::fmt;

/// Machine-readable error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidArgument,
    InvariantViolation,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidArgument => "E1001",
            Self::InvariantViolation => "E9001",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Top-level error type for all `correlate-core` operations.
///
/// The engine never panics on caller-supplied input and never retries;
/// any error aborts the current `correlate()` call without mutating
/// dataset state (no partial results are ever returned on failure).
#[derive(Debug, thiserror::Error)]
pub enum CorrelateError {
    /// A caller-supplied argument was out of range or combined with another
    /// in a way the engine does not support (e.g. `ranking_factor` and
    /// `ranking_bonus` both nonzero, a negative `minimum_score`, or a fuzzy
    /// `compare()` implementation returning a value outside `[0, 1]`).
    #[error("{message}")]
    InvalidArgument {
        message: String,
        hint: Option<&'static str>,
    },

    /// An internal assertion failed (sorted-order, subset-relation, or
    /// index-bounds invariant). This indicates a bug in `correlate-core`
    /// itself, not a user error; it is not expected to be reachable through
    /// the public API and should be reported upstream if it ever fires.
    #[error("{message}")]
    InvariantViolation { message: String },
}

impl CorrelateError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            hint: None,
        }
    }

    pub(crate) fn invalid_argument_with_hint(
        message: impl Into<String>,
        hint: &'static str,
    ) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            hint: Some(hint),
        }
    }

    pub(crate) fn invariant_violation(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::InvariantViolation { .. } => ErrorCode::InvariantViolation,
        }
    }

    /// Remediation hint, if one applies.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidArgument { hint, .. } => *hint,
            Self::InvariantViolation { .. } => None,
        }
    }
}
