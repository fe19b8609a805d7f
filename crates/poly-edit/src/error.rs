// Fields referenced only from thiserror format strings read as unused to rustc.
#![allow(unused_assignments)]

//! Error types for polygon editing.
//!
//! Every failure maps to the legacy `-1` status. Edits that have nothing to
//! do (a coincident point, a tie line inside the boundary) are not errors;
//! they show up in the [`EditOutcome`](crate::EditOutcome) counts instead.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for polygon edit operations.
pub type PolyEditResult<T> = Result<T, PolyEditError>;

/// Machine-readable error codes.
///
/// Codes follow the pattern `POLY-XXXX` where:
/// - 1xxx = Input validation errors
/// - 2xxx = Union errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// POLY-1001: Packed arrays disagree with their counts
    InvalidInput = 1001,

    /// POLY-2001: Union output exceeds the caller's limits
    CapacityExceeded = 2001,
    /// POLY-2002: Union could not be computed
    UnionFailed = 2002,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `POLY-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "POLY-1001",
            ErrorCode::CapacityExceeded => "POLY-2001",
            ErrorCode::UnionFailed => "POLY-2002",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Suggested next step for a failed edit.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoverySuggestion {
    /// Make the packed counts agree with the coordinate arrays.
    CheckPackedCounts,
    /// Raise the output limits.
    RaiseLimits,
    /// No specific suggestion.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::CheckPackedCounts => write!(
                f,
                "Check that points_per_component sums to the number of points and \
                 components_per_polygon sums to the number of components"
            ),
            RecoverySuggestion::RaiseLimits => {
                write!(f, "Raise max_points or max_components in the output limits")
            }
            RecoverySuggestion::None => write!(f, "No specific suggestion available"),
        }
    }
}

/// Errors raised by polygon edit operations.
#[derive(Debug, Error, Diagnostic)]
pub enum PolyEditError {
    /// Packed input is inconsistent.
    #[error("invalid polygon input: {details}")]
    #[diagnostic(
        code(poly::input::invalid),
        help("x, y and tags must have one entry per point; counts must sum to the array lengths.")
    )]
    InvalidInput { details: String },

    /// Union output does not fit the limits.
    #[error("union output needs {needed} {what}, limit is {limit}")]
    #[diagnostic(code(poly::union::capacity))]
    CapacityExceeded {
        what: &'static str,
        needed: usize,
        limit: usize,
    },

    /// Union failed.
    #[error("polygon union failed: {details}")]
    #[diagnostic(code(poly::union::failed))]
    UnionFailed { details: String },
}

impl PolyEditError {
    /// Get the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            PolyEditError::InvalidInput { .. } => ErrorCode::InvalidInput,
            PolyEditError::CapacityExceeded { .. } => ErrorCode::CapacityExceeded,
            PolyEditError::UnionFailed { .. } => ErrorCode::UnionFailed,
        }
    }

    /// Legacy integer status. Always `-1`.
    #[inline]
    pub fn legacy_status(&self) -> i32 {
        -1
    }

    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            PolyEditError::InvalidInput { .. } => RecoverySuggestion::CheckPackedCounts,
            PolyEditError::CapacityExceeded { .. } => RecoverySuggestion::RaiseLimits,
            PolyEditError::UnionFailed { .. } => RecoverySuggestion::None,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(details: impl Into<String>) -> Self {
        PolyEditError::InvalidInput {
            details: details.into(),
        }
    }

    /// Create a union failure.
    pub fn union_failed(details: impl Into<String>) -> Self {
        PolyEditError::UnionFailed {
            details: details.into(),
        }
    }
}
