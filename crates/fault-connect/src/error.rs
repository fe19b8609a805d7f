// Fields referenced only from thiserror format strings read as unused to rustc.
#![allow(unused_assignments)]

//! Error and status types for fault connection.
//!
//! Every public operation reports one of four outcomes, matching the status
//! integers consumers of the legacy API expect:
//!
//! | status | meaning | Rust |
//! |--------|---------|------|
//! | `1` | applied | `Ok(Outcome::Applied)` |
//! | `0` | not ready, nothing done | `Ok(Outcome::NotReady)` |
//! | `-1` | fatal failure | `Err(ConnectError::..)` |
//! | `-2` | no seal could be found | `Err(ConnectError::NoSealFound { .. })` |
//!
//! Errors carry a machine-readable [`ErrorCode`] (`SEAL-XXXX`) and a
//! [`RecoverySuggestion`], and render through miette.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for fault connection operations.
pub type ConnectResult<T> = Result<T, ConnectError>;

/// Non-error outcome of a mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The operation ran to completion.
    Applied,
    /// Prerequisite data is missing or degenerate; state was left untouched.
    NotReady,
}

impl Outcome {
    /// Legacy integer status (`1` or `0`).
    #[inline]
    pub fn legacy_status(self) -> i32 {
        match self {
            Outcome::Applied => 1,
            Outcome::NotReady => 0,
        }
    }

    /// True for [`Outcome::Applied`].
    #[inline]
    pub fn is_applied(self) -> bool {
        self == Outcome::Applied
    }
}

/// Collapse a result into the legacy integer status.
pub fn legacy_status(result: &ConnectResult<Outcome>) -> i32 {
    match result {
        Ok(outcome) => outcome.legacy_status(),
        Err(err) => err.legacy_status(),
    }
}

/// Machine-readable error codes.
///
/// Codes follow the pattern `SEAL-XXXX` where:
/// - 1xxx = Input validation errors
/// - 2xxx = Geometry and collaborator errors
/// - 3xxx = Sealing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// SEAL-1001: Mesh indices are out of range
    InvalidMesh = 1001,
    /// SEAL-1002: A bracketing surface has not been set
    MissingBracket = 1002,
    /// SEAL-1003: Invalid parameters
    InvalidParams = 1003,

    /// SEAL-2001: Geometry is degenerate
    DegenerateGeometry = 2001,
    /// SEAL-2002: Best-fit plane could not be computed
    PlaneFitFailed = 2002,
    /// SEAL-2003: Grid interpolation failed
    GridFailed = 2003,
    /// SEAL-2004: Grid triangulation failed
    TriangulationFailed = 2004,

    /// SEAL-3001: No intersection between faults and detachment
    NoSealFound = 3001,
    /// SEAL-3002: Sealing solver failed
    SealingFailed = 3002,
    /// SEAL-3003: Sealing solver returned incomplete output
    IncompleteSeal = 3003,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `SEAL-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidMesh => "SEAL-1001",
            ErrorCode::MissingBracket => "SEAL-1002",
            ErrorCode::InvalidParams => "SEAL-1003",
            ErrorCode::DegenerateGeometry => "SEAL-2001",
            ErrorCode::PlaneFitFailed => "SEAL-2002",
            ErrorCode::GridFailed => "SEAL-2003",
            ErrorCode::TriangulationFailed => "SEAL-2004",
            ErrorCode::NoSealFound => "SEAL-3001",
            ErrorCode::SealingFailed => "SEAL-3002",
            ErrorCode::IncompleteSeal => "SEAL-3003",
        }
    }

    /// Legacy integer status for this code (`-2` for a missing seal, `-1` otherwise).
    pub fn legacy_status(&self) -> i32 {
        match self {
            ErrorCode::NoSealFound => -2,
            _ => -1,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Suggested next step for a failed operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoverySuggestion {
    /// Check the mesh index buffers.
    CheckMeshIndices,
    /// Call the bracket setters first.
    SetBracketSurfaces,
    /// Provide more spread-out input points.
    ProvideMorePoints,
    /// Set an explicit grid spacing.
    SetAverageSpacing,
    /// Make sure faults actually reach the detachment.
    CheckFaultExtent,
    /// Fix the named parameter.
    FixParameter { name: &'static str },
    /// No specific suggestion.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::CheckMeshIndices => {
                write!(f, "Check that every edge and triangle index refers to an existing node or edge")
            }
            RecoverySuggestion::SetBracketSurfaces => {
                write!(f, "Set both the lower and upper bracketing surfaces before calculating")
            }
            RecoverySuggestion::ProvideMorePoints => {
                write!(f, "Provide at least three non-collinear points spanning an area")
            }
            RecoverySuggestion::SetAverageSpacing => {
                write!(f, "Set an explicit grid spacing with set_average_spacing")
            }
            RecoverySuggestion::CheckFaultExtent => {
                write!(f, "Check that each fault reaches down to the detachment surface")
            }
            RecoverySuggestion::FixParameter { name } => {
                write!(f, "Check the value of parameter `{}`", name)
            }
            RecoverySuggestion::None => write!(f, "No specific suggestion available"),
        }
    }
}

/// Errors raised by fault connection operations.
#[derive(Debug, Error, Diagnostic)]
pub enum ConnectError {
    /// Mesh indices are inconsistent.
    #[error("invalid mesh: {details}")]
    #[diagnostic(
        code(seal::input::invalid_mesh),
        help("Every edge must reference two existing nodes and every triangle three existing edges.")
    )]
    InvalidMesh { details: String },

    /// A bracketing surface is missing.
    #[error("{which} bracketing surface has not been set")]
    #[diagnostic(
        code(seal::input::missing_bracket),
        help("Call set_detachment_lower_surface and set_detachment_upper_surface first.")
    )]
    MissingBracket { which: &'static str },

    /// Invalid parameter value.
    #[error("invalid parameter `{name}`: {details}")]
    #[diagnostic(code(seal::params::invalid))]
    InvalidParams { name: &'static str, details: String },

    /// Geometry is degenerate (empty or zero-area footprint).
    #[error("degenerate geometry: {details}")]
    #[diagnostic(
        code(seal::geometry::degenerate),
        help("The input points must span a non-zero area in plan view.")
    )]
    DegenerateGeometry { details: String },

    /// Plane fit failed.
    #[error("best-fit plane failed: {details}")]
    #[diagnostic(
        code(seal::plane::failed),
        help("Plane fitting needs at least three non-collinear points.")
    )]
    PlaneFitFailed { details: String },

    /// Grid interpolation failed.
    #[error("grid interpolation failed: {details}")]
    #[diagnostic(code(seal::grid::failed))]
    GridFailed { details: String },

    /// Grid triangulation failed.
    #[error("grid triangulation failed: {details}")]
    #[diagnostic(code(seal::grid::triangulation_failed))]
    TriangulationFailed { details: String },

    /// No intersection line could be found.
    #[error("no seal found: {details}")]
    #[diagnostic(
        code(seal::solver::no_seal),
        help("None of the padded faults intersect the padded detachment.")
    )]
    NoSealFound { details: String },

    /// Sealing solver failed.
    #[error("sealing failed: {details}")]
    #[diagnostic(code(seal::solver::failed))]
    SealingFailed { details: String },

    /// Sealing solver produced no output for one of its result sets.
    #[error("sealing solver returned no {missing}")]
    #[diagnostic(code(seal::solver::incomplete))]
    IncompleteSeal { missing: &'static str },
}

impl ConnectError {
    /// Get the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            ConnectError::InvalidMesh { .. } => ErrorCode::InvalidMesh,
            ConnectError::MissingBracket { .. } => ErrorCode::MissingBracket,
            ConnectError::InvalidParams { .. } => ErrorCode::InvalidParams,
            ConnectError::DegenerateGeometry { .. } => ErrorCode::DegenerateGeometry,
            ConnectError::PlaneFitFailed { .. } => ErrorCode::PlaneFitFailed,
            ConnectError::GridFailed { .. } => ErrorCode::GridFailed,
            ConnectError::TriangulationFailed { .. } => ErrorCode::TriangulationFailed,
            ConnectError::NoSealFound { .. } => ErrorCode::NoSealFound,
            ConnectError::SealingFailed { .. } => ErrorCode::SealingFailed,
            ConnectError::IncompleteSeal { .. } => ErrorCode::IncompleteSeal,
        }
    }

    /// Legacy integer status (`-1` or `-2`).
    #[inline]
    pub fn legacy_status(&self) -> i32 {
        self.code().legacy_status()
    }

    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            ConnectError::InvalidMesh { .. } => RecoverySuggestion::CheckMeshIndices,
            ConnectError::MissingBracket { .. } => RecoverySuggestion::SetBracketSurfaces,
            ConnectError::InvalidParams { name, .. } => RecoverySuggestion::FixParameter { name },
            ConnectError::DegenerateGeometry { .. } | ConnectError::PlaneFitFailed { .. } => {
                RecoverySuggestion::ProvideMorePoints
            }
            ConnectError::GridFailed { .. } | ConnectError::TriangulationFailed { .. } => {
                RecoverySuggestion::SetAverageSpacing
            }
            ConnectError::NoSealFound { .. } => RecoverySuggestion::CheckFaultExtent,
            ConnectError::SealingFailed { .. } | ConnectError::IncompleteSeal { .. } => {
                RecoverySuggestion::None
            }
        }
    }

    /// Create an invalid mesh error.
    pub fn invalid_mesh(details: impl Into<String>) -> Self {
        ConnectError::InvalidMesh {
            details: details.into(),
        }
    }

    /// Create a degenerate geometry error.
    pub fn degenerate(details: impl Into<String>) -> Self {
        ConnectError::DegenerateGeometry {
            details: details.into(),
        }
    }

    /// Create a plane fit error.
    pub fn plane_fit(details: impl Into<String>) -> Self {
        ConnectError::PlaneFitFailed {
            details: details.into(),
        }
    }

    /// Create a grid interpolation error.
    pub fn grid(details: impl Into<String>) -> Self {
        ConnectError::GridFailed {
            details: details.into(),
        }
    }

    /// Create a triangulation error.
    pub fn triangulation(details: impl Into<String>) -> Self {
        ConnectError::TriangulationFailed {
            details: details.into(),
        }
    }

    /// Create a no-seal error.
    pub fn no_seal(details: impl Into<String>) -> Self {
        ConnectError::NoSealFound {
            details: details.into(),
        }
    }

    /// Create a sealing failure.
    pub fn sealing(details: impl Into<String>) -> Self {
        ConnectError::SealingFailed {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::InvalidMesh.as_str(), "SEAL-1001");
        assert_eq!(ErrorCode::TriangulationFailed.as_str(), "SEAL-2004");
        assert_eq!(ErrorCode::IncompleteSeal.as_str(), "SEAL-3003");
        assert_eq!(format!("{}", ErrorCode::NoSealFound), "SEAL-3001");
    }

    #[test]
    fn test_legacy_status() {
        assert_eq!(ConnectError::no_seal("nothing crosses").legacy_status(), -2);
        assert_eq!(ConnectError::sealing("boom").legacy_status(), -1);
        assert_eq!(
            ConnectError::MissingBracket { which: "lower" }.legacy_status(),
            -1
        );
        assert_eq!(legacy_status(&Ok(Outcome::Applied)), 1);
        assert_eq!(legacy_status(&Ok(Outcome::NotReady)), 0);
        assert_eq!(legacy_status(&Err(ConnectError::degenerate("flat"))), -1);
    }

    #[test]
    fn test_error_display() {
        let err = ConnectError::MissingBracket { which: "upper" };
        assert_eq!(err.to_string(), "upper bracketing surface has not been set");
        assert_eq!(err.code(), ErrorCode::MissingBracket);

        let err = ConnectError::IncompleteSeal {
            missing: "intersection lines",
        };
        assert!(err.to_string().contains("intersection lines"));
    }

    #[test]
    fn test_recovery_suggestions() {
        assert_eq!(
            ConnectError::no_seal("x").recovery_suggestion(),
            RecoverySuggestion::CheckFaultExtent
        );
        let suggestion = ConnectError::InvalidParams {
            name: "max_z_normal",
            details: "must be in (0, 1]".into(),
        }
        .recovery_suggestion();
        assert!(suggestion.to_string().contains("max_z_normal"));
    }
}
