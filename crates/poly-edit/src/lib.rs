//! Editing packed boundary polygons.
//!
//! Two edits are provided, both followed by a re-union of the rings:
//!
//! - [`PolyEdit::add_points_to_boundary`] links each point into the ring
//!   edge it lies closest to.
//! - [`PolyEdit::add_tie_line_to_boundary`] extends the boundary so it
//!   reaches the outside ends of a tie line.
//!
//! Polygons travel as [`PackedPolygons`]: flat coordinate and tag arrays
//! with per-polygon component counts and per-component point counts. Tags
//! are opaque to this crate and are carried along with their points.
//!
//! # Example
//!
//! ```
//! use poly_edit::{OutputLimits, PackedPolygons, PolyEdit, TaggedPoint};
//!
//! let square = vec![
//!     TaggedPoint::new(0.0, 0.0, "a"),
//!     TaggedPoint::new(10.0, 0.0, "b"),
//!     TaggedPoint::new(10.0, 10.0, "c"),
//!     TaggedPoint::new(0.0, 10.0, "d"),
//!     TaggedPoint::new(0.0, 0.0, "a"),
//! ];
//! let polys = PackedPolygons::from_rings(vec![vec![square]]);
//!
//! let out = PolyEdit::new()
//!     .add_points_to_boundary(&polys, &[TaggedPoint::new(9.0, 5.0, "p")], &OutputLimits::unbounded())
//!     .unwrap();
//! assert_eq!(out.inserted, 1);
//! assert_eq!(out.polygons.tags, vec!["a", "b", "p", "c", "d", "a"]);
//! ```
//!
//! The union step is pluggable through [`ComponentUnion`]; the default
//! [`RingRepairUnion`] cleans rings without merging them.

mod boundary;
mod edit;
mod error;
pub mod geometry;
mod polygons;
mod union;

pub use edit::{EditOutcome, PolyEdit};
pub use error::{ErrorCode, PolyEditError, PolyEditResult, RecoverySuggestion};
pub use polygons::{OutputLimits, PackedPolygons, TaggedPoint};
pub use union::{ComponentUnion, RingRepairUnion};
