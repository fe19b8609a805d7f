//! Connecting fault surfaces to a detachment surface.
//!
//! A detachment is a low-angle surface that faults sole into. Given a
//! triangulated (or scattered-point) detachment and a set of fault
//! surfaces, this crate extends each surface so the faults are guaranteed
//! to cut the detachment, intersects them, and publishes the sealed
//! surfaces together with the fault/detachment contact lines.
//!
//! # Workflow
//!
//! 1. Feed input with [`FaultConnect::set_detachment`],
//!    [`FaultConnect::set_fault`] or the `add_*` variants.
//! 2. Call [`FaultConnect::connect_faults`]. Internally this
//!    - computes the model box and a grid spacing,
//!    - pads the detachment over its footprint plus a margin,
//!    - pads each fault in its best-fit plane down past the model floor,
//!    - seals the padded faults against the padded detachment.
//! 3. Read the results with [`FaultConnect::connected_detachment`],
//!    [`FaultConnect::connected_fault`] and
//!    [`FaultConnect::fault_contact_line`].
//!
//! Separately, [`FaultConnect::calc_detachment`] interpolates a detachment
//! between a lower and an upper bracketing surface by age.
//!
//! # Status Codes
//!
//! Operations return [`ConnectResult<Outcome>`]. Use [`legacy_status`] to
//! collapse a result into the integer status (`1`, `0`, `-1`, `-2`) older
//! consumers expect.
//!
//! # Quick Start
//!
//! ```no_run
//! use fault_connect::{FaultConnect, Outcome, TriMesh};
//! use nalgebra::Point3;
//!
//! # fn main() -> fault_connect::ConnectResult<()> {
//! let detachment = TriMesh::from_indexed(
//!     &[
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(10.0, 0.0, 0.0),
//!         Point3::new(10.0, 10.0, 0.0),
//!         Point3::new(0.0, 10.0, 0.0),
//!     ],
//!     &[[0, 1, 2], [0, 2, 3]],
//! )?;
//! let fault = TriMesh::from_indexed(
//!     &[
//!         Point3::new(5.0, 2.0, 1.0),
//!         Point3::new(5.0, 8.0, 1.0),
//!         Point3::new(5.0, 8.0, 6.0),
//!         Point3::new(5.0, 2.0, 6.0),
//!     ],
//!     &[[0, 1, 2], [0, 2, 3]],
//! )?;
//!
//! let mut fc = FaultConnect::new();
//! fc.set_detachment(&detachment)?;
//! fc.set_fault(1, &fault, None)?;
//! if fc.connect_faults()? == Outcome::Applied {
//!     let line = fc.fault_contact_line(0).expect("one contact line");
//!     println!("fault {} meets the detachment along {} points", line.fault_id, line.point_count());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! Operations emit `tracing` events. Install a subscriber and set
//! `RUST_LOG=fault_connect=debug` for details; per-operation timings are
//! logged under the `fault_connect::timing` target.

mod bracket;
mod connect;
mod error;
mod grid;
mod padding;
mod params;
mod plane;
mod seal;
pub mod tracing_ext;
mod types;

pub use bracket::{AgeBracket, interpolate_detachment};
pub use connect::{FaultConnect, SurfaceSnapshot};
pub use error::{
    ConnectError, ConnectResult, ErrorCode, Outcome, RecoverySuggestion, legacy_status,
};
pub use grid::{
    GRID_NULL, Grid, GridArea, GridEngine, IdwGridEngine, TriangulationScheme, grid_to_trimesh,
    is_null, rasterize_trimesh,
};
pub use padding::{
    DetachmentPad, collect_dipping_points, low_point_indices, pad_detachment, pad_fault,
    pad_fault_surface, triangle_normal,
};
pub use params::{
    BracketParams, ConnectParams, EDGE_LENGTH_CORRECTION, FAULT_LIST_CHUNK, OwnerIdPolicy,
    PadParams,
};
pub use plane::{PlaneFitter, SurfacePlane, fit_height_plane, height_plane_z};
pub use seal::{
    IntersectionSealer, RawIntersectionLine, SealParams, SealedFault, SealingSolver,
};
pub use types::{
    Bounds3, DETACHMENT_ID, Edge, IntersectionLine, MIN_EDGES, MIN_NODES, MIN_TRIANGLES, Node,
    Surface, TriMesh, Triangle,
};
