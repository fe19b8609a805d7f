//! The fault connection workflow.
//!
//! [`FaultConnect`] owns every surface involved in connecting faults to a
//! detachment:
//!
//! - the input detachment and input faults, set or accumulated by callers;
//! - the padded detachment and padded faults built by [`connect_faults`];
//! - the published sealed state (detachment, faults and contact lines);
//! - the bracketing surfaces used by [`calc_detachment`].
//!
//! Every setter deep copies its input. Updates that can fail are built in
//! locals and committed only on success, so a failed call leaves
//! previously published results untouched.
//!
//! [`connect_faults`]: FaultConnect::connect_faults
//! [`calc_detachment`]: FaultConnect::calc_detachment

use std::marker::PhantomData;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bracket::{self, AgeBracket};
use crate::error::{ConnectError, ConnectResult, Outcome};
use crate::grid::{GridEngine, IdwGridEngine};
use crate::padding;
use crate::params::{ConnectParams, EDGE_LENGTH_CORRECTION, FAULT_LIST_CHUNK, MAX_VALID_SPACING};
use crate::plane::{PlaneFitter, SurfacePlane, height_plane_z};
use crate::seal::{IntersectionSealer, SealingSolver};
use crate::tracing_ext::{OperationTimer, log_seal_result, log_surface_stats};
use crate::types::{Bounds3, DETACHMENT_ID, IntersectionLine, Surface, TriMesh};

/// Owned copy of a stored surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSnapshot {
    pub id: i32,
    pub mesh: TriMesh,
    pub plane: Option<SurfacePlane>,
}

impl From<&Surface> for SurfaceSnapshot {
    fn from(surface: &Surface) -> Self {
        Self {
            id: surface.id,
            mesh: surface.mesh.clone(),
            plane: surface.plane,
        }
    }
}

/// Results of one successful `connect_faults` call, replaced as a unit.
#[derive(Debug, Clone)]
struct SealedState {
    detachment: Surface,
    faults: Vec<Surface>,
    lines: Vec<IntersectionLine>,
}

/// Connects fault surfaces to a detachment surface.
///
/// `G` grids scattered data, `S` intersects and seals the padded surfaces.
/// A fresh `S` is built for every [`connect_faults`](Self::connect_faults).
///
/// # Example
///
/// ```
/// use fault_connect::{FaultConnect, Outcome};
/// use nalgebra::Point3;
///
/// let mut fc = FaultConnect::new();
/// assert_eq!(fc.connect_faults().unwrap(), Outcome::NotReady);
///
/// fc.add_points_to_fault(7, &[Point3::new(0.0, 0.0, 0.0)]).unwrap();
/// assert_eq!(fc.input_fault_count(), 1);
/// ```
#[derive(Debug)]
pub struct FaultConnect<G = IdwGridEngine, S = IntersectionSealer> {
    engine: G,
    params: ConnectParams,

    detachment: Option<Surface>,
    detach_lower: Option<Surface>,
    detach_upper: Option<Surface>,
    detach_calc: Option<Surface>,
    input_faults: Vec<Surface>,

    padded_detachment: Option<Surface>,
    padded_faults: Vec<Surface>,
    sealed: Option<SealedState>,

    limits: Option<Bounds3>,
    average_edge_length: Option<f64>,
    detachment_plane: Option<[f64; 3]>,

    _solver: PhantomData<fn() -> S>,
}

impl FaultConnect {
    /// Create an instance with the default grid engine and sealer.
    pub fn new() -> Self {
        Self::with_engine(IdwGridEngine::default())
    }
}

impl Default for FaultConnect {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: GridEngine, S: SealingSolver + Default> FaultConnect<G, S> {
    /// Create an instance around a custom grid engine.
    pub fn with_engine(engine: G) -> Self {
        Self {
            engine,
            params: ConnectParams::default(),
            detachment: None,
            detach_lower: None,
            detach_upper: None,
            detach_calc: None,
            input_faults: Vec::with_capacity(FAULT_LIST_CHUNK),
            padded_detachment: None,
            padded_faults: Vec::new(),
            sealed: None,
            limits: None,
            average_edge_length: None,
            detachment_plane: None,
            _solver: PhantomData,
        }
    }

    /// Replace the parameters after validating them.
    pub fn with_params(mut self, params: ConnectParams) -> ConnectResult<Self> {
        params.validate()?;
        self.params = params;
        Ok(self)
    }

    pub fn params(&self) -> &ConnectParams {
        &self.params
    }

    pub fn engine(&self) -> &G {
        &self.engine
    }

    // ------------------------------------------------------------------
    // Input surfaces
    // ------------------------------------------------------------------

    /// Replace the detachment with a copy of `mesh`.
    ///
    /// Meshes below the minimum size are ignored and report
    /// [`Outcome::Applied`]; inconsistent meshes are rejected.
    pub fn set_detachment(&mut self, mesh: &TriMesh) -> ConnectResult<Outcome> {
        if !accept_mesh(mesh, "detachment")? {
            return Ok(Outcome::Applied);
        }
        self.detachment = Some(Surface::from_mesh(DETACHMENT_ID, mesh.clone()));
        Ok(Outcome::Applied)
    }

    /// Create or replace the fault `id` with a copy of `mesh`.
    ///
    /// A known best-fit plane can be supplied; otherwise one is fitted
    /// when the fault is padded.
    pub fn set_fault(
        &mut self,
        id: i32,
        mesh: &TriMesh,
        plane: Option<SurfacePlane>,
    ) -> ConnectResult<Outcome> {
        if !accept_mesh(mesh, "fault")? {
            return Ok(Outcome::Applied);
        }
        let mut surface = Surface::from_mesh(id, mesh.clone());
        surface.plane = plane;
        match self.find_input_fault(id) {
            Some(index) => self.input_faults[index] = surface,
            None => self.push_fault(surface),
        }
        Ok(Outcome::Applied)
    }

    /// Merge the nodes of `mesh` into the detachment for re-triangulation.
    pub fn add_to_detachment(&mut self, mesh: &TriMesh) -> ConnectResult<Outcome> {
        match self.detachment.as_mut() {
            None => self.set_detachment(mesh),
            Some(surface) => {
                if accept_mesh(mesh, "detachment")? {
                    surface.append_mesh(mesh);
                }
                Ok(Outcome::Applied)
            }
        }
    }

    /// Merge the nodes of `mesh` into fault `id`, creating it if needed.
    pub fn add_to_fault(&mut self, id: i32, mesh: &TriMesh) -> ConnectResult<Outcome> {
        match self.find_input_fault(id) {
            None => self.set_fault(id, mesh, None),
            Some(index) => {
                if accept_mesh(mesh, "fault")? {
                    self.input_faults[index].append_mesh(mesh);
                }
                Ok(Outcome::Applied)
            }
        }
    }

    /// Stage raw points on the detachment.
    pub fn add_points_to_detachment(&mut self, points: &[Point3<f64>]) -> ConnectResult<Outcome> {
        if points.is_empty() {
            return Ok(Outcome::Applied);
        }
        match self.detachment.as_mut() {
            Some(surface) => surface.append_points(points),
            None => self.detachment = Some(Surface::from_points(DETACHMENT_ID, points)),
        }
        Ok(Outcome::Applied)
    }

    /// Stage raw points on fault `id`, creating it if needed.
    pub fn add_points_to_fault(&mut self, id: i32, points: &[Point3<f64>]) -> ConnectResult<Outcome> {
        if points.is_empty() {
            return Ok(Outcome::Applied);
        }
        match self.find_input_fault(id) {
            Some(index) => self.input_faults[index].append_points(points),
            None => self.push_fault(Surface::from_points(id, points)),
        }
        Ok(Outcome::Applied)
    }

    fn push_fault(&mut self, surface: Surface) {
        if self.input_faults.len() == self.input_faults.capacity() {
            self.input_faults.reserve(FAULT_LIST_CHUNK);
        }
        self.input_faults.push(surface);
    }

    /// Set the grid spacing used for padding. Non-positive or huge values
    /// reset it to unknown.
    pub fn set_average_spacing(&mut self, spacing: f64) {
        self.average_edge_length =
            (spacing.is_finite() && spacing > 0.0 && spacing <= MAX_VALID_SPACING).then_some(spacing);
    }

    /// Grid spacing used for padding, if known.
    pub fn average_spacing(&self) -> Option<f64> {
        self.average_edge_length
    }

    /// Set the lower (older) bracketing surface.
    pub fn set_detachment_lower_surface(&mut self, mesh: &TriMesh) -> ConnectResult<Outcome> {
        if accept_mesh(mesh, "lower bracket")? {
            self.detach_lower = Some(Surface::from_mesh(DETACHMENT_ID, mesh.clone()));
        }
        Ok(Outcome::Applied)
    }

    /// Set the upper (younger) bracketing surface.
    pub fn set_detachment_upper_surface(&mut self, mesh: &TriMesh) -> ConnectResult<Outcome> {
        if accept_mesh(mesh, "upper bracket")? {
            self.detach_upper = Some(Surface::from_mesh(DETACHMENT_ID, mesh.clone()));
        }
        Ok(Outcome::Applied)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Position of input fault `id`.
    pub fn find_input_fault(&self, id: i32) -> Option<usize> {
        self.input_faults.iter().position(|s| s.id == id)
    }

    /// Position of padded fault `id`.
    pub fn find_pad_fault(&self, id: i32) -> Option<usize> {
        self.padded_faults.iter().position(|s| s.id == id)
    }

    /// Position of sealed fault `id`.
    pub fn find_sealed_fault(&self, id: i32) -> Option<usize> {
        self.sealed
            .as_ref()
            .and_then(|s| s.faults.iter().position(|f| f.id == id))
    }

    /// Copy of the input detachment.
    pub fn detachment(&self) -> Option<Surface> {
        self.detachment.clone()
    }

    /// Copy of input fault `id`.
    pub fn input_fault(&self, id: i32) -> Option<Surface> {
        self.find_input_fault(id).map(|i| self.input_faults[i].clone())
    }

    pub fn input_fault_count(&self) -> usize {
        self.input_faults.len()
    }

    // ------------------------------------------------------------------
    // Padding
    // ------------------------------------------------------------------

    /// Compute the default grid spacing from the detachment edges and
    /// store it. `None` when the detachment has no live edges.
    pub fn calc_average_edge_length(&mut self) -> Option<f64> {
        let spacing = self
            .detachment
            .as_ref()
            .and_then(|d| d.mesh.mean_edge_length_xy())
            .map(|mean| mean / EDGE_LENGTH_CORRECTION);
        self.average_edge_length = spacing;
        debug!(spacing = spacing.unwrap_or(-1.0), "Average edge length");
        spacing
    }

    /// Compute and store the box around every input point.
    pub fn calc_xyz_limits(&mut self) -> Option<Bounds3> {
        let mut limits: Option<Bounds3> = None;
        let surfaces = self.detachment.iter().chain(self.input_faults.iter());
        for surface in surfaces {
            let points = surface.mesh.live_positions().chain(surface.staged.iter());
            if let Some(b) = Bounds3::from_points(points) {
                limits = Some(match limits {
                    Some(l) => l.union(&b),
                    None => b,
                });
            }
        }
        self.limits = limits;
        limits
    }

    /// Cumulative box from the last [`calc_xyz_limits`](Self::calc_xyz_limits).
    pub fn limits(&self) -> Option<Bounds3> {
        self.limits
    }

    /// Detachment plane coefficients `[c0, c1, c2]` of `z = c0 + c1 x + c2 y`.
    pub fn detachment_plane(&self) -> Option<[f64; 3]> {
        self.detachment_plane
    }

    /// Height of `p` above the detachment plane.
    pub fn detachment_plane_distance(&self, p: &Point3<f64>) -> Option<f64> {
        self.detachment_plane
            .as_ref()
            .map(|c| p.z - height_plane_z(c, p.x, p.y))
    }

    /// Pad the detachment and store the result.
    pub fn pad_detachment(&mut self) -> ConnectResult<Outcome> {
        let Some(detachment) = self.detachment.as_ref() else {
            return Ok(Outcome::NotReady);
        };
        let _timer = OperationTimer::with_context(
            "pad_detachment",
            detachment.mesh.node_count() + detachment.staged_count(),
            detachment.mesh.triangle_count(),
        );
        let padded = padding::pad_detachment(
            detachment,
            self.limits.as_ref(),
            self.average_edge_length,
            &self.engine,
            &self.params.pad,
        )?;
        match padded {
            Some(pad) => {
                log_surface_stats(&pad.surface, "padded detachment");
                self.padded_detachment = Some(pad.surface);
                self.detachment_plane = pad.plane_coefs;
                Ok(Outcome::Applied)
            }
            None => Ok(Outcome::NotReady),
        }
    }

    /// Pad the input fault at `index` and store the result.
    pub fn pad_fault(&mut self, index: usize) -> ConnectResult<Outcome> {
        let Some(fault) = self.input_faults.get_mut(index) else {
            return Ok(Outcome::NotReady);
        };
        let _timer = OperationTimer::with_context(
            "pad_fault",
            fault.mesh.node_count(),
            fault.mesh.triangle_count(),
        );
        let padded = padding::pad_fault(
            fault,
            self.limits.as_ref(),
            self.average_edge_length,
            &self.engine,
            &self.params.pad,
        )?;
        let Some(padded) = padded else {
            return Ok(Outcome::NotReady);
        };
        log_surface_stats(&padded, "padded fault");
        match self.find_pad_fault(padded.id) {
            Some(i) => self.padded_faults[i] = padded,
            None => self.padded_faults.push(padded),
        }
        Ok(Outcome::Applied)
    }

    /// Copy of the padded detachment.
    pub fn padded_detachment(&self) -> Option<SurfaceSnapshot> {
        self.padded_detachment.as_ref().map(SurfaceSnapshot::from)
    }

    /// Copy of the padded fault at `index`.
    pub fn padded_fault(&self, index: usize) -> Option<SurfaceSnapshot> {
        self.padded_faults.get(index).map(SurfaceSnapshot::from)
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Pad every surface, seal the faults to the detachment and publish
    /// the result.
    ///
    /// Returns [`Outcome::NotReady`] when there is no detachment, no fault
    /// or a surface cannot be padded. Fails with
    /// [`ConnectError::NoSealFound`] when no fault reaches the detachment.
    /// On any non-success the previously published result is kept.
    pub fn connect_faults(&mut self) -> ConnectResult<Outcome> {
        if self.detachment.is_none() || self.input_faults.is_empty() {
            debug!(
                has_detachment = self.detachment.is_some(),
                faults = self.input_faults.len(),
                "Nothing to connect"
            );
            return Ok(Outcome::NotReady);
        }
        let _timer = OperationTimer::new("connect_faults");

        self.calc_xyz_limits();
        if self.average_edge_length.is_none() {
            self.calc_average_edge_length();
        }
        let limits = self.limits;
        let spacing = self.average_edge_length;

        let Some(detachment) = self.detachment.as_ref() else {
            return Ok(Outcome::NotReady);
        };
        let Some(pad) = padding::pad_detachment(
            detachment,
            limits.as_ref(),
            spacing,
            &self.engine,
            &self.params.pad,
        )?
        else {
            warn!("Detachment could not be padded");
            return Ok(Outcome::NotReady);
        };

        let mut padded_faults = Vec::with_capacity(self.input_faults.len());
        for fault in self.input_faults.iter_mut() {
            match padding::pad_fault(
                fault,
                limits.as_ref(),
                spacing,
                &self.engine,
                &self.params.pad,
            )? {
                Some(padded) => padded_faults.push(padded),
                None => {
                    warn!(fault_id = fault.id, "Fault could not be padded");
                    return Ok(Outcome::NotReady);
                }
            }
        }

        let result = self.seal(&pad.surface, &padded_faults);
        match &result {
            Ok(state) => log_seal_result(state.faults.len(), state.lines.len(), None),
            Err(err) => log_seal_result(padded_faults.len(), 0, Some(err)),
        }
        let state = result?;

        info!(
            faults = state.faults.len(),
            lines = state.lines.len(),
            "Published connected faults"
        );
        self.padded_detachment = Some(pad.surface);
        self.detachment_plane = pad.plane_coefs;
        self.padded_faults = padded_faults;
        self.sealed = Some(state);
        Ok(Outcome::Applied)
    }

    fn seal(&self, detachment: &Surface, padded: &[Surface]) -> ConnectResult<SealedState> {
        let mut solver = S::default();
        solver.set_padded_detachment(&detachment.mesh)?;
        for fault in padded {
            solver.add_padded_fault(fault.id, fault.plane_wire(), &fault.mesh)?;
        }
        solver.seal_faults_to_detachment()?;

        let sealed_detachment = solver
            .sealed_detachment()
            .filter(|m| !m.is_empty())
            .ok_or(ConnectError::IncompleteSeal {
                missing: "sealed detachment",
            })?;
        let sealed_faults = solver.sealed_faults();
        if sealed_faults.is_empty() {
            return Err(ConnectError::IncompleteSeal {
                missing: "sealed faults",
            });
        }
        let raw_lines = solver.raw_intersection_lines();
        if raw_lines.is_empty() {
            return Err(ConnectError::IncompleteSeal {
                missing: "intersection lines",
            });
        }

        let mut detachment = Surface::from_mesh(DETACHMENT_ID, sealed_detachment.clone());
        let mut fitter = PlaneFitter::new();
        fitter.add_tri_mesh(sealed_detachment);
        detachment.plane = fitter.calc_plane().ok();

        let faults = sealed_faults
            .iter()
            .map(|sf| {
                let mut surface = Surface::from_mesh(sf.external_id, sf.mesh.clone());
                surface.plane = padded
                    .iter()
                    .find(|f| f.id == sf.external_id)
                    .and_then(|f| f.plane);
                surface
            })
            .collect();

        let policy = self.params.owner_id_policy;
        let lines = raw_lines
            .iter()
            .map(|raw| IntersectionLine {
                points: raw.points.clone(),
                fault_id: policy.select(raw.owner_ids),
            })
            .collect();

        Ok(SealedState {
            detachment,
            faults,
            lines,
        })
    }

    // ------------------------------------------------------------------
    // Published results
    // ------------------------------------------------------------------

    /// Copy of the sealed detachment.
    pub fn connected_detachment(&self) -> Option<SurfaceSnapshot> {
        self.sealed
            .as_ref()
            .map(|s| SurfaceSnapshot::from(&s.detachment))
    }

    /// Copy of the sealed fault at `index`.
    pub fn connected_fault(&self, index: usize) -> Option<SurfaceSnapshot> {
        self.sealed
            .as_ref()
            .and_then(|s| s.faults.get(index))
            .map(SurfaceSnapshot::from)
    }

    pub fn number_of_connected_faults(&self) -> usize {
        self.sealed.as_ref().map_or(0, |s| s.faults.len())
    }

    /// Number of published contact lines.
    pub fn number_of_contact_lines(&self) -> usize {
        self.sealed.as_ref().map_or(0, |s| s.lines.len())
    }

    /// Copy of contact line `index`.
    pub fn fault_contact_line(&self, index: usize) -> Option<IntersectionLine> {
        self.sealed
            .as_ref()
            .and_then(|s| s.lines.get(index))
            .cloned()
    }

    // ------------------------------------------------------------------
    // Bracketed detachment
    // ------------------------------------------------------------------

    /// Interpolate a detachment of `age` between the bracketing surfaces.
    ///
    /// Returns [`Outcome::NotReady`] when no smooth surface fits between
    /// the brackets; the previous result is kept in that case.
    pub fn calc_detachment(
        &mut self,
        lower_age: f64,
        upper_age: f64,
        age: f64,
    ) -> ConnectResult<Outcome> {
        let lower = self
            .detach_lower
            .as_mut()
            .ok_or(ConnectError::MissingBracket { which: "lower" })?;
        let upper = self
            .detach_upper
            .as_mut()
            .ok_or(ConnectError::MissingBracket { which: "upper" })?;
        let _timer = OperationTimer::with_context(
            "calc_detachment",
            lower.mesh.node_count() + upper.mesh.node_count(),
            lower.mesh.triangle_count() + upper.mesh.triangle_count(),
        );

        let Some(mesh) = bracket::interpolate_detachment(
            &mut lower.mesh,
            &mut upper.mesh,
            AgeBracket::new(lower_age, upper_age, age),
            &self.engine,
            &self.params.bracket,
        )?
        else {
            return Ok(Outcome::NotReady);
        };

        let mut fitter = PlaneFitter::new();
        fitter.add_tri_mesh(&mesh);
        let mut surface = Surface::from_mesh(DETACHMENT_ID, mesh);
        surface.plane = fitter.calc_plane().ok();
        log_surface_stats(&surface, "calculated detachment");
        self.detach_calc = Some(surface);
        Ok(Outcome::Applied)
    }

    /// Copy of the interpolated detachment.
    pub fn calculated_detachment(&self) -> Option<SurfaceSnapshot> {
        self.detach_calc.as_ref().map(SurfaceSnapshot::from)
    }

    /// Drop both brackets and the interpolated detachment.
    pub fn clear_calculated_detachment_data(&mut self) {
        self.detach_lower = None;
        self.detach_upper = None;
        self.detach_calc = None;
    }
}

/// `Ok(false)` for meshes too small to use, `Err` for inconsistent ones.
fn accept_mesh(mesh: &TriMesh, what: &str) -> ConnectResult<bool> {
    if !mesh.meets_minimum() {
        debug!(
            surface = what,
            nodes = mesh.node_count(),
            edges = mesh.edge_count(),
            triangles = mesh.triangle_count(),
            "Ignoring undersized mesh"
        );
        return Ok(false);
    }
    mesh.validate()?;
    Ok(true)
}
