//! End-to-end tests for the fault connection workflow.
//!
//! Run with: cargo test -p fault-connect --test integration_tests

use fault_connect::{
    ConnectError, ConnectParams, ConnectResult, DETACHMENT_ID, EDGE_LENGTH_CORRECTION,
    ErrorCode, FaultConnect, IdwGridEngine, Outcome, OwnerIdPolicy, RawIntersectionLine,
    SealedFault, SealingSolver, SurfacePlane, TriMesh, legacy_status,
};
use nalgebra::{Point3, Vector3};

// =============================================================================
// Test Surface Helpers
// =============================================================================

/// Square detachment of two triangles over `[0, size]^2` at height `z`.
fn square_detachment(size: f64, z: f64) -> TriMesh {
    TriMesh::from_indexed(
        &[
            Point3::new(0.0, 0.0, z),
            Point3::new(size, 0.0, z),
            Point3::new(size, size, z),
            Point3::new(0.0, size, z),
        ],
        &[[0, 1, 2], [0, 2, 3]],
    )
    .unwrap()
}

/// Regular right-triangle grid with `n x n` cells of side `spacing`.
fn regular_grid(n: usize, spacing: f64, z: f64) -> TriMesh {
    let mut positions = Vec::new();
    for j in 0..=n {
        for i in 0..=n {
            positions.push(Point3::new(i as f64 * spacing, j as f64 * spacing, z));
        }
    }
    let row = n + 1;
    let mut faces = Vec::new();
    for j in 0..n {
        for i in 0..n {
            let a = j * row + i;
            faces.push([a, a + 1, a + row + 1]);
            faces.push([a, a + row + 1, a + row]);
        }
    }
    TriMesh::from_indexed(&positions, &faces).unwrap()
}

/// Vertical rectangular fault in the plane `x = x0`.
fn vertical_fault(x0: f64, y: (f64, f64), z: (f64, f64)) -> TriMesh {
    TriMesh::from_indexed(
        &[
            Point3::new(x0, y.0, z.0),
            Point3::new(x0, y.1, z.0),
            Point3::new(x0, y.1, z.1),
            Point3::new(x0, y.0, z.1),
        ],
        &[[0, 1, 2], [0, 2, 3]],
    )
    .unwrap()
}

fn connected_instance() -> FaultConnect {
    let mut fc = FaultConnect::new();
    fc.set_detachment(&square_detachment(10.0, 0.0)).unwrap();
    fc.set_fault(1, &vertical_fault(5.0, (2.0, 8.0), (1.0, 6.0)), None)
        .unwrap();
    assert_eq!(fc.connect_faults().unwrap(), Outcome::Applied);
    fc
}

// =============================================================================
// Surface Store
// =============================================================================

#[test]
fn test_set_fault_round_trip() {
    let mesh = vertical_fault(5.0, (2.0, 8.0), (1.0, 6.0));
    let plane = SurfacePlane::new(Vector3::x(), Point3::new(5.0, 5.0, 3.5)).unwrap();

    let mut fc = FaultConnect::new();
    assert_eq!(fc.set_fault(12, &mesh, Some(plane)).unwrap(), Outcome::Applied);

    let stored = fc.input_fault(12).unwrap();
    assert_eq!(stored.id, 12);
    assert_eq!(stored.mesh, mesh);
    assert_eq!(stored.plane, Some(plane));
    assert_eq!(stored.staged_count(), 0);
}

#[test]
fn test_invalid_input_leaves_state_unchanged() {
    let mut fc = FaultConnect::new();
    fc.set_detachment(&square_detachment(10.0, 0.0)).unwrap();
    fc.set_fault(1, &vertical_fault(5.0, (2.0, 8.0), (1.0, 6.0)), None)
        .unwrap();
    let detachment = fc.detachment();
    let fault = fc.input_fault(1);

    // Two nodes, one edge, no triangles.
    let mut tiny = TriMesh::new();
    tiny.nodes.push(fault_connect::Node::from_coords(0.0, 0.0, 0.0));
    tiny.nodes.push(fault_connect::Node::from_coords(1.0, 0.0, 0.0));
    tiny.edges.push(fault_connect::Edge::new(0, 1));

    for result in [
        fc.set_detachment(&tiny),
        fc.set_fault(1, &tiny, None),
        fc.add_to_detachment(&tiny),
        fc.add_to_fault(1, &tiny),
        fc.set_detachment_lower_surface(&tiny),
    ] {
        assert_eq!(legacy_status(&result), 1);
    }
    assert_eq!(fc.detachment(), detachment);
    assert_eq!(fc.input_fault(1), fault);
    assert_eq!(fc.input_fault_count(), 1);
}

#[test]
fn test_point_adds_grow_staged_buffer() {
    let mut fc = FaultConnect::new();
    fc.set_fault(3, &vertical_fault(5.0, (2.0, 8.0), (1.0, 6.0)), None)
        .unwrap();

    let batch: Vec<Point3<f64>> = (0..5)
        .map(|i| Point3::new(5.0, i as f64, -(i as f64)))
        .collect();

    fc.add_points_to_fault(3, &batch).unwrap();
    let first = fc.input_fault(3).unwrap();
    // Old mesh nodes move into the staged buffer.
    assert_eq!(first.staged_count(), 4 + batch.len());
    assert_eq!(first.mesh.triangle_count(), 0);

    for round in 1..=3 {
        fc.add_points_to_fault(3, &batch).unwrap();
        let f = fc.input_fault(3).unwrap();
        assert_eq!(f.staged_count(), first.staged_count() + round * batch.len());
        assert_eq!(f.mesh.triangle_count(), 0);
        assert!(f.recalc);
    }
}

#[test]
fn test_fault_lists_keep_insertion_order() {
    let mut fc = FaultConnect::new();
    for id in [30, 10, 20, 40, 50, 60, 70, 80, 90, 100, 110, 120] {
        fc.add_points_to_fault(id, &[Point3::new(id as f64, 0.0, 0.0)])
            .unwrap();
    }
    assert_eq!(fc.input_fault_count(), 12);
    assert_eq!(fc.find_input_fault(30), Some(0));
    assert_eq!(fc.find_input_fault(120), Some(11));
    assert_eq!(fc.find_input_fault(5), None);
}

// =============================================================================
// Padding
// =============================================================================

#[test]
fn test_average_edge_length_of_regular_grid() {
    let spacing = 2.0;
    let mesh = regular_grid(4, spacing, 0.0);
    let mut fc = FaultConnect::new();
    fc.set_detachment(&mesh).unwrap();

    let avg = fc.calc_average_edge_length().unwrap();
    let mean = mesh.mean_edge_length_xy().unwrap();
    assert!((avg - mean / EDGE_LENGTH_CORRECTION).abs() < 1e-12);
    // The correction maps the right-isoceles mean back close to the side.
    assert!((avg - spacing).abs() < 0.02 * spacing, "avg = {}", avg);
    assert_eq!(fc.average_spacing(), Some(avg));
}

#[test]
fn test_average_edge_length_without_detachment() {
    let mut fc = FaultConnect::new();
    assert_eq!(fc.calc_average_edge_length(), None);
    fc.add_points_to_detachment(&[Point3::origin()]).unwrap();
    assert_eq!(fc.calc_average_edge_length(), None);
}

#[test]
fn test_pad_detachment_is_repeatable() {
    let mut fc = FaultConnect::new();
    fc.set_detachment(&regular_grid(4, 2.5, 1.0)).unwrap();
    fc.calc_xyz_limits();

    assert_eq!(fc.pad_detachment().unwrap(), Outcome::Applied);
    let first = fc.padded_detachment().unwrap().mesh.bounds().unwrap();
    assert_eq!(fc.pad_detachment().unwrap(), Outcome::Applied);
    let second = fc.padded_detachment().unwrap().mesh.bounds().unwrap();

    assert_eq!(first, second);
    assert!(first.min.x < 0.0 && first.max.x > 10.0);
    assert_eq!(fc.limits().unwrap().min.x, 0.0);

    let plane = fc.detachment_plane().unwrap();
    assert!((plane[0] - 1.0).abs() < 1e-9);
    let d = fc.detachment_plane_distance(&Point3::new(3.0, 3.0, 4.0)).unwrap();
    assert!((d - 3.0).abs() < 1e-9);
}

#[test]
fn test_pad_detachment_from_points() {
    let mut fc = FaultConnect::new();
    fc.add_points_to_detachment(&[
        Point3::new(0.0, 0.0, -2.0),
        Point3::new(10.0, 0.0, -2.0),
        Point3::new(10.0, 10.0, -3.0),
        Point3::new(0.0, 10.0, -3.0),
    ])
    .unwrap();
    fc.set_average_spacing(1.0);
    assert_eq!(fc.pad_detachment().unwrap(), Outcome::Applied);
    let padded = fc.padded_detachment().unwrap();
    assert_eq!(padded.id, DETACHMENT_ID);
    assert!(padded.mesh.triangle_count() > 100);
}

// =============================================================================
// Connection
// =============================================================================

#[test]
fn test_connect_not_ready_without_input() {
    let mut fc = FaultConnect::new();
    assert_eq!(fc.connect_faults().unwrap(), Outcome::NotReady);
    fc.set_detachment(&square_detachment(10.0, 0.0)).unwrap();
    assert_eq!(fc.connect_faults().unwrap(), Outcome::NotReady);
    assert_eq!(fc.number_of_connected_faults(), 0);
    assert!(fc.connected_detachment().is_none());
    assert!(fc.fault_contact_line(0).is_none());
}

#[test]
fn test_connect_end_to_end() {
    let fc = connected_instance();

    assert_eq!(fc.number_of_connected_faults(), 1);
    let fault = fc.connected_fault(0).unwrap();
    assert_eq!(fault.id, 1);
    assert!(fault.plane.is_some());
    assert!(fc.connected_fault(1).is_none());
    assert_eq!(fc.find_sealed_fault(1), Some(0));

    let line = fc.fault_contact_line(0).unwrap();
    assert_eq!(line.fault_id, 1);
    assert!(line.point_count() >= 2);

    let padded = fc.padded_detachment().unwrap().mesh.bounds().unwrap();
    for p in &line.points {
        assert!(padded.contains(p, 1e-6), "{:?} outside {:?}", p, padded);
        assert!(p.z.abs() < 1e-6);
        assert!((p.x - 5.0).abs() < 1e-6);
    }

    // The padded fault reaches below the model floor.
    let padded_fault = fc.padded_fault(0).unwrap();
    assert!(padded_fault.mesh.bounds().unwrap().min.z < 0.0);

    let detachment = fc.connected_detachment().unwrap();
    assert_eq!(detachment.id, DETACHMENT_ID);
    assert!(!detachment.mesh.is_empty());
}

#[test]
fn test_connect_two_faults() {
    let mut fc = FaultConnect::new();
    fc.set_detachment(&square_detachment(20.0, 0.0)).unwrap();
    fc.set_fault(7, &vertical_fault(5.0, (2.0, 8.0), (1.0, 6.0)), None)
        .unwrap();
    fc.set_fault(9, &vertical_fault(15.0, (10.0, 18.0), (2.0, 5.0)), None)
        .unwrap();
    assert_eq!(fc.connect_faults().unwrap(), Outcome::Applied);

    assert_eq!(fc.number_of_connected_faults(), 2);
    assert_eq!(fc.number_of_contact_lines(), 2);
    let ids: Vec<i32> = (0..2)
        .map(|i| fc.fault_contact_line(i).unwrap().fault_id)
        .collect();
    assert_eq!(ids, vec![7, 9]);
}

#[test]
fn test_connect_dipping_fault() {
    // Plane x = 4 + 0.5 (z - 1), so the trace on z = 0 sits at x = 3.5.
    let dipping = TriMesh::from_indexed(
        &[
            Point3::new(4.0, 2.0, 1.0),
            Point3::new(4.0, 8.0, 1.0),
            Point3::new(6.5, 8.0, 6.0),
            Point3::new(6.5, 2.0, 6.0),
        ],
        &[[0, 1, 2], [0, 2, 3]],
    )
    .unwrap();

    let mut fc = FaultConnect::new();
    fc.set_detachment(&square_detachment(10.0, 0.0)).unwrap();
    fc.set_fault(3, &dipping, None).unwrap();
    assert_eq!(fc.connect_faults().unwrap(), Outcome::Applied);

    let plane = fc.connected_fault(0).unwrap().plane.unwrap();
    let normal = plane.normal();
    assert!(normal.x.abs() > 0.1 && normal.z.abs() > 0.1, "{:?}", normal);

    let line = fc.fault_contact_line(0).unwrap();
    assert_eq!(line.fault_id, 3);
    assert!(line.point_count() >= 2);
    for p in &line.points {
        assert!(p.z.abs() < 1e-6, "{:?} off the detachment", p);
        assert!((p.x - 3.5).abs() < 1e-6, "{:?} off the fault trace", p);
        assert!(plane.distance(p).abs() < 1e-6);
    }
}

#[test]
fn test_connect_tilted_detachment() {
    let mut fc = FaultConnect::new();
    fc.set_detachment(&tilted_grid(10, 2.0, 0.0, 0.1)).unwrap();
    fc.set_fault(4, &vertical_fault(5.0, (4.0, 14.0), (3.0, 8.0)), None)
        .unwrap();
    assert_eq!(fc.connect_faults().unwrap(), Outcome::Applied);

    let coefs = fc.detachment_plane().unwrap();
    assert!(coefs[0].abs() < 1e-9);
    assert!((coefs[1] - 0.1).abs() < 1e-9);
    assert!(coefs[2].abs() < 1e-9);

    let line = fc.fault_contact_line(0).unwrap();
    assert_eq!(line.fault_id, 4);
    assert!(line.point_count() >= 2);
    for p in &line.points {
        assert!((p.x - 5.0).abs() < 1e-6, "{:?} off the fault", p);
        let dz = fc.detachment_plane_distance(p).unwrap();
        assert!(dz.abs() < 0.25, "{:?} is {} from the detachment", p, dz);
    }
}

#[test]
fn test_failed_connect_preserves_published_state() {
    let mut fc = connected_instance();
    let line = fc.fault_contact_line(0).unwrap();
    let detachment = fc.connected_detachment().unwrap();

    // A horizontal fault cannot be padded.
    fc.set_fault(2, &regular_grid(2, 1.0, 3.0), None).unwrap();
    assert_eq!(fc.connect_faults().unwrap(), Outcome::NotReady);
    assert_eq!(fc.number_of_connected_faults(), 1);
    assert_eq!(fc.fault_contact_line(0), Some(line.clone()));

    // A plane seen edge-on gives the fault no extent.
    let horizontal = SurfacePlane::new(Vector3::z(), Point3::new(6.0, 5.0, 3.0)).unwrap();
    fc.set_fault(2, &vertical_fault(6.0, (2.0, 8.0), (1.0, 6.0)), Some(horizontal))
        .unwrap();
    let err = fc.connect_faults().unwrap_err();
    assert_eq!(err.legacy_status(), -1);

    assert_eq!(fc.number_of_connected_faults(), 1);
    assert_eq!(fc.fault_contact_line(0), Some(line));
    assert_eq!(fc.connected_detachment(), Some(detachment));
}

// =============================================================================
// Sealing Solver Seam
// =============================================================================

/// Sealer that reports a fixed pair of owner ids for every fault.
#[derive(Default)]
struct FixedOwnerSealer {
    detachment: Option<TriMesh>,
    faults: Vec<SealedFault>,
    lines: Vec<RawIntersectionLine>,
}

impl SealingSolver for FixedOwnerSealer {
    fn set_padded_detachment(&mut self, mesh: &TriMesh) -> ConnectResult<()> {
        self.detachment = Some(mesh.clone());
        Ok(())
    }

    fn add_padded_fault(
        &mut self,
        id: i32,
        plane: Option<[f64; 6]>,
        mesh: &TriMesh,
    ) -> ConnectResult<()> {
        assert!(plane.is_some());
        self.faults.push(SealedFault {
            external_id: id,
            mesh: mesh.clone(),
        });
        Ok(())
    }

    fn seal_faults_to_detachment(&mut self) -> ConnectResult<()> {
        self.lines = self
            .faults
            .iter()
            .map(|f| RawIntersectionLine {
                points: vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)],
                owner_ids: [f.external_id, 8],
            })
            .collect();
        Ok(())
    }

    fn sealed_detachment(&self) -> Option<&TriMesh> {
        self.detachment.as_ref()
    }

    fn sealed_faults(&self) -> &[SealedFault] {
        &self.faults
    }

    fn raw_intersection_lines(&self) -> &[RawIntersectionLine] {
        &self.lines
    }
}

/// Sealer that never finds an intersection.
#[derive(Default)]
struct NoContactSealer;

impl SealingSolver for NoContactSealer {
    fn set_padded_detachment(&mut self, _mesh: &TriMesh) -> ConnectResult<()> {
        Ok(())
    }

    fn add_padded_fault(&mut self, _id: i32, _plane: Option<[f64; 6]>, _mesh: &TriMesh) -> ConnectResult<()> {
        Ok(())
    }

    fn seal_faults_to_detachment(&mut self) -> ConnectResult<()> {
        Err(ConnectError::no_seal("test sealer"))
    }

    fn sealed_detachment(&self) -> Option<&TriMesh> {
        None
    }

    fn sealed_faults(&self) -> &[SealedFault] {
        &[]
    }

    fn raw_intersection_lines(&self) -> &[RawIntersectionLine] {
        &[]
    }
}

fn load_inputs<S: SealingSolver + Default>(fc: &mut FaultConnect<IdwGridEngine, S>) {
    fc.set_detachment(&square_detachment(10.0, 0.0)).unwrap();
    fc.set_fault(3, &vertical_fault(5.0, (2.0, 8.0), (1.0, 6.0)), None)
        .unwrap();
}

#[test]
fn test_owner_id_policy() {
    let mut first: FaultConnect<IdwGridEngine, FixedOwnerSealer> =
        FaultConnect::with_engine(IdwGridEngine::default());
    load_inputs(&mut first);
    assert_eq!(first.connect_faults().unwrap(), Outcome::Applied);
    assert_eq!(first.fault_contact_line(0).unwrap().fault_id, 3);

    let mut second: FaultConnect<IdwGridEngine, FixedOwnerSealer> =
        FaultConnect::with_engine(IdwGridEngine::default())
            .with_params(ConnectParams::default().with_owner_id_policy(OwnerIdPolicy::PreferSecond))
            .unwrap();
    load_inputs(&mut second);
    assert_eq!(second.connect_faults().unwrap(), Outcome::Applied);
    assert_eq!(second.fault_contact_line(0).unwrap().fault_id, 8);
}

#[test]
fn test_no_seal_status() {
    let mut fc: FaultConnect<IdwGridEngine, NoContactSealer> =
        FaultConnect::with_engine(IdwGridEngine::default());
    load_inputs(&mut fc);
    let result = fc.connect_faults();
    assert_eq!(legacy_status(&result), -2);
    assert_eq!(result.unwrap_err().code(), ErrorCode::NoSealFound);
    assert_eq!(fc.number_of_connected_faults(), 0);
}

// =============================================================================
// Bracketed Detachment
// =============================================================================

fn tilted_grid(n: usize, spacing: f64, z0: f64, slope: f64) -> TriMesh {
    let mut mesh = regular_grid(n, spacing, 0.0);
    for node in &mut mesh.nodes {
        node.position.z = z0 + slope * node.position.x;
    }
    mesh
}

#[test]
fn test_calc_detachment_between_brackets() {
    let lower = tilted_grid(6, 2.0, 0.0, 0.1);
    let upper = tilted_grid(6, 2.0, 10.0, -0.1);

    for age in [100.0, 130.0, 150.0, 170.0, 200.0] {
        let mut fc = FaultConnect::new();
        fc.set_detachment_lower_surface(&lower).unwrap();
        fc.set_detachment_upper_surface(&upper).unwrap();
        assert_eq!(fc.calc_detachment(200.0, 100.0, age).unwrap(), Outcome::Applied);

        let calc = fc.calculated_detachment().unwrap();
        assert!(calc.plane.is_some());
        for p in calc.mesh.live_positions() {
            let lo = 0.1 * p.x;
            let hi = 10.0 - 0.1 * p.x;
            assert!(p.z > lo && p.z < hi, "age {}: z {} not in ({}, {})", age, p.z, lo, hi);
        }
    }
}

#[test]
fn test_calc_detachment_missing_bracket() {
    let mut fc = FaultConnect::new();
    let err = fc.calc_detachment(2.0, 1.0, 1.5).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MissingBracket);
    assert!(fc.calculated_detachment().is_none());
}

#[test]
fn test_calc_detachment_touching_brackets_keeps_previous() {
    let mut fc = FaultConnect::new();
    fc.set_detachment_lower_surface(&tilted_grid(6, 2.0, 0.0, 0.1)).unwrap();
    fc.set_detachment_upper_surface(&tilted_grid(6, 2.0, 10.0, -0.1)).unwrap();
    assert_eq!(fc.calc_detachment(200.0, 100.0, 150.0).unwrap(), Outcome::Applied);
    let previous = fc.calculated_detachment().unwrap();

    // The brackets meet along x = 0, leaving no room for a smooth surface.
    fc.set_detachment_lower_surface(&tilted_grid(6, 2.0, 0.0, 0.0)).unwrap();
    fc.set_detachment_upper_surface(&tilted_grid(6, 2.0, 0.0, 0.5)).unwrap();
    let outcome = fc.calc_detachment(200.0, 100.0, 120.0).unwrap();
    assert_eq!(outcome, Outcome::NotReady);
    assert_eq!(legacy_status(&Ok(outcome)), 0);

    assert_eq!(fc.calculated_detachment(), Some(previous));
}
