//! Sealing padded faults against the padded detachment.
//!
//! [`SealingSolver`] is the seam between the connection workflow and the
//! intersection engine. A fresh solver is built for every
//! `connect_faults` call, fed the padded surfaces, then asked to seal.
//!
//! [`IntersectionSealer`] is the default solver:
//!
//! 1. every fault triangle is tested against the detachment triangles whose
//!    boxes overlap it, collecting triangle/triangle intersection segments;
//! 2. segments are welded end to end into polylines, one set per fault;
//! 3. fault triangles lying wholly below the detachment are trimmed away.
//!
//! Faults that do not reach the detachment contribute no lines; if no fault
//! does, sealing fails with [`ConnectError::NoSealFound`].

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConnectError, ConnectResult};
use crate::types::{Bounds3, DETACHMENT_ID, TriMesh};

/// Intersection polyline as returned by a solver, owned by up to two
/// surfaces. Negative ids mean "no owner" (the detachment side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIntersectionLine {
    pub points: Vec<Point3<f64>>,
    pub owner_ids: [i32; 2],
}

/// A fault surface after sealing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedFault {
    /// Id given to `add_padded_fault`.
    pub external_id: i32,
    pub mesh: TriMesh,
}

/// Computes intersections between padded surfaces and seals them together.
pub trait SealingSolver {
    /// Set the padded detachment.
    fn set_padded_detachment(&mut self, mesh: &TriMesh) -> ConnectResult<()>;

    /// Add one padded fault with its best-fit plane in wire form.
    fn add_padded_fault(
        &mut self,
        id: i32,
        plane: Option<[f64; 6]>,
        mesh: &TriMesh,
    ) -> ConnectResult<()>;

    /// Intersect and seal. Fails with [`ConnectError::NoSealFound`] when
    /// nothing intersects.
    fn seal_faults_to_detachment(&mut self) -> ConnectResult<()>;

    /// Detachment after sealing.
    fn sealed_detachment(&self) -> Option<&TriMesh>;

    /// Faults after sealing.
    fn sealed_faults(&self) -> &[SealedFault];

    /// Intersection polylines.
    fn raw_intersection_lines(&self) -> &[RawIntersectionLine];
}

/// Parameters for [`IntersectionSealer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SealParams {
    /// Relative tolerance (to the model diagonal) for welding segment ends.
    pub weld_tolerance: f64,
    /// Relative tolerance for plane side tests.
    pub epsilon: f64,
    /// Trim fault triangles that lie wholly below the detachment.
    pub trim_below_detachment: bool,
}

impl Default for SealParams {
    fn default() -> Self {
        Self {
            weld_tolerance: 1e-7,
            epsilon: 1e-10,
            trim_below_detachment: true,
        }
    }
}

#[derive(Debug, Clone)]
struct PaddedFault {
    id: i32,
    mesh: TriMesh,
}

/// Default sealing solver based on exact triangle/triangle intersection.
#[derive(Debug, Clone, Default)]
pub struct IntersectionSealer {
    params: SealParams,
    detachment: Option<TriMesh>,
    faults: Vec<PaddedFault>,
    sealed_detachment: Option<TriMesh>,
    sealed_faults: Vec<SealedFault>,
    lines: Vec<RawIntersectionLine>,
}

impl IntersectionSealer {
    /// Create a sealer with custom parameters.
    pub fn with_params(params: SealParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }
}

impl SealingSolver for IntersectionSealer {
    fn set_padded_detachment(&mut self, mesh: &TriMesh) -> ConnectResult<()> {
        mesh.validate()?;
        self.detachment = Some(mesh.clone());
        Ok(())
    }

    fn add_padded_fault(
        &mut self,
        id: i32,
        _plane: Option<[f64; 6]>,
        mesh: &TriMesh,
    ) -> ConnectResult<()> {
        mesh.validate()?;
        self.faults.push(PaddedFault {
            id,
            mesh: mesh.clone(),
        });
        Ok(())
    }

    fn seal_faults_to_detachment(&mut self) -> ConnectResult<()> {
        let detachment = self
            .detachment
            .as_ref()
            .ok_or_else(|| ConnectError::sealing("no padded detachment was set"))?;
        if self.faults.is_empty() {
            return Err(ConnectError::sealing("no padded faults were added"));
        }

        let det_tris = TriangleSet::new(detachment);
        if det_tris.triangles.is_empty() {
            return Err(ConnectError::sealing("padded detachment has no triangles"));
        }

        let mut model_bounds = det_tris.bounds;
        for fault in &self.faults {
            if let Some(b) = fault.mesh.bounds() {
                model_bounds = model_bounds.union(&b);
            }
        }
        let diagonal = (model_bounds.max - model_bounds.min).norm().max(1e-30);
        let weld = self.params.weld_tolerance * diagonal;
        let eps = self.params.epsilon * diagonal;

        let index = BucketIndex::new(&det_tris);
        let mut lines = Vec::new();
        let mut sealed_faults = Vec::with_capacity(self.faults.len());

        for fault in &self.faults {
            let mut segments = Vec::new();
            for t in 0..fault.mesh.triangle_count() {
                let Some(tri) = fault.mesh.triangle_points(t) else {
                    continue;
                };
                let bbox = Aabb::from_triangle(&tri).expand(eps);
                for d in index.candidates(&bbox) {
                    if !bbox.overlaps(&det_tris.boxes[d]) {
                        continue;
                    }
                    if let Some(seg) = triangle_intersection(&tri, &det_tris.triangles[d], eps) {
                        segments.push(seg);
                    }
                }
            }

            let polylines = chain_segments(&segments, weld);
            debug!(
                fault_id = fault.id,
                segments = segments.len(),
                polylines = polylines.len(),
                "Intersected fault with detachment"
            );
            if polylines.is_empty() {
                warn!(fault_id = fault.id, "Fault does not reach the detachment");
            }
            lines.extend(polylines.into_iter().map(|points| RawIntersectionLine {
                points,
                owner_ids: [fault.id, DETACHMENT_ID],
            }));

            let mesh = if self.params.trim_below_detachment {
                trim_below(&fault.mesh, &det_tris, &index, eps)?
            } else {
                fault.mesh.clone()
            };
            sealed_faults.push(SealedFault {
                external_id: fault.id,
                mesh,
            });
        }

        if lines.is_empty() {
            return Err(ConnectError::no_seal(format!(
                "none of {} faults intersect the detachment",
                self.faults.len()
            )));
        }

        info!(
            faults = sealed_faults.len(),
            lines = lines.len(),
            "Sealed faults to detachment"
        );

        self.sealed_detachment = Some(detachment.clone());
        self.sealed_faults = sealed_faults;
        self.lines = lines;
        Ok(())
    }

    fn sealed_detachment(&self) -> Option<&TriMesh> {
        self.sealed_detachment.as_ref()
    }

    fn sealed_faults(&self) -> &[SealedFault] {
        &self.sealed_faults
    }

    fn raw_intersection_lines(&self) -> &[RawIntersectionLine] {
        &self.lines
    }
}

/// Axis-aligned bounding box for spatial culling.
#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn from_triangle(tri: &[Point3<f64>; 3]) -> Self {
        let mut b = Bounds3::from_point(&tri[0]);
        b.include(&tri[1]);
        b.include(&tri[2]);
        Self {
            min: b.min,
            max: b.max,
        }
    }

    fn expand(&self, epsilon: f64) -> Self {
        let e = Vector3::repeat(epsilon);
        Self {
            min: self.min - e,
            max: self.max + e,
        }
    }

    fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

/// Live triangles of a mesh as corner triples with their boxes.
struct TriangleSet {
    triangles: Vec<[Point3<f64>; 3]>,
    boxes: Vec<Aabb>,
    bounds: Bounds3,
}

impl TriangleSet {
    fn new(mesh: &TriMesh) -> Self {
        let triangles: Vec<[Point3<f64>; 3]> = (0..mesh.triangle_count())
            .filter_map(|t| mesh.triangle_points(t))
            .collect();
        let boxes = triangles.iter().map(Aabb::from_triangle).collect();
        let bounds = Bounds3::from_points(triangles.iter().flatten())
            .unwrap_or_else(|| Bounds3::from_point(&Point3::origin()));
        Self {
            triangles,
            boxes,
            bounds,
        }
    }
}

/// Plan-view bucket grid over the detachment triangles.
struct BucketIndex {
    origin: (f64, f64),
    cell: f64,
    buckets: HashMap<(i64, i64), Vec<usize>>,
}

impl BucketIndex {
    fn new(set: &TriangleSet) -> Self {
        let n = set.triangles.len().max(1) as f64;
        let extent = set.bounds.width().max(set.bounds.height());
        let cell = (extent / n.sqrt()).max(1e-9);
        let origin = (set.bounds.min.x, set.bounds.min.y);

        let mut index = Self {
            origin,
            cell,
            buckets: HashMap::new(),
        };
        for (i, b) in set.boxes.iter().enumerate() {
            let (c0, r0) = index.key(b.min.x, b.min.y);
            let (c1, r1) = index.key(b.max.x, b.max.y);
            for r in r0..=r1 {
                for c in c0..=c1 {
                    index.buckets.entry((c, r)).or_default().push(i);
                }
            }
        }
        index
    }

    fn key(&self, x: f64, y: f64) -> (i64, i64) {
        (
            ((x - self.origin.0) / self.cell).floor() as i64,
            ((y - self.origin.1) / self.cell).floor() as i64,
        )
    }

    /// Triangle indices whose buckets overlap `bbox`, deduplicated, sorted.
    fn candidates(&self, bbox: &Aabb) -> Vec<usize> {
        let (c0, r0) = self.key(bbox.min.x, bbox.min.y);
        let (c1, r1) = self.key(bbox.max.x, bbox.max.y);
        let mut out: Vec<usize> = Vec::new();
        for r in r0..=r1 {
            for c in c0..=c1 {
                if let Some(list) = self.buckets.get(&(c, r)) {
                    out.extend_from_slice(list);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Triangles under the plan-view point `(x, y)`.
    fn at_point(&self, x: f64, y: f64) -> &[usize] {
        self.buckets
            .get(&self.key(x, y))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Points where the edges of `a` cross the plane `(n, d)`, plus vertices of
/// `a` lying on it. Returns up to two distinct points.
fn plane_crossing(
    a: &[Point3<f64>; 3],
    n: &Vector3<f64>,
    origin: &Point3<f64>,
    eps: f64,
) -> Option<(Point3<f64>, Point3<f64>)> {
    let d: [f64; 3] = [
        n.dot(&(a[0] - origin)),
        n.dot(&(a[1] - origin)),
        n.dot(&(a[2] - origin)),
    ];
    if d.iter().all(|&v| v > eps) || d.iter().all(|&v| v < -eps) {
        return None;
    }
    if d.iter().all(|&v| v.abs() <= eps) {
        // Coplanar overlap does not define a crossing line.
        return None;
    }

    let mut pts: Vec<Point3<f64>> = Vec::with_capacity(3);
    let mut push = |p: Point3<f64>| {
        if pts.iter().all(|q| (q - p).norm() > eps) {
            pts.push(p);
        }
    };
    for i in 0..3 {
        if d[i].abs() <= eps {
            push(a[i]);
        }
    }
    for (i, j) in [(0, 1), (1, 2), (2, 0)] {
        if (d[i] > eps && d[j] < -eps) || (d[i] < -eps && d[j] > eps) {
            let t = d[i] / (d[i] - d[j]);
            push(a[i] + (a[j] - a[i]) * t);
        }
    }

    match pts.as_slice() {
        [p, q, ..] => Some((*p, *q)),
        _ => None,
    }
}

/// Intersection segment of two triangles, if they cross along a line of
/// positive length.
fn triangle_intersection(
    a: &[Point3<f64>; 3],
    b: &[Point3<f64>; 3],
    eps: f64,
) -> Option<(Point3<f64>, Point3<f64>)> {
    let na = (a[1] - a[0]).cross(&(a[2] - a[0]));
    let nb = (b[1] - b[0]).cross(&(b[2] - b[0]));
    let (la, lb) = (na.norm(), nb.norm());
    if la <= 1e-30 || lb <= 1e-30 {
        return None;
    }
    let na = na / la;
    let nb = nb / lb;

    let dir = na.cross(&nb);
    let dlen = dir.norm();
    if dlen <= 1e-12 {
        return None;
    }
    let dir = dir / dlen;

    let (a0, a1) = plane_crossing(a, &nb, &b[0], eps)?;
    let (b0, b1) = plane_crossing(b, &na, &a[0], eps)?;

    let (ta0, ta1) = ordered(dir.dot(&a0.coords), dir.dot(&a1.coords));
    let (tb0, tb1) = ordered(dir.dot(&b0.coords), dir.dot(&b1.coords));
    let lo = ta0.max(tb0);
    let hi = ta1.min(tb1);
    if hi - lo <= eps {
        return None;
    }

    let base = a0 - dir * dir.dot(&a0.coords);
    Some((base + dir * lo, base + dir * hi))
}

#[inline]
fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Weld segments sharing endpoints into polylines.
///
/// Open chains are walked from their ends first, then any closed loops.
/// Output order follows the first appearance of each chain's start point.
fn chain_segments(
    segments: &[(Point3<f64>, Point3<f64>)],
    tolerance: f64,
) -> Vec<Vec<Point3<f64>>> {
    let tol = tolerance.max(1e-300);
    let quantize = |p: &Point3<f64>| {
        (
            (p.x / tol).round() as i64,
            (p.y / tol).round() as i64,
            (p.z / tol).round() as i64,
        )
    };

    let mut vertex_ids: HashMap<(i64, i64, i64), usize> = HashMap::new();
    let mut vertices: Vec<Point3<f64>> = Vec::new();
    let mut id_of = |p: &Point3<f64>| {
        *vertex_ids.entry(quantize(p)).or_insert_with(|| {
            vertices.push(*p);
            vertices.len() - 1
        })
    };

    let mut edges: Vec<(usize, usize)> = Vec::new();
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    for (p, q) in segments {
        let a = id_of(p);
        let b = id_of(q);
        if a == b || !seen.insert((a.min(b), a.max(b))) {
            continue;
        }
        edges.push((a, b));
    }

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); vertices.len()];
    for (e, &(a, b)) in edges.iter().enumerate() {
        adjacency[a].push(e);
        adjacency[b].push(e);
    }

    let mut used = vec![false; edges.len()];
    let mut lines = Vec::new();

    let walk = |start: usize, used: &mut Vec<bool>| -> Vec<Point3<f64>> {
        let mut line = vec![vertices[start]];
        let mut current = start;
        while let Some(&e) = adjacency[current].iter().find(|&&e| !used[e]) {
            used[e] = true;
            let (a, b) = edges[e];
            current = if a == current { b } else { a };
            line.push(vertices[current]);
        }
        line
    };

    for v in 0..adjacency.len() {
        if adjacency[v].len() == 1 && !used[adjacency[v][0]] {
            lines.push(walk(v, &mut used));
        }
    }
    for v in 0..adjacency.len() {
        if adjacency[v].iter().any(|&e| !used[e]) {
            lines.push(walk(v, &mut used));
        }
    }

    lines.retain(|l| l.len() >= 2);
    lines
}

/// Height of the detachment under `(x, y)`, if any triangle covers it.
fn detachment_height(set: &TriangleSet, index: &BucketIndex, x: f64, y: f64) -> Option<f64> {
    for &t in index.at_point(x, y) {
        let [p1, p2, p3] = set.triangles[t];
        let denom = (p2.y - p3.y) * (p1.x - p3.x) + (p3.x - p2.x) * (p1.y - p3.y);
        if denom.abs() <= 1e-300 {
            continue;
        }
        let l1 = ((p2.y - p3.y) * (x - p3.x) + (p3.x - p2.x) * (y - p3.y)) / denom;
        let l2 = ((p3.y - p1.y) * (x - p3.x) + (p1.x - p3.x) * (y - p3.y)) / denom;
        let l3 = 1.0 - l1 - l2;
        let tol = -1e-9;
        if l1 >= tol && l2 >= tol && l3 >= tol {
            return Some(l1 * p1.z + l2 * p2.z + l3 * p3.z);
        }
    }
    None
}

/// Remove fault triangles lying wholly below the detachment. A triangle is
/// below when no corner rises above the detachment and its centroid sits
/// under it.
///
/// Triangles outside the detachment footprint are kept. If trimming would
/// remove every triangle the mesh is returned unchanged.
fn trim_below(
    mesh: &TriMesh,
    det: &TriangleSet,
    index: &BucketIndex,
    eps: f64,
) -> ConnectResult<TriMesh> {
    let (positions, faces) = mesh.to_indexed();
    // Height above the detachment, or None outside its footprint.
    let above = |p: &Point3<f64>| detachment_height(det, index, p.x, p.y).map(|z| p.z - z);
    let is_below = |f: &[usize; 3]| {
        let corners = f.map(|i| positions[i]);
        if !corners.iter().all(|p| above(p).is_some_and(|h| h <= eps)) {
            return false;
        }
        let centroid =
            Point3::from((corners[0].coords + corners[1].coords + corners[2].coords) / 3.0);
        above(&centroid).is_some_and(|h| h < -eps)
    };

    let kept: Vec<[usize; 3]> = faces.iter().copied().filter(|f| !is_below(f)).collect();
    if kept.is_empty() || kept.len() == faces.len() {
        return Ok(mesh.clone());
    }

    let mut remap = vec![usize::MAX; positions.len()];
    let mut new_positions = Vec::new();
    let mut new_faces = Vec::with_capacity(kept.len());
    for f in &kept {
        let mut nf = [0usize; 3];
        for (k, &i) in f.iter().enumerate() {
            if remap[i] == usize::MAX {
                remap[i] = new_positions.len();
                new_positions.push(positions[i]);
            }
            nf[k] = remap[i];
        }
        new_faces.push(nf);
    }
    TriMesh::from_indexed(&new_positions, &new_faces)
}
