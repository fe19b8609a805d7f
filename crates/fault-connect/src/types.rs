//! Core surface data types.
//!
//! A [`TriMesh`] stores nodes, edges and triangles with edge-to-triangle
//! adjacency. Triangles reference their three edges, edges reference their
//! two nodes. Elements carry a soft `deleted` flag and are skipped by every
//! query when set.
//!
//! A [`Surface`] wraps a mesh with the bookkeeping the connection workflow
//! needs: a fault id, a staging buffer of raw points that have not been
//! triangulated yet, a stale flag, and an optional cached best-fit plane.

use hashbrown::HashMap;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::{ConnectError, ConnectResult};
use crate::plane::SurfacePlane;

/// Minimum node count for a mesh to be accepted by the setters.
pub const MIN_NODES: usize = 3;
/// Minimum edge count for a mesh to be accepted by the setters.
pub const MIN_EDGES: usize = 3;
/// Minimum triangle count for a mesh to be accepted by the setters.
pub const MIN_TRIANGLES: usize = 1;

/// Id carried by detachment surfaces, which are not keyed.
pub const DETACHMENT_ID: i32 = -1;

/// A mesh node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// 3D position.
    pub position: Point3<f64>,
    /// Soft-delete flag.
    #[serde(default)]
    pub deleted: bool,
    /// Scratch flag used while collecting padding points.
    #[serde(default)]
    pub shifted: bool,
}

impl Node {
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            deleted: false,
            shifted: false,
        }
    }

    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }
}

/// A mesh edge joining two nodes, shared by at most two triangles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub node1: usize,
    pub node2: usize,
    #[serde(default)]
    pub tri1: Option<usize>,
    #[serde(default)]
    pub tri2: Option<usize>,
    #[serde(default)]
    pub deleted: bool,
    /// Cached length; zero or negative when not computed yet.
    #[serde(default)]
    pub length: f64,
}

impl Edge {
    #[inline]
    pub fn new(node1: usize, node2: usize) -> Self {
        Self {
            node1,
            node2,
            tri1: None,
            tri2: None,
            deleted: false,
            length: 0.0,
        }
    }

    #[inline]
    fn touches(&self, node: usize) -> bool {
        self.node1 == node || self.node2 == node
    }
}

/// A triangle defined by three edge indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub edges: [usize; 3],
    #[serde(default)]
    pub flag: i32,
    #[serde(default)]
    pub deleted: bool,
}

impl Triangle {
    #[inline]
    pub fn new(edges: [usize; 3]) -> Self {
        Self {
            edges,
            flag: 0,
            deleted: false,
        }
    }
}

/// Axis-aligned 3D bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds3 {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Bounds3 {
    /// Box around a single point.
    #[inline]
    pub fn from_point(p: &Point3<f64>) -> Self {
        Self { min: *p, max: *p }
    }

    /// Box around a set of points; `None` when empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self::from_point(first);
        for p in iter {
            bounds.include(p);
        }
        Some(bounds)
    }

    /// Grow to contain `p`.
    pub fn include(&mut self, p: &Point3<f64>) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Bounds3) -> Bounds3 {
        let mut out = *self;
        out.include(&other.min);
        out.include(&other.max);
        out
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn depth(&self) -> f64 {
        self.max.z - self.min.z
    }

    /// True when the plan-view footprint has no area.
    #[inline]
    pub fn is_degenerate_xy(&self) -> bool {
        !(self.min.x < self.max.x && self.min.y < self.max.y)
    }

    /// True if `p` lies inside the box, widened by `tolerance` on every side.
    pub fn contains(&self, p: &Point3<f64>, tolerance: f64) -> bool {
        p.x >= self.min.x - tolerance
            && p.x <= self.max.x + tolerance
            && p.y >= self.min.y - tolerance
            && p.y <= self.max.y + tolerance
            && p.z >= self.min.z - tolerance
            && p.z <= self.max.z + tolerance
    }
}

/// Triangulated surface: nodes, edges and triangles with adjacency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriMesh {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub triangles: Vec<Triangle>,
}

impl TriMesh {
    /// Create an empty mesh.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mesh from positions and node-index faces, deriving edges and
    /// edge-to-triangle adjacency. Faces with out-of-range or repeated
    /// indices are rejected.
    pub fn from_indexed(positions: &[Point3<f64>], faces: &[[usize; 3]]) -> ConnectResult<Self> {
        let nodes: Vec<Node> = positions.iter().copied().map(Node::new).collect();
        let mut edges: Vec<Edge> = Vec::with_capacity(faces.len() * 3 / 2 + 3);
        let mut triangles = Vec::with_capacity(faces.len());
        let mut edge_lookup: HashMap<(usize, usize), usize> = HashMap::new();

        for (tri_idx, face) in faces.iter().enumerate() {
            if face.iter().any(|&n| n >= nodes.len()) {
                return Err(ConnectError::invalid_mesh(format!(
                    "face {} references node outside 0..{}",
                    tri_idx,
                    nodes.len()
                )));
            }
            if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                return Err(ConnectError::invalid_mesh(format!(
                    "face {} repeats a node index",
                    tri_idx
                )));
            }

            let mut tri_edges = [0usize; 3];
            for k in 0..3 {
                let a = face[k];
                let b = face[(k + 1) % 3];
                let key = (a.min(b), a.max(b));
                let edge_idx = *edge_lookup.entry(key).or_insert_with(|| {
                    edges.push(Edge::new(a, b));
                    edges.len() - 1
                });
                let edge = &mut edges[edge_idx];
                if edge.tri1.is_none() {
                    edge.tri1 = Some(tri_idx);
                } else if edge.tri2.is_none() {
                    edge.tri2 = Some(tri_idx);
                }
                tri_edges[k] = edge_idx;
            }
            triangles.push(Triangle::new(tri_edges));
        }

        Ok(Self {
            nodes,
            edges,
            triangles,
        })
    }

    /// Flatten to positions and node-index faces of live triangles.
    pub fn to_indexed(&self) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let positions = self.nodes.iter().map(|n| n.position).collect();
        let faces = (0..self.triangles.len())
            .filter(|&t| !self.triangles[t].deleted)
            .filter_map(|t| self.triangle_nodes(t))
            .collect();
        (positions, faces)
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// True if the mesh has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True when the mesh has enough elements to be stored by the setters.
    #[inline]
    pub fn meets_minimum(&self) -> bool {
        self.nodes.len() >= MIN_NODES
            && self.edges.len() >= MIN_EDGES
            && self.triangles.len() >= MIN_TRIANGLES
    }

    /// Check that all live edges and triangles reference valid indices.
    pub fn validate(&self) -> ConnectResult<()> {
        let num_nodes = self.nodes.len();
        let num_edges = self.edges.len();
        let num_tris = self.triangles.len();

        for (i, edge) in self.edges.iter().enumerate() {
            if edge.deleted {
                continue;
            }
            if edge.node1 >= num_nodes || edge.node2 >= num_nodes {
                return Err(ConnectError::invalid_mesh(format!(
                    "edge {} references node outside 0..{}",
                    i, num_nodes
                )));
            }
            for tri in [edge.tri1, edge.tri2].into_iter().flatten() {
                if tri >= num_tris {
                    return Err(ConnectError::invalid_mesh(format!(
                        "edge {} references triangle {} outside 0..{}",
                        i, tri, num_tris
                    )));
                }
            }
        }

        for (i, tri) in self.triangles.iter().enumerate() {
            if tri.deleted {
                continue;
            }
            if let Some(&bad) = tri.edges.iter().find(|&&e| e >= num_edges) {
                return Err(ConnectError::invalid_mesh(format!(
                    "triangle {} references edge {} outside 0..{}",
                    i, bad, num_edges
                )));
            }
        }

        Ok(())
    }

    /// Node indices of a triangle, in edge order.
    ///
    /// Returns `None` for deleted or malformed triangles.
    pub fn triangle_nodes(&self, tri: usize) -> Option<[usize; 3]> {
        let t = self.triangles.get(tri)?;
        if t.deleted {
            return None;
        }
        let e0 = self.edges.get(t.edges[0])?;
        let e1 = self.edges.get(t.edges[1])?;
        let (n1, n2) = (e0.node1, e0.node2);
        let n3 = if e1.touches(n1) != e1.touches(n2) {
            if e1.node1 == n1 || e1.node1 == n2 {
                e1.node2
            } else {
                e1.node1
            }
        } else {
            let e2 = self.edges.get(t.edges[2])?;
            if e2.node1 == n1 || e2.node1 == n2 {
                e2.node2
            } else {
                e2.node1
            }
        };
        if n3 == n1 || n3 == n2 || n1 == n2 {
            return None;
        }
        if [n1, n2, n3].iter().any(|&n| n >= self.nodes.len()) {
            return None;
        }
        Some([n1, n2, n3])
    }

    /// Corner positions of a triangle.
    pub fn triangle_points(&self, tri: usize) -> Option<[Point3<f64>; 3]> {
        let [a, b, c] = self.triangle_nodes(tri)?;
        Some([
            self.nodes[a].position,
            self.nodes[b].position,
            self.nodes[c].position,
        ])
    }

    /// Positions of nodes that are not deleted.
    pub fn live_positions(&self) -> impl Iterator<Item = &Point3<f64>> {
        self.nodes
            .iter()
            .filter(|n| !n.deleted)
            .map(|n| &n.position)
    }

    /// Bounding box of live nodes.
    pub fn bounds(&self) -> Option<Bounds3> {
        Bounds3::from_points(self.live_positions())
    }

    /// Plan-view length of an edge. Out-of-range edges measure zero.
    pub fn edge_length_xy(&self, edge: usize) -> f64 {
        let Some(e) = self.edges.get(edge) else {
            return 0.0;
        };
        match (self.nodes.get(e.node1), self.nodes.get(e.node2)) {
            (Some(a), Some(b)) => {
                let dx = a.position.x - b.position.x;
                let dy = a.position.y - b.position.y;
                (dx * dx + dy * dy).sqrt()
            }
            _ => 0.0,
        }
    }

    /// Mean plan-view length of live edges; `None` with no edges.
    pub fn mean_edge_length_xy(&self) -> Option<f64> {
        let (sum, count) = self
            .edges
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.deleted)
            .fold((0.0, 0usize), |(sum, count), (i, _)| {
                (sum + self.edge_length_xy(i), count + 1)
            });
        (count > 0).then(|| sum / count as f64)
    }

    /// Sum and count of live edge lengths, preferring the cached length and
    /// caching the plan-view length where none was stored.
    pub fn cached_edge_length_sum(&mut self) -> (f64, usize) {
        let mut sum = 0.0;
        let mut count = 0;
        for i in 0..self.edges.len() {
            if self.edges[i].deleted {
                continue;
            }
            if self.edges[i].length <= 0.0 {
                self.edges[i].length = self.edge_length_xy(i);
            }
            sum += self.edges[i].length;
            count += 1;
        }
        (sum, count)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.triangles.clear();
    }
}

/// A named triangulated surface plus its staging buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    /// Fault id, or [`DETACHMENT_ID`] for detachment surfaces.
    pub id: i32,
    pub mesh: TriMesh,
    /// Raw points waiting for a re-triangulation.
    #[serde(default)]
    pub staged: Vec<Point3<f64>>,
    /// Set when `staged` holds data newer than `mesh`.
    #[serde(default)]
    pub recalc: bool,
    /// Cached best-fit plane.
    #[serde(default)]
    pub plane: Option<SurfacePlane>,
}

impl Surface {
    /// Surface holding a copy of a mesh.
    pub fn from_mesh(id: i32, mesh: TriMesh) -> Self {
        Self {
            id,
            mesh,
            staged: Vec::new(),
            recalc: false,
            plane: None,
        }
    }

    /// Surface holding only staged points.
    pub fn from_points(id: i32, points: &[Point3<f64>]) -> Self {
        Self {
            id,
            mesh: TriMesh::new(),
            staged: points.to_vec(),
            recalc: true,
            plane: None,
        }
    }

    /// Append another mesh's nodes to the staging buffer.
    pub fn append_mesh(&mut self, mesh: &TriMesh) {
        self.stage_existing_mesh(mesh.live_positions().count());
        self.staged.extend(mesh.live_positions().copied());
        self.recalc = true;
    }

    /// Append raw points to the staging buffer.
    pub fn append_points(&mut self, points: &[Point3<f64>]) {
        self.stage_existing_mesh(points.len());
        self.staged.extend_from_slice(points);
        self.recalc = true;
    }

    /// Move the current mesh nodes into `staged` and drop the stale mesh.
    fn stage_existing_mesh(&mut self, incoming: usize) {
        self.staged.reserve(self.mesh.node_count() + incoming);
        self.staged.extend(self.mesh.live_positions().copied());
        self.mesh.clear();
    }

    /// Number of staged points.
    #[inline]
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Live mesh nodes followed by staged points.
    pub fn all_points(&self) -> Vec<Point3<f64>> {
        self.mesh
            .live_positions()
            .chain(self.staged.iter())
            .copied()
            .collect()
    }

    /// Plane in its six-value wire form, if one is cached.
    pub fn plane_wire(&self) -> Option<[f64; 6]> {
        self.plane.as_ref().map(SurfacePlane::to_wire)
    }

    /// Reset to an empty surface, keeping the id.
    pub fn clear(&mut self) {
        self.mesh.clear();
        self.staged.clear();
        self.recalc = false;
        self.plane = None;
    }
}

/// A 3D polyline bordering one fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionLine {
    pub points: Vec<Point3<f64>>,
    /// Id of the fault this line borders.
    pub fault_id: i32,
}

impl IntersectionLine {
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

#[cfg(test)]
pub(crate) mod test_meshes {
    use super::*;

    /// Regular grid of right triangles over `[0, n*spacing]^2` at height `z`.
    pub fn flat_grid(n: usize, spacing: f64, z: f64) -> TriMesh {
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
        TriMesh::from_indexed(&positions, &faces).expect("valid grid")
    }

    /// Vertical rectangle in the plane `x = x0`.
    pub fn vertical_panel(x0: f64, y: (f64, f64), z: (f64, f64), n: usize) -> TriMesh {
        let mut positions = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                let yy = y.0 + (y.1 - y.0) * i as f64 / n as f64;
                let zz = z.0 + (z.1 - z.0) * j as f64 / n as f64;
                positions.push(Point3::new(x0, yy, zz));
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
        TriMesh::from_indexed(&positions, &faces).expect("valid panel")
    }
}
