//! Regular height grids and the grid collaborators used for padding.
//!
//! A [`Grid`] stores `ncol * nrow` node values over a [`GridArea`], row
//! major, with [`GRID_NULL`] marking unfilled nodes. The [`GridEngine`]
//! trait bundles the grid operations the padding engine and the bracketed
//! detachment calculator rely on. [`IdwGridEngine`] is the default
//! implementation: a detrended inverse-distance interpolator.

use nalgebra::Point3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ConnectError, ConnectResult};
use crate::plane::{fit_height_plane, height_plane_z};
use crate::types::{Bounds3, TriMesh};

/// Value stored in unfilled grid nodes.
pub const GRID_NULL: f64 = 1.0e30;

/// Values at or above this are treated as null.
const NULL_THRESHOLD: f64 = 1.0e20;

/// Largest node count a grid may hold.
pub const MAX_GRID_NODES: usize = 16_000_000;

/// True if a grid value is the null marker.
#[inline]
pub fn is_null(value: f64) -> bool {
    !value.is_finite() || value >= NULL_THRESHOLD
}

/// Plan-view rectangle covered by a grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridArea {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl GridArea {
    #[inline]
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Plan-view footprint of a bounding box.
    #[inline]
    pub fn from_bounds(bounds: &Bounds3) -> Self {
        Self::new(bounds.min.x, bounds.min.y, bounds.max.x, bounds.max.y)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// True when the area has no extent in x or y.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        !(self.xmin < self.xmax && self.ymin < self.ymax)
    }

    /// Grow each side by `fraction` of the width (x) or height (y).
    pub fn expanded(&self, fraction: f64) -> Self {
        let dx = self.width() * fraction;
        let dy = self.height() * fraction;
        Self::new(self.xmin - dx, self.ymin - dy, self.xmax + dx, self.ymax + dy)
    }

    /// Smallest area containing both.
    pub fn union(&self, other: &GridArea) -> Self {
        Self::new(
            self.xmin.min(other.xmin),
            self.ymin.min(other.ymin),
            self.xmax.max(other.xmax),
            self.ymax.max(other.ymax),
        )
    }
}

/// Triangulation pattern used when turning a grid into a trimesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriangulationScheme {
    /// Cell diagonals alternate direction on every row, which keeps
    /// triangles closer to equilateral.
    #[default]
    Equilateral,
    /// Every cell is split along the same diagonal.
    RightIsoceles,
}

/// Regular grid of node values.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub values: Vec<f64>,
    pub ncol: usize,
    pub nrow: usize,
    pub area: GridArea,
}

impl Grid {
    /// Create an all-null grid.
    pub fn new(ncol: usize, nrow: usize, area: GridArea) -> ConnectResult<Self> {
        if ncol < 2 || nrow < 2 {
            return Err(ConnectError::grid(format!(
                "grid needs at least 2 x 2 nodes, got {} x {}",
                ncol, nrow
            )));
        }
        if area.is_degenerate() {
            return Err(ConnectError::degenerate(format!(
                "grid area {:?} has no extent",
                area
            )));
        }
        let total = ncol.checked_mul(nrow).unwrap_or(usize::MAX);
        if total > MAX_GRID_NODES {
            return Err(ConnectError::grid(format!(
                "grid of {} x {} nodes exceeds limit of {}",
                ncol, nrow, MAX_GRID_NODES
            )));
        }
        Ok(Self {
            values: vec![GRID_NULL; total],
            ncol,
            nrow,
            area,
        })
    }

    #[inline]
    pub fn index(&self, col: usize, row: usize) -> usize {
        row * self.ncol + col
    }

    #[inline]
    pub fn get(&self, col: usize, row: usize) -> f64 {
        self.values[self.index(col, row)]
    }

    #[inline]
    pub fn set(&mut self, col: usize, row: usize, value: f64) {
        let idx = self.index(col, row);
        self.values[idx] = value;
    }

    #[inline]
    pub fn x_spacing(&self) -> f64 {
        self.area.width() / (self.ncol - 1) as f64
    }

    #[inline]
    pub fn y_spacing(&self) -> f64 {
        self.area.height() / (self.nrow - 1) as f64
    }

    /// Plan-view position of a node.
    #[inline]
    pub fn node_xy(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.area.xmin + col as f64 * self.x_spacing(),
            self.area.ymin + row as f64 * self.y_spacing(),
        )
    }

    /// Number of null nodes.
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| is_null(**v)).count()
    }

    /// Smallest and largest non-null value.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .copied()
            .filter(|v| !is_null(*v))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Grid operations used by padding and bracket interpolation.
pub trait GridEngine {
    /// Suggested grid dimensions `(ncol, nrow)` for a point set.
    fn recommended_size(&self, points: &[Point3<f64>], area: &GridArea) -> (usize, usize);

    /// Interpolate scattered `z` values onto a new grid.
    fn interpolate(
        &self,
        points: &[Point3<f64>],
        ncol: usize,
        nrow: usize,
        area: GridArea,
    ) -> ConnectResult<Grid>;

    /// Replace every null node with a value derived from its neighbours.
    fn fill_nulls(&self, grid: &mut Grid) -> ConnectResult<()>;

    /// Smooth a grid; larger `passes` smooths harder.
    fn smooth(&self, grid: &mut Grid, passes: usize) -> ConnectResult<()>;

    /// Triangulate the non-null nodes of a grid.
    fn grid_to_trimesh(&self, grid: &Grid, scheme: TriangulationScheme) -> ConnectResult<TriMesh> {
        grid_to_trimesh(grid, scheme)
    }

    /// Sample a trimesh onto a grid; nodes outside the mesh stay null.
    fn trimesh_to_grid(
        &self,
        mesh: &TriMesh,
        ncol: usize,
        nrow: usize,
        area: GridArea,
    ) -> ConnectResult<Grid> {
        rasterize_trimesh(mesh, ncol, nrow, area)
    }
}

/// Inverse-distance-weighted interpolation of residuals about a
/// least-squares trend plane.
///
/// The trend keeps extrapolated regions (padding) following the dominant
/// slope of the data instead of flattening toward the mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdwGridEngine {
    /// Distance exponent.
    pub power: f64,
    /// Nearest points used per node.
    pub max_neighbors: usize,
    /// Interpolate residuals about a fitted plane.
    pub detrend: bool,
    /// Upper bound on each recommended dimension.
    pub max_recommended: usize,
}

impl Default for IdwGridEngine {
    fn default() -> Self {
        Self {
            power: 2.0,
            max_neighbors: 16,
            detrend: true,
            max_recommended: 400,
        }
    }
}

impl GridEngine for IdwGridEngine {
    fn recommended_size(&self, points: &[Point3<f64>], area: &GridArea) -> (usize, usize) {
        if area.is_degenerate() {
            return (2, 2);
        }
        let n = points.len().max(4) as f64;
        let aspect = area.width() / area.height();
        let max = self.max_recommended.max(2);
        let ncol = ((n * aspect).sqrt() * 2.0).round().clamp(2.0, max as f64) as usize;
        let nrow = (ncol as f64 / aspect).round().clamp(2.0, max as f64) as usize;
        (ncol, nrow)
    }

    fn interpolate(
        &self,
        points: &[Point3<f64>],
        ncol: usize,
        nrow: usize,
        area: GridArea,
    ) -> ConnectResult<Grid> {
        let mut grid = Grid::new(ncol, nrow, area)?;

        let usable: Vec<Point3<f64>> = points
            .iter()
            .filter(|p| p.x.is_finite() && p.y.is_finite() && !is_null(p.z))
            .copied()
            .collect();
        if usable.is_empty() {
            return Err(ConnectError::grid("no usable points to interpolate"));
        }

        let trend = if self.detrend {
            fit_height_plane(&usable)
        } else {
            None
        };
        let trend_z = |x: f64, y: f64| trend.as_ref().map_or(0.0, |c| height_plane_z(c, x, y));
        let residuals: Vec<(f64, f64, f64)> = usable
            .iter()
            .map(|p| (p.x, p.y, p.z - trend_z(p.x, p.y)))
            .collect();

        let dx = grid.x_spacing();
        let dy = grid.y_spacing();
        let snap = 1e-9 * (area.width() + area.height());
        let snap2 = snap * snap;
        let k = self.max_neighbors.max(1).min(residuals.len());
        let power = self.power;

        grid.values
            .par_chunks_mut(ncol)
            .enumerate()
            .for_each(|(row, chunk)| {
                let y = area.ymin + row as f64 * dy;
                let mut scratch: Vec<(f64, f64)> = Vec::with_capacity(residuals.len());
                for (col, cell) in chunk.iter_mut().enumerate() {
                    let x = area.xmin + col as f64 * dx;
                    scratch.clear();
                    scratch.extend(residuals.iter().map(|&(px, py, r)| {
                        let ddx = px - x;
                        let ddy = py - y;
                        (ddx * ddx + ddy * ddy, r)
                    }));
                    if k < scratch.len() {
                        scratch.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
                        scratch.truncate(k);
                    }
                    *cell = inverse_distance(&scratch, power, snap2) + trend_z(x, y);
                }
            });

        trace!(ncol, nrow, points = usable.len(), "Interpolated grid");
        Ok(grid)
    }

    fn fill_nulls(&self, grid: &mut Grid) -> ConnectResult<()> {
        let total = grid.values.len();
        let mut remaining = grid.null_count();
        if remaining == total {
            return Err(ConnectError::grid("grid has no values to fill from"));
        }

        while remaining > 0 {
            let snapshot = grid.values.clone();
            let mut filled = 0;
            for row in 0..grid.nrow {
                for col in 0..grid.ncol {
                    let idx = grid.index(col, row);
                    if !is_null(snapshot[idx]) {
                        continue;
                    }
                    if let Some(avg) = neighbour_mean(&snapshot, grid.ncol, grid.nrow, col, row) {
                        grid.values[idx] = avg;
                        filled += 1;
                    }
                }
            }
            if filled == 0 {
                return Err(ConnectError::grid("null fill made no progress"));
            }
            remaining -= filled;
        }
        Ok(())
    }

    fn smooth(&self, grid: &mut Grid, passes: usize) -> ConnectResult<()> {
        for _ in 0..passes {
            let snapshot = grid.values.clone();
            for row in 0..grid.nrow {
                for col in 0..grid.ncol {
                    let idx = grid.index(col, row);
                    if is_null(snapshot[idx]) {
                        continue;
                    }
                    let (sum, count) = window(grid.ncol, grid.nrow, col, row)
                        .map(|i| snapshot[i])
                        .filter(|v| !is_null(*v))
                        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
                    grid.values[idx] = sum / count as f64;
                }
            }
        }
        Ok(())
    }
}

fn inverse_distance(neighbours: &[(f64, f64)], power: f64, snap2: f64) -> f64 {
    let mut wsum = 0.0;
    let mut vsum = 0.0;
    for &(d2, value) in neighbours {
        if d2 <= snap2 {
            return value;
        }
        let w = 1.0 / d2.powf(power * 0.5);
        wsum += w;
        vsum += w * value;
    }
    if wsum > 0.0 { vsum / wsum } else { 0.0 }
}

/// Indices of the 3x3 window around a node, clipped to the grid.
fn window(ncol: usize, nrow: usize, col: usize, row: usize) -> impl Iterator<Item = usize> {
    let c0 = col.saturating_sub(1);
    let c1 = (col + 1).min(ncol - 1);
    let r0 = row.saturating_sub(1);
    let r1 = (row + 1).min(nrow - 1);
    (r0..=r1).flat_map(move |r| (c0..=c1).map(move |c| r * ncol + c))
}

fn neighbour_mean(values: &[f64], ncol: usize, nrow: usize, col: usize, row: usize) -> Option<f64> {
    let (sum, count) = window(ncol, nrow, col, row)
        .map(|i| values[i])
        .filter(|v| !is_null(*v))
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Triangulate the non-null nodes of a grid.
///
/// A cell contributes a triangle only where all three of its corners are
/// filled. Nodes not used by any triangle are dropped.
pub fn grid_to_trimesh(grid: &Grid, scheme: TriangulationScheme) -> ConnectResult<TriMesh> {
    let mut cell_faces: Vec<[usize; 3]> = Vec::new();
    for row in 0..grid.nrow - 1 {
        for col in 0..grid.ncol - 1 {
            let a = grid.index(col, row);
            let b = grid.index(col + 1, row);
            let d = grid.index(col, row + 1);
            let e = grid.index(col + 1, row + 1);
            let flip = scheme == TriangulationScheme::Equilateral && row % 2 == 1;
            let pair = if flip {
                [[a, b, d], [b, e, d]]
            } else {
                [[a, b, e], [a, e, d]]
            };
            for face in pair {
                if face.iter().all(|&i| !is_null(grid.values[i])) {
                    cell_faces.push(face);
                }
            }
        }
    }

    if cell_faces.is_empty() {
        return Err(ConnectError::triangulation("grid has no fully filled cells"));
    }

    let mut remap = vec![usize::MAX; grid.values.len()];
    let mut positions = Vec::new();
    for face in &cell_faces {
        for &i in face {
            if remap[i] == usize::MAX {
                remap[i] = positions.len();
                let (x, y) = grid.node_xy(i % grid.ncol, i / grid.ncol);
                positions.push(Point3::new(x, y, grid.values[i]));
            }
        }
    }
    let faces: Vec<[usize; 3]> = cell_faces
        .iter()
        .map(|f| [remap[f[0]], remap[f[1]], remap[f[2]]])
        .collect();

    debug!(
        nodes = positions.len(),
        triangles = faces.len(),
        ?scheme,
        "Triangulated grid"
    );
    TriMesh::from_indexed(&positions, &faces)
}

/// Sample a trimesh onto a grid by barycentric interpolation in plan view.
///
/// Nodes outside every triangle stay null; nearly vertical triangles are
/// skipped.
pub fn rasterize_trimesh(
    mesh: &TriMesh,
    ncol: usize,
    nrow: usize,
    area: GridArea,
) -> ConnectResult<Grid> {
    let mut grid = Grid::new(ncol, nrow, area)?;
    let dx = grid.x_spacing();
    let dy = grid.y_spacing();
    let eps = 1e-9;

    for t in 0..mesh.triangle_count() {
        let Some([p1, p2, p3]) = mesh.triangle_points(t) else {
            continue;
        };
        let denom = (p2.y - p3.y) * (p1.x - p3.x) + (p3.x - p2.x) * (p1.y - p3.y);
        let scale = (p1.x - p3.x).abs().max((p1.y - p3.y).abs()).max(1e-300);
        if denom.abs() <= 1e-12 * scale * scale {
            continue;
        }

        let xlo = p1.x.min(p2.x).min(p3.x);
        let xhi = p1.x.max(p2.x).max(p3.x);
        let ylo = p1.y.min(p2.y).min(p3.y);
        let yhi = p1.y.max(p2.y).max(p3.y);

        let c0 = (((xlo - area.xmin) / dx) - eps).ceil().max(0.0) as usize;
        let c1 = (((xhi - area.xmin) / dx) + eps).floor();
        let r0 = (((ylo - area.ymin) / dy) - eps).ceil().max(0.0) as usize;
        let r1 = (((yhi - area.ymin) / dy) + eps).floor();
        if c1 < 0.0 || r1 < 0.0 {
            continue;
        }
        let c1 = (c1 as usize).min(ncol - 1);
        let r1 = (r1 as usize).min(nrow - 1);

        for row in r0..=r1 {
            for col in c0..=c1 {
                let idx = grid.index(col, row);
                if !is_null(grid.values[idx]) {
                    continue;
                }
                let (x, y) = grid.node_xy(col, row);
                let l1 = ((p2.y - p3.y) * (x - p3.x) + (p3.x - p2.x) * (y - p3.y)) / denom;
                let l2 = ((p3.y - p1.y) * (x - p3.x) + (p1.x - p3.x) * (y - p3.y)) / denom;
                let l3 = 1.0 - l1 - l2;
                if l1 >= -eps && l2 >= -eps && l3 >= -eps {
                    grid.values[idx] = l1 * p1.z + l2 * p2.z + l3 * p3.z;
                }
            }
        }
    }

    trace!(ncol, nrow, nulls = grid.null_count(), "Rasterized trimesh");
    Ok(grid)
}
