//! Best-fit planes.
//!
//! [`PlaneFitter`] accumulates points (raw or from a trimesh) and fits a
//! total-least-squares plane through them. The resulting [`SurfacePlane`]
//! defines a local frame `(u, v, w)`: `u` runs along strike, `v` down the
//! dip direction within the plane, `w` along the normal. Near-planar fault
//! data becomes a height field `w(u, v)` in that frame, which is what the
//! padding engine grids.
//!
//! The six-value wire form is `[nx, ny, nz, ox, oy, oz]`: the unit normal
//! followed by the origin.

use nalgebra::{Matrix2, Matrix3, Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ConnectError, ConnectResult};
use crate::types::TriMesh;

/// Normals with a z component above this are treated as horizontal planes
/// when choosing the strike axis.
const NEAR_HORIZONTAL_NZ: f64 = 0.999;

/// A plane through `origin` with unit `normal`, normal oriented upward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfacePlane {
    normal: Vector3<f64>,
    origin: Point3<f64>,
}

impl SurfacePlane {
    /// Create a plane; the normal is normalized and flipped to point up.
    pub fn new(normal: Vector3<f64>, origin: Point3<f64>) -> ConnectResult<Self> {
        let len = normal.norm();
        if !len.is_finite() || len <= 1e-30 {
            return Err(ConnectError::plane_fit("plane normal has zero length"));
        }
        Ok(Self {
            normal: orient_up(normal / len),
            origin,
        })
    }

    /// Rebuild from the six-value wire form.
    pub fn from_wire(wire: [f64; 6]) -> ConnectResult<Self> {
        Self::new(
            Vector3::new(wire[0], wire[1], wire[2]),
            Point3::new(wire[3], wire[4], wire[5]),
        )
    }

    /// Six-value wire form.
    pub fn to_wire(&self) -> [f64; 6] {
        [
            self.normal.x,
            self.normal.y,
            self.normal.z,
            self.origin.x,
            self.origin.y,
            self.origin.z,
        ]
    }

    #[inline]
    pub fn normal(&self) -> Vector3<f64> {
        self.normal
    }

    #[inline]
    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    /// Signed distance from the plane, positive on the normal side.
    #[inline]
    pub fn distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&(p - self.origin))
    }

    /// Strike and in-plane dip axes.
    pub fn axes(&self) -> (Vector3<f64>, Vector3<f64>) {
        let n = self.normal;
        let strike = if n.z.abs() < NEAR_HORIZONTAL_NZ {
            Vector3::z().cross(&n).normalize()
        } else {
            let x = Vector3::x();
            (x - n * n.dot(&x)).normalize()
        };
        let dip = n.cross(&strike);
        (strike, dip)
    }

    /// World point to plane frame `(u, v, w)`.
    pub fn to_local(&self, p: &Point3<f64>) -> Point3<f64> {
        let (u, v) = self.axes();
        let d = p - self.origin;
        Point3::new(u.dot(&d), v.dot(&d), self.normal.dot(&d))
    }

    /// Plane frame point back to world coordinates.
    pub fn to_world(&self, q: &Point3<f64>) -> Point3<f64> {
        let (u, v) = self.axes();
        self.origin + u * q.x + v * q.y + self.normal * q.z
    }
}

fn orient_up(n: Vector3<f64>) -> Vector3<f64> {
    if n.z < 0.0 || (n.z == 0.0 && (n.x < 0.0 || (n.x == 0.0 && n.y < 0.0))) {
        -n
    } else {
        n
    }
}

/// Accumulates points and fits a plane through them.
#[derive(Debug, Clone, Default)]
pub struct PlaneFitter {
    points: Vec<Point3<f64>>,
}

impl PlaneFitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add raw points.
    pub fn add_points(&mut self, points: &[Point3<f64>]) {
        self.points.extend_from_slice(points);
    }

    /// Add the live nodes of a trimesh.
    pub fn add_tri_mesh(&mut self, mesh: &TriMesh) {
        self.points.extend(mesh.live_positions().copied());
    }

    /// Number of accumulated points.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Drop all accumulated points.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Fit a plane through the accumulated points.
    ///
    /// Uses the eigenvector of the smallest eigenvalue of the covariance
    /// matrix. Fails with fewer than three points or collinear data.
    pub fn calc_plane(&self) -> ConnectResult<SurfacePlane> {
        let n = self.points.len();
        if n < 3 {
            return Err(ConnectError::plane_fit(format!(
                "need at least 3 points, have {}",
                n
            )));
        }

        let centroid = self
            .points
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, p| acc + p.coords)
            / n as f64;

        let mut cov = Matrix3::<f64>::zeros();
        for p in &self.points {
            let d = p.coords - centroid;
            cov += d * d.transpose();
        }

        let eigen = cov.symmetric_eigen();
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
        let smallest = order[0];
        let middle = eigen.eigenvalues[order[1]];
        let largest = eigen.eigenvalues[order[2]];

        if largest <= 0.0 || middle <= largest * 1e-12 {
            return Err(ConnectError::plane_fit("points are coincident or collinear"));
        }

        let normal: Vector3<f64> = eigen.eigenvectors.column(smallest).into_owned();
        let plane = SurfacePlane::new(normal, Point3::from(centroid))?;
        debug!(
            points = n,
            nx = plane.normal.x,
            ny = plane.normal.y,
            nz = plane.normal.z,
            "Fitted best-fit plane"
        );
        Ok(plane)
    }
}

/// Least-squares fit of `z = c0 + c1 x + c2 y`.
///
/// Returns `None` for fewer than three points or a degenerate footprint.
pub fn fit_height_plane(points: &[Point3<f64>]) -> Option<[f64; 3]> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy, sz) = points
        .iter()
        .fold((0.0, 0.0, 0.0), |(x, y, z), p| (x + p.x, y + p.y, z + p.z));
    let (mx, my, mz) = (sx / n, sy / n, sz / n);

    let mut a = Matrix2::<f64>::zeros();
    let mut b = Vector2::<f64>::zeros();
    for p in points {
        let dx = p.x - mx;
        let dy = p.y - my;
        let dz = p.z - mz;
        a[(0, 0)] += dx * dx;
        a[(0, 1)] += dx * dy;
        a[(1, 1)] += dy * dy;
        b[0] += dx * dz;
        b[1] += dy * dz;
    }
    a[(1, 0)] = a[(0, 1)];

    let solution = a.lu().solve(&b)?;
    let (c1, c2) = (solution[0], solution[1]);
    if !c1.is_finite() || !c2.is_finite() {
        return None;
    }
    let coefs = [mz - c1 * mx - c2 * my, c1, c2];
    trace!(c0 = coefs[0], c1 = coefs[1], c2 = coefs[2], "Height plane fitted");
    Some(coefs)
}

/// Evaluate `z = c0 + c1 x + c2 y`.
#[inline]
pub fn height_plane_z(coefs: &[f64; 3], x: f64, y: f64) -> f64 {
    coefs[0] + coefs[1] * x + coefs[2] * y
}
