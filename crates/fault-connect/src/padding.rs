//! Padding of detachment and fault surfaces.
//!
//! Before sealing, every surface is extended so that faults are guaranteed
//! to cut the detachment:
//!
//! - the detachment is regridded over its footprint plus a small margin;
//! - each fault is rotated into its best-fit plane, gridded as a height
//!   field in that frame, and extended down dip past the deepest point of
//!   the model.
//!
//! The functions here are pure with respect to the connection state: they
//! read a surface and return the padded variant. The only mutation is the
//! plane cached on a fault and the `shifted` scratch flag, which is reset
//! before returning.

use nalgebra::{Point3, Vector3};
use tracing::{debug, trace, warn};

use crate::error::{ConnectError, ConnectResult};
use crate::grid::{GridArea, GridEngine, TriangulationScheme};
use crate::params::PadParams;
use crate::plane::{PlaneFitter, SurfacePlane, fit_height_plane};
use crate::types::{Bounds3, DETACHMENT_ID, Surface, TriMesh};

/// Padded detachment plus the height-plane fit of its input points.
#[derive(Debug, Clone)]
pub struct DetachmentPad {
    pub surface: Surface,
    /// `z = c0 + c1 x + c2 y` through the input points.
    pub plane_coefs: Option<[f64; 3]>,
}

/// Unit normal of a triangle, flipped so `z >= 0`.
///
/// Degenerate triangles report a vertical normal.
pub fn triangle_normal(points: &[Point3<f64>; 3]) -> Vector3<f64> {
    let n = (points[1] - points[0]).cross(&(points[2] - points[0]));
    let len = n.norm();
    if len <= 1e-30 {
        return Vector3::z();
    }
    let n = n / len;
    if n.z < 0.0 { -n } else { n }
}

/// Grid dimension covering `extent` at `spacing`, at least 2.
#[inline]
pub fn grid_dimension(extent: f64, spacing: f64) -> usize {
    ((extent / spacing + 1.5) as usize).max(2)
}

/// Regrid the detachment over its footprint expanded by
/// `detachment_pad_fraction` on every side.
///
/// The footprint comes from `limits` when given and non-degenerate,
/// otherwise from the surface points. Returns `Ok(None)` with fewer than
/// three points or a degenerate footprint. The expansion is local to this
/// call, so repeated calls produce identical results.
pub fn pad_detachment<G: GridEngine + ?Sized>(
    detachment: &Surface,
    limits: Option<&Bounds3>,
    spacing: Option<f64>,
    engine: &G,
    params: &PadParams,
) -> ConnectResult<Option<DetachmentPad>> {
    let points = detachment.all_points();
    if points.len() < 3 {
        debug!(points = points.len(), "Too few detachment points to pad");
        return Ok(None);
    }

    let footprint = match limits.filter(|b| !b.is_degenerate_xy()) {
        Some(bounds) => GridArea::from_bounds(bounds),
        None => match Bounds3::from_points(&points) {
            Some(bounds) if !bounds.is_degenerate_xy() => GridArea::from_bounds(&bounds),
            _ => {
                debug!("Detachment footprint is degenerate");
                return Ok(None);
            }
        },
    };
    let area = footprint.expanded(params.detachment_pad_fraction);

    let plane_coefs = fit_height_plane(&points);

    let (ncol, nrow) = match spacing {
        Some(s) if s > 0.0 => (
            grid_dimension(area.width(), s),
            grid_dimension(area.height(), s),
        ),
        _ => {
            let (c, r) = engine.recommended_size(&points, &area);
            (c.max(2), r.max(2))
        }
    };

    debug!(
        points = points.len(),
        ncol,
        nrow,
        xmin = area.xmin,
        ymin = area.ymin,
        xmax = area.xmax,
        ymax = area.ymax,
        "Padding detachment"
    );

    let grid = engine.interpolate(&points, ncol, nrow, area)?;
    let mesh = engine.grid_to_trimesh(&grid, TriangulationScheme::Equilateral)?;

    Ok(Some(DetachmentPad {
        surface: Surface::from_mesh(DETACHMENT_ID, mesh),
        plane_coefs,
    }))
}

/// Collect the unique vertices of triangles that are not near horizontal.
///
/// Starts with a normal z cap of `max_z_normal` and relaxes it toward
/// `max_z_normal_cap` while fewer than three points qualify. Returns an
/// empty list when the surface never yields three points.
pub fn collect_dipping_points(mesh: &mut TriMesh, params: &PadParams) -> Vec<Point3<f64>> {
    let mut threshold = params.max_z_normal;
    for pass in 0..params.max_normal_iterations {
        let points = collect_pass(mesh, threshold);
        if points.len() >= 3 {
            trace!(pass, threshold, points = points.len(), "Collected dipping points");
            return points;
        }
        threshold = (threshold * params.z_normal_relax).min(params.max_z_normal_cap);
    }
    Vec::new()
}

fn collect_pass(mesh: &mut TriMesh, threshold: f64) -> Vec<Point3<f64>> {
    for node in &mut mesh.nodes {
        node.shifted = false;
    }

    let mut points = Vec::new();
    for t in 0..mesh.triangle_count() {
        let (Some(corners), Some(ids)) = (mesh.triangle_points(t), mesh.triangle_nodes(t)) else {
            continue;
        };
        if triangle_normal(&corners).z > threshold {
            continue;
        }
        for id in ids {
            let node = &mut mesh.nodes[id];
            if node.deleted || node.shifted {
                continue;
            }
            node.shifted = true;
            points.push(node.position);
        }
    }

    for node in &mut mesh.nodes {
        node.shifted = false;
    }
    points
}

/// Indices of the low anchor points.
///
/// Takes about one point in twenty, at most `max_low_points`, from those
/// at or below a z cutoff near the bottom of the point set. The cutoff
/// tightens as the set grows so the anchors stay near the base.
pub fn low_point_indices(points: &[Point3<f64>], max_low_points: usize) -> Vec<usize> {
    let Some((imin, zmin, zmax)) = points.iter().enumerate().fold(None, |acc, (i, p)| match acc {
        None => Some((i, p.z, p.z)),
        Some((imin, lo, hi)) => {
            let imin = if p.z < lo { i } else { imin };
            Some((imin, lo.min(p.z), hi.max(p.z)))
        }
    }) else {
        return Vec::new();
    };

    let mut maxlow = points.len() / 20;
    if maxlow < 1 {
        return vec![imin];
    }

    let mut zcpct = 10.0;
    if maxlow > max_low_points {
        zcpct = maxlow as f64 / 10.0;
        maxlow = max_low_points;
    }
    let zcpct = f64::min(zcpct, 100.0);
    let zcut = zmin + (zmax - zmin) / zcpct;

    points
        .iter()
        .enumerate()
        .filter(|(_, p)| p.z <= zcut)
        .map(|(i, _)| i)
        .take(maxlow)
        .collect()
}

/// Pad one fault.
///
/// Returns `Ok(None)` when the fault has fewer than three usable points.
/// The best-fit plane is computed once and cached on `fault`.
pub fn pad_fault<G: GridEngine + ?Sized>(
    fault: &mut Surface,
    limits: Option<&Bounds3>,
    spacing: Option<f64>,
    engine: &G,
    params: &PadParams,
) -> ConnectResult<Option<Surface>> {
    let points = collect_dipping_points(&mut fault.mesh, params);
    if points.len() < 3 {
        warn!(fault_id = fault.id, "Fault has too few dipping points to pad");
        return Ok(None);
    }

    let low = low_point_indices(&points, params.max_low_points);

    let plane = match fault.plane {
        Some(plane) => plane,
        None => {
            let mut fitter = PlaneFitter::new();
            fitter.add_points(&points);
            let plane = fitter.calc_plane()?;
            fault.plane = Some(plane);
            plane
        }
    };

    let spacing = spacing.or_else(|| fault.mesh.mean_edge_length_xy());

    debug!(
        fault_id = fault.id,
        points = points.len(),
        low_points = low.len(),
        spacing = spacing.unwrap_or(-1.0),
        "Padding fault"
    );

    let mesh = pad_fault_surface(&points, &low, limits, &plane, spacing, engine, params)?;

    let mut padded = Surface::from_mesh(fault.id, mesh);
    padded.plane = Some(plane);
    Ok(Some(padded))
}

/// Grid a near-planar fault in its plane frame and extend it toward its
/// low points.
///
/// Without low points the footprint grows by half its size on every side.
/// With low points the side nearer most of them is pushed out by the
/// footprint's dip extent (scaled up for long, short faults) and further if
/// needed to reach below `limits.min.z`.
pub fn pad_fault_surface<G: GridEngine + ?Sized>(
    points: &[Point3<f64>],
    low: &[usize],
    limits: Option<&Bounds3>,
    plane: &SurfacePlane,
    spacing: Option<f64>,
    engine: &G,
    params: &PadParams,
) -> ConnectResult<TriMesh> {
    let local: Vec<Point3<f64>> = points.iter().map(|p| plane.to_local(p)).collect();
    let bounds = Bounds3::from_points(&local)
        .ok_or_else(|| ConnectError::degenerate("fault has no points"))?;
    let mut area = GridArea::from_bounds(&bounds);
    if area.is_degenerate() {
        return Err(ConnectError::degenerate(
            "fault has no extent within its best-fit plane",
        ));
    }

    if low.is_empty() {
        area = area.expanded(0.5);
    } else {
        extend_toward_low_points(&mut area, &local, points, low, limits, plane, params);
    }

    let du = area.width();
    let dv = area.height();
    let spacing = spacing
        .filter(|s| s.is_finite() && *s > 0.0)
        .unwrap_or((du + dv) / 100.0);

    let max_dim = params.max_fault_grid_dimension;
    let ncol = (du / spacing) as usize;
    let mut nrow = (dv / spacing) as usize;
    let aspect = 2.0 * du / dv;
    if aspect > 1.0 {
        nrow = (nrow as f64 * aspect.sqrt()) as usize;
    }
    let ncol = ncol.clamp(2, max_dim);
    let nrow = nrow.clamp(2, max_dim);

    trace!(ncol, nrow, spacing, "Fault padding grid");

    let mut grid = engine.interpolate(&local, ncol, nrow, area)?;
    if points.len() > params.smooth_point_threshold {
        engine.smooth(&mut grid, 1)?;
    }
    let mut mesh = engine.grid_to_trimesh(&grid, TriangulationScheme::Equilateral)?;
    for node in &mut mesh.nodes {
        node.position = plane.to_world(&node.position);
    }
    Ok(mesh)
}

fn extend_toward_low_points(
    area: &mut GridArea,
    local: &[Point3<f64>],
    world: &[Point3<f64>],
    low: &[usize],
    limits: Option<&Bounds3>,
    plane: &SurfacePlane,
    params: &PadParams,
) {
    let (mut near_max, mut near_min) = (0usize, 0usize);
    for &i in low {
        let v = local[i].y;
        let to_max = area.ymax - v;
        let to_min = v - area.ymin;
        if to_max < to_min {
            near_max += 1;
        } else if to_min < to_max {
            near_min += 1;
        }
    }

    let direction = match near_max.cmp(&near_min) {
        std::cmp::Ordering::Greater => 1.0,
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => return,
    };

    let du = area.width();
    let dv = area.height();
    let mut extension = dv;
    if dv < du {
        extension *= (du / dv).sqrt();
    }

    if let Some(limits) = limits {
        let (_, dip) = plane.axes();
        let dz = dip.z * direction;
        if dz < -1e-6 {
            let zlow = low
                .iter()
                .map(|&i| world[i].z)
                .fold(f64::INFINITY, f64::min);
            let target = limits.min.z - params.depth_margin_fraction * limits.depth().max(dv);
            let needed = (zlow - target) / -dz;
            let cap = params.max_extension_factor * (du + dv);
            extension = extension.max(needed).min(cap);
        }
    }

    if direction > 0.0 {
        area.ymax += extension;
    } else {
        area.ymin -= extension;
    }
    trace!(extension, near_max, near_min, "Extended fault toward low points");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::IdwGridEngine;
    use crate::types::test_meshes::{flat_grid, vertical_panel};

    #[test]
    fn test_triangle_normal_points_up() {
        let down = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ];
        let n = triangle_normal(&down);
        assert!((n.z - 1.0).abs() < 1e-12);

        let degenerate = [Point3::origin(); 3];
        assert_eq!(triangle_normal(&degenerate), Vector3::z());
    }

    #[test]
    fn test_grid_dimension() {
        assert_eq!(grid_dimension(10.0, 1.0), 11);
        assert_eq!(grid_dimension(0.1, 1.0), 2);
    }

    #[test]
    fn test_low_point_indices_small_set() {
        let pts: Vec<Point3<f64>> = (0..10).map(|i| Point3::new(0.0, 0.0, 5.0 - i as f64)).collect();
        assert_eq!(low_point_indices(&pts, 100), vec![9]);
        assert!(low_point_indices(&[], 100).is_empty());
    }

    #[test]
    fn test_low_point_indices_capped() {
        // 4000 points: maxlow 200 capped to 100, cutoff at 1/20 of the range.
        let pts: Vec<Point3<f64>> = (0..4000).map(|i| Point3::new(0.0, 0.0, i as f64)).collect();
        let low = low_point_indices(&pts, 100);
        assert_eq!(low.len(), 100);
        assert!(low.iter().all(|&i| pts[i].z <= 3999.0 / 20.0));
    }

    #[test]
    fn test_low_point_indices_cutoff() {
        // 40 points: maxlow 2, cutoff at a tenth of the range.
        let pts: Vec<Point3<f64>> = (0..40).map(|i| Point3::new(0.0, 0.0, i as f64)).collect();
        assert_eq!(low_point_indices(&pts, 100), vec![0, 1]);
    }

    #[test]
    fn test_collect_dipping_points_skips_flat() {
        let mut flat = flat_grid(2, 1.0, 0.0);
        assert!(collect_dipping_points(&mut flat, &PadParams::default()).is_empty());

        let mut wall = vertical_panel(0.0, (0.0, 4.0), (0.0, 2.0), 2);
        let pts = collect_dipping_points(&mut wall, &PadParams::default());
        assert_eq!(pts.len(), 9);
        assert!(wall.nodes.iter().all(|n| !n.shifted));
    }

    #[test]
    fn test_pad_detachment_expands_footprint() {
        let surface = Surface::from_mesh(DETACHMENT_ID, flat_grid(4, 2.5, 1.0));
        let engine = IdwGridEngine::default();
        let pad = pad_detachment(&surface, None, Some(1.0), &engine, &PadParams::default())
            .unwrap()
            .unwrap();
        let b = pad.surface.mesh.bounds().unwrap();
        assert!((b.min.x + 0.1).abs() < 1e-9);
        assert!((b.max.y - 10.1).abs() < 1e-9);
        assert!((b.min.z - 1.0).abs() < 1e-9 && (b.max.z - 1.0).abs() < 1e-9);
        let coefs = pad.plane_coefs.unwrap();
        assert!((coefs[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pad_detachment_not_ready() {
        let engine = IdwGridEngine::default();
        let params = PadParams::default();
        let empty = Surface::from_points(DETACHMENT_ID, &[Point3::origin()]);
        assert!(pad_detachment(&empty, None, None, &engine, &params).unwrap().is_none());

        let line = Surface::from_points(
            DETACHMENT_ID,
            &[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
            ],
        );
        assert!(pad_detachment(&line, None, None, &engine, &params).unwrap().is_none());
    }

    #[test]
    fn test_pad_fault_extends_below_limits() {
        let engine = IdwGridEngine::default();
        let params = PadParams::default();
        let mut fault = Surface::from_mesh(4, vertical_panel(5.0, (2.0, 8.0), (1.0, 6.0), 4));
        let limits = Bounds3 {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(10.0, 10.0, 6.0),
        };

        let padded = pad_fault(&mut fault, Some(&limits), Some(1.0), &engine, &params)
            .unwrap()
            .unwrap();
        assert_eq!(padded.id, 4);
        assert!(padded.plane.is_some());
        assert_eq!(fault.plane, padded.plane);

        let b = padded.mesh.bounds().unwrap();
        assert!(b.min.z < 0.0, "padded fault should reach below z=0, got {}", b.min.z);
        assert!((b.min.x - 5.0).abs() < 1e-6 && (b.max.x - 5.0).abs() < 1e-6);
        // Strike extent is kept when anchored by low points.
        assert!((b.min.y - 2.0).abs() < 1e-6 && (b.max.y - 8.0).abs() < 1e-6);
        // Top is not extended.
        assert!((b.max.z - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_pad_fault_flat_is_not_ready() {
        let engine = IdwGridEngine::default();
        let mut fault = Surface::from_mesh(1, flat_grid(2, 1.0, 0.0));
        let out = pad_fault(&mut fault, None, None, &engine, &PadParams::default()).unwrap();
        assert!(out.is_none());
        assert!(fault.plane.is_none());
    }

    #[test]
    fn test_pad_fault_surface_without_low_points_expands() {
        let engine = IdwGridEngine::default();
        let mut fitter = PlaneFitter::new();
        let wall = vertical_panel(0.0, (0.0, 4.0), (0.0, 4.0), 2);
        fitter.add_tri_mesh(&wall);
        let plane = fitter.calc_plane().unwrap();
        let pts: Vec<Point3<f64>> = wall.live_positions().copied().collect();

        let mesh =
            pad_fault_surface(&pts, &[], None, &plane, Some(1.0), &engine, &PadParams::default())
                .unwrap();
        let b = mesh.bounds().unwrap();
        assert!((b.min.y + 2.0).abs() < 1e-6 && (b.max.y - 6.0).abs() < 1e-6);
        assert!((b.min.z + 2.0).abs() < 1e-6 && (b.max.z - 6.0).abs() < 1e-6);
    }
}
