//! Detachment interpolated between two bracketing surfaces.
//!
//! Both brackets are sampled on a common grid, averaged, then smoothed
//! with decreasing strength until the result stays strictly between them.
//! The surface is finally biased toward whichever bracket is closer in age.

use tracing::{debug, info, warn};

use crate::error::{ConnectError, ConnectResult};
use crate::grid::{GridArea, GridEngine, TriangulationScheme};
use crate::padding::grid_dimension;
use crate::params::{BracketParams, EDGE_LENGTH_CORRECTION};
use crate::types::{Bounds3, TriMesh};

/// Ages of the two brackets and of the surface to interpolate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeBracket {
    /// Age of the lower (older, deeper) surface.
    pub lower_age: f64,
    /// Age of the upper (younger) surface.
    pub upper_age: f64,
    pub age: f64,
}

impl AgeBracket {
    pub fn new(lower_age: f64, upper_age: f64, age: f64) -> Self {
        Self {
            lower_age,
            upper_age,
            age,
        }
    }

    /// Position of `age` between the brackets: 0 at the upper surface, 1 at
    /// the lower. One half when the ages do not increase downward.
    pub fn fraction(&self) -> f64 {
        if self.lower_age > self.upper_age {
            ((self.age - self.upper_age) / (self.lower_age - self.upper_age)).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }
}

/// Build the interpolated detachment.
///
/// Returns `Ok(None)` when no smoothed surface fits between the brackets
/// within `max_smooth_passes`. Edge lengths are cached on both brackets as
/// a side effect.
pub fn interpolate_detachment<G: GridEngine + ?Sized>(
    lower: &mut TriMesh,
    upper: &mut TriMesh,
    ages: AgeBracket,
    engine: &G,
    params: &BracketParams,
) -> ConnectResult<Option<TriMesh>> {
    let (sum_lower, n_lower) = lower.cached_edge_length_sum();
    let (sum_upper, n_upper) = upper.cached_edge_length_sum();
    let count = n_lower + n_upper;
    let sum = sum_lower + sum_upper;
    if count == 0 || sum <= 0.0 {
        return Err(ConnectError::degenerate("bracketing surfaces have no edges"));
    }
    let spacing = sum / count as f64 / EDGE_LENGTH_CORRECTION;

    let bounds = match (lower.bounds(), upper.bounds()) {
        (Some(a), Some(b)) => a.union(&b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => return Err(ConnectError::degenerate("bracketing surfaces are empty")),
    };
    let area = bracket_area(&bounds)?;
    let ncol = grid_dimension(area.width(), spacing);
    let nrow = grid_dimension(area.height(), spacing);
    debug!(spacing, ncol, nrow, "Gridding bracketing surfaces");

    let mut low = engine.trimesh_to_grid(lower, ncol, nrow, area)?;
    engine.fill_nulls(&mut low)?;
    let mut high = engine.trimesh_to_grid(upper, ncol, nrow, area)?;
    engine.fill_nulls(&mut high)?;

    let mut out = low.clone();
    for (o, (a, b)) in out
        .values
        .iter_mut()
        .zip(low.values.iter().zip(high.values.iter()))
    {
        *o = (a + b) / 2.0;
    }

    let mut settled = false;
    for pass in 0..params.max_smooth_passes {
        engine.smooth(&mut out, params.max_smooth_passes - pass)?;
        let clamped = clamp_between(&mut out.values, &low.values, &high.values, params);
        debug!(pass, clamped, "Smoothed interpolated detachment");
        if clamped == 0 {
            settled = true;
            break;
        }
    }
    if !settled {
        warn!(
            passes = params.max_smooth_passes,
            "No smooth surface fits between the brackets"
        );
        return Ok(None);
    }

    let fraction = ages.fraction();
    let shift = bias_shift(&out.values, &low.values, &high.values, fraction, params);
    if shift != 0.0 {
        for v in &mut out.values {
            *v += shift;
        }
    }
    info!(fraction, shift, "Interpolated detachment between brackets");

    let mesh = engine.grid_to_trimesh(&out, TriangulationScheme::Equilateral)?;
    Ok(Some(mesh))
}

fn bracket_area(bounds: &Bounds3) -> ConnectResult<GridArea> {
    let area = GridArea::from_bounds(bounds);
    if area.is_degenerate() {
        return Err(ConnectError::degenerate(format!(
            "bracketing surfaces span {:.3} x {:.3} in plan view",
            area.width(),
            area.height()
        )));
    }
    Ok(area)
}

/// Pull cells within `clamp_fraction` of either bracket back inside.
/// Returns the number of cells moved.
fn clamp_between(out: &mut [f64], low: &[f64], high: &[f64], params: &BracketParams) -> usize {
    let mut moved = 0;
    for (o, (&a, &b)) in out.iter_mut().zip(low.iter().zip(high.iter())) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let tiny = (hi - lo) * params.clamp_fraction;
        if *o < lo + tiny {
            *o = lo + tiny;
            moved += 1;
        } else if *o > hi - tiny {
            *o = hi - tiny;
            moved += 1;
        }
    }
    moved
}

/// Vertical bias toward the bracket nearer in age.
fn bias_shift(out: &[f64], low: &[f64], high: &[f64], fraction: f64, params: &BracketParams) -> f64 {
    let deadband = params.age_fraction_deadband;
    if fraction < 0.5 - deadband {
        let gap = out
            .iter()
            .zip(high)
            .map(|(o, h)| h - o)
            .fold(f64::INFINITY, f64::min);
        gap * params.shift_factor * (0.5 - fraction)
    } else if fraction > 0.5 + deadband {
        let gap = out
            .iter()
            .zip(low)
            .map(|(o, l)| o - l)
            .fold(f64::INFINITY, f64::min);
        -gap * params.shift_factor * (fraction - 0.5)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::IdwGridEngine;
    use crate::types::test_meshes::flat_grid;

    #[test]
    fn test_fraction() {
        assert_eq!(AgeBracket::new(100.0, 50.0, 75.0).fraction(), 0.5);
        assert_eq!(AgeBracket::new(100.0, 50.0, 60.0).fraction(), 0.2);
        assert_eq!(AgeBracket::new(100.0, 50.0, 10.0).fraction(), 0.0);
        assert_eq!(AgeBracket::new(100.0, 50.0, 500.0).fraction(), 1.0);
        assert_eq!(AgeBracket::new(10.0, 50.0, 20.0).fraction(), 0.5);
    }

    #[test]
    fn test_clamp_between() {
        let params = BracketParams::default();
        let low = [0.0, 0.0, 0.0];
        let high = [10.0, 10.0, 10.0];
        let mut out = [-1.0, 5.0, 9.95];
        assert_eq!(clamp_between(&mut out, &low, &high, &params), 2);
        assert!((out[0] - 0.1).abs() < 1e-12);
        assert_eq!(out[1], 5.0);
        assert!((out[2] - 9.9).abs() < 1e-12);
        assert_eq!(clamp_between(&mut out, &low, &high, &params), 0);
    }

    #[test]
    fn test_bias_shift() {
        let params = BracketParams::default();
        let low = [0.0, 0.0];
        let high = [10.0, 8.0];
        let out = [5.0, 4.0];
        // Toward the top: min gap to upper is 4.
        let up = bias_shift(&out, &low, &high, 0.0, &params);
        assert!((up - 4.0 * 1.8 * 0.5).abs() < 1e-12);
        // Toward the bottom: min gap to lower is 4.
        let down = bias_shift(&out, &low, &high, 1.0, &params);
        assert!((down + 4.0 * 1.8 * 0.5).abs() < 1e-12);
        assert_eq!(bias_shift(&out, &low, &high, 0.505, &params), 0.0);
    }

    #[test]
    fn test_interpolate_midway() {
        let mut lower = flat_grid(4, 2.5, 0.0);
        let mut upper = flat_grid(4, 2.5, 10.0);
        let engine = IdwGridEngine::default();
        let mesh = interpolate_detachment(
            &mut lower,
            &mut upper,
            AgeBracket::new(200.0, 100.0, 150.0),
            &engine,
            &BracketParams::default(),
        )
        .unwrap()
        .unwrap();

        let b = mesh.bounds().unwrap();
        assert!((b.min.z - 5.0).abs() < 1e-9);
        assert!((b.max.z - 5.0).abs() < 1e-9);
        assert!(b.min.x.abs() < 1e-9 && (b.max.x - 10.0).abs() < 1e-9);
        // Edge lengths were cached on the inputs.
        assert!(lower.edges.iter().all(|e| e.length > 0.0));
    }

    #[test]
    fn test_interpolate_biased_toward_upper() {
        let mut lower = flat_grid(4, 2.5, 0.0);
        let mut upper = flat_grid(4, 2.5, 10.0);
        let mesh = interpolate_detachment(
            &mut lower,
            &mut upper,
            AgeBracket::new(200.0, 100.0, 100.0),
            &IdwGridEngine::default(),
            &BracketParams::default(),
        )
        .unwrap()
        .unwrap();
        let b = mesh.bounds().unwrap();
        // 5 + 5 * 1.8 * 0.5
        assert!((b.min.z - 9.5).abs() < 1e-9);
        assert!(b.max.z < 10.0);
    }

    #[test]
    fn test_degenerate_brackets() {
        let mut lower = TriMesh::new();
        let mut upper = TriMesh::new();
        let err = interpolate_detachment(
            &mut lower,
            &mut upper,
            AgeBracket::new(2.0, 1.0, 1.5),
            &IdwGridEngine::default(),
            &BracketParams::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::DegenerateGeometry);
    }
}
