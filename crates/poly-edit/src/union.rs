//! Re-union of edited rings.

use tracing::debug;

use crate::error::PolyEditResult;
use crate::polygons::{OutputLimits, PackedPolygons};

/// Rebuilds a consistent polygon set from edited rings.
///
/// Implementations must return closed rings and respect `limits`, failing
/// with [`PolyEditError::CapacityExceeded`](crate::PolyEditError::CapacityExceeded)
/// when the result does not fit.
pub trait ComponentUnion<T> {
    fn union_components(
        &self,
        input: &PackedPolygons<T>,
        limits: &OutputLimits,
    ) -> PolyEditResult<PackedPolygons<T>>;
}

/// Default union: cleans each ring without merging rings.
///
/// Consecutive duplicate vertices are collapsed, open rings are closed and
/// rings with fewer than three distinct vertices are dropped, together
/// with any polygon left without rings.
#[derive(Debug, Clone, Copy, Default)]
pub struct RingRepairUnion {
    /// Vertices closer than this are duplicates.
    pub tolerance: f64,
}

impl RingRepairUnion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Self { tolerance }
    }

    fn duplicate(&self, a: (f64, f64), b: (f64, f64)) -> bool {
        let dx = a.0 - b.0;
        let dy = a.1 - b.1;
        dx * dx + dy * dy <= self.tolerance * self.tolerance
    }
}

impl<T: Clone> ComponentUnion<T> for RingRepairUnion {
    fn union_components(
        &self,
        input: &PackedPolygons<T>,
        limits: &OutputLimits,
    ) -> PolyEditResult<PackedPolygons<T>> {
        input.validate()?;

        let mut out = PackedPolygons::new();
        let mut dropped = 0usize;
        let mut counts = input.points_per_component.iter();
        let mut start = 0;

        for &ncomp in &input.components_per_polygon {
            let mut kept = 0;
            for &npts in counts.by_ref().take(ncomp) {
                let mut ring: Vec<usize> = Vec::with_capacity(npts + 1);
                for i in start..start + npts {
                    let p = (input.x[i], input.y[i]);
                    let repeat = ring
                        .last()
                        .is_some_and(|&j| self.duplicate((input.x[j], input.y[j]), p));
                    if !repeat {
                        ring.push(i);
                    }
                }
                start += npts;

                // Distinct vertices, ignoring the closing repeat.
                let mut distinct = ring.len();
                if let (Some(&first), Some(&last)) = (ring.first(), ring.last()) {
                    if ring.len() > 1
                        && self.duplicate((input.x[first], input.y[first]), (input.x[last], input.y[last]))
                    {
                        distinct -= 1;
                    } else {
                        ring.push(first);
                    }
                }
                if distinct < 3 {
                    dropped += 1;
                    continue;
                }

                for &i in &ring {
                    out.x.push(input.x[i]);
                    out.y.push(input.y[i]);
                    out.tags.push(input.tags[i].clone());
                }
                out.points_per_component.push(ring.len());
                kept += 1;
            }
            if kept > 0 {
                out.components_per_polygon.push(kept);
            }
        }

        debug!(
            polygons = out.polygon_count(),
            components = out.component_count(),
            points = out.point_count(),
            dropped,
            "Re-united components"
        );
        limits.check(&out)?;
        Ok(out)
    }
}
