//! Boundary edits: point insertion and tie lines.

use tracing::{debug, info, info_span, trace};

use crate::boundary::BoundaryList;
use crate::error::PolyEditResult;
use crate::geometry::{
    distance_sq, perpendicular_distance_sq, point_in_polygon, same_point, segment_intersection,
};
use crate::polygons::{OutputLimits, PackedPolygons, TaggedPoint};
use crate::union::{ComponentUnion, RingRepairUnion};

/// Result of a boundary edit.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome<T> {
    /// The re-united polygons.
    pub polygons: PackedPolygons<T>,
    /// Points linked into a ring.
    pub inserted: usize,
    /// Points left out, either coincident with a vertex or with no edge to join.
    pub skipped: usize,
}

impl<T> EditOutcome<T> {
    /// True when the edit changed no ring.
    pub fn is_unchanged(&self) -> bool {
        self.inserted == 0
    }
}

/// Boundary editor over a pluggable union step.
#[derive(Debug, Clone, Default)]
pub struct PolyEdit<U = RingRepairUnion> {
    union: U,
}

impl PolyEdit<RingRepairUnion> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<U> PolyEdit<U> {
    /// Use a custom union step.
    pub fn with_union(union: U) -> Self {
        Self { union }
    }

    pub fn union(&self) -> &U {
        &self.union
    }

    /// Insert each point into the ring edge it lies closest to.
    ///
    /// A point within [`PackedPolygons::same_point_distance`] of an existing
    /// vertex is skipped, as is one whose perpendicular foot falls outside
    /// every edge. Points are inserted in order, so later points see earlier
    /// insertions.
    pub fn add_points_to_boundary<T: Clone>(
        &self,
        polys: &PackedPolygons<T>,
        points: &[TaggedPoint<T>],
        limits: &OutputLimits,
    ) -> PolyEditResult<EditOutcome<T>>
    where
        U: ComponentUnion<T>,
    {
        let _span = info_span!("add_points_to_boundary", points = points.len()).entered();
        polys.validate()?;

        let tolerance = polys.same_point_distance();
        let mut list = BoundaryList::from_packed(polys);
        let mut inserted = 0;
        for p in points {
            if split_closest_edge(&mut list, p, tolerance) {
                inserted += 1;
            }
        }
        let skipped = points.len() - inserted;

        let polygons = self.union.union_components(&list.to_packed(), limits)?;
        info!(inserted, skipped, "Added points to boundary");
        Ok(EditOutcome {
            polygons,
            inserted,
            skipped,
        })
    }

    /// Extend the boundary so it reaches both ends of a tie line.
    ///
    /// When both endpoints are already inside a polygon the input comes back
    /// unchanged and no union is run. Otherwise each outside endpoint is
    /// linked into the edge whose crossing with the tie line is nearest to
    /// it. An outside endpoint whose tie line crosses no edge is skipped.
    pub fn add_tie_line_to_boundary<T: Clone>(
        &self,
        polys: &PackedPolygons<T>,
        start: TaggedPoint<T>,
        end: TaggedPoint<T>,
        limits: &OutputLimits,
    ) -> PolyEditResult<EditOutcome<T>>
    where
        U: ComponentUnion<T>,
    {
        let _span = info_span!("add_tie_line_to_boundary").entered();
        polys.validate()?;

        let p1 = (start.x, start.y);
        let p2 = (end.x, end.y);
        let rings = polys.polygon_rings();
        let inside = |p: (f64, f64)| rings.iter().any(|poly| point_in_polygon(p, poly.iter().copied()));
        let (inside1, inside2) = (inside(p1), inside(p2));
        debug!(inside1, inside2, "Classified tie line endpoints");

        if inside1 && inside2 {
            return Ok(EditOutcome {
                polygons: polys.clone(),
                inserted: 0,
                skipped: 0,
            });
        }

        let tolerance = polys.same_point_distance();
        let mut list = BoundaryList::from_packed(polys);
        mark_crossed_edges(&mut list, p1, p2, tolerance);

        let mut inserted = 0;
        let mut skipped = 0;
        for (p, is_inside) in [(start, inside1), (end, inside2)] {
            if is_inside {
                continue;
            }
            match closest_crossing(&list, (p.x, p.y)) {
                Some(node) => {
                    trace!(node, x = p.x, y = p.y, "Linking tie line endpoint");
                    list.split_after(node, p.x, p.y, p.tag);
                    inserted += 1;
                }
                None => skipped += 1,
            }
        }

        let polygons = self.union.union_components(&list.to_packed(), limits)?;
        info!(inserted, skipped, "Added tie line to boundary");
        Ok(EditOutcome {
            polygons,
            inserted,
            skipped,
        })
    }

    /// Run only the union step.
    pub fn union_components<T: Clone>(
        &self,
        polys: &PackedPolygons<T>,
        limits: &OutputLimits,
    ) -> PolyEditResult<PackedPolygons<T>>
    where
        U: ComponentUnion<T>,
    {
        self.union.union_components(polys, limits)
    }
}

/// Split the edge nearest `p` by perpendicular distance. False if skipped.
fn split_closest_edge<T: Clone>(
    list: &mut BoundaryList<T>,
    p: &TaggedPoint<T>,
    tolerance: f64,
) -> bool {
    let target = (p.x, p.y);
    if (0..list.len()).any(|id| same_point(list.node(id).point(), target, tolerance)) {
        trace!(x = p.x, y = p.y, "Point coincides with a vertex");
        return false;
    }

    let mut best: Option<(usize, f64)> = None;
    for (a, b) in list.edges() {
        let Some(d) = perpendicular_distance_sq(list.node(a).point(), list.node(b).point(), target)
        else {
            continue;
        };
        if best.is_none_or(|(_, dmin)| d < dmin) {
            best = Some((a, d));
        }
    }

    match best {
        Some((a, _)) => {
            list.split_after(a, p.x, p.y, p.tag.clone());
            true
        }
        None => {
            trace!(x = p.x, y = p.y, "No edge has a perpendicular foot for point");
            false
        }
    }
}

/// Record where the tie line `p1`-`p2` crosses each edge.
///
/// A crossing at an edge's end vertex belongs to the following edge.
fn mark_crossed_edges<T: Clone>(
    list: &mut BoundaryList<T>,
    p1: (f64, f64),
    p2: (f64, f64),
    tolerance: f64,
) {
    let edges: Vec<(usize, usize)> = list.edges().collect();
    let mut marked = 0;
    for (a, b) in edges {
        let end = list.node(b).point();
        let Some(at) = segment_intersection(list.node(a).point(), end, p1, p2) else {
            continue;
        };
        let owner = if same_point(at, end, tolerance) { b } else { a };
        list.mark_crossing(owner, at);
        marked += 1;
    }
    debug!(marked, "Marked edges crossed by tie line");
}

/// Marked edge whose crossing is nearest `p`.
fn closest_crossing<T: Clone>(list: &BoundaryList<T>, p: (f64, f64)) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (id, at) in list.crossings() {
        let d = distance_sq(at, p);
        if best.is_none_or(|(_, dmin)| d < dmin) {
            best = Some((id, d));
        }
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polygons::test_polygons::*;

    fn ring_points(out: &PackedPolygons<u32>) -> Vec<(f64, f64)> {
        out.x.iter().copied().zip(out.y.iter().copied()).collect()
    }

    #[test]
    fn test_point_goes_to_nearest_edge() {
        let polys = unit_square(10.0);
        let out = PolyEdit::new()
            .add_points_to_boundary(
                &polys,
                &[TaggedPoint::new(9.0, 5.0, 50)],
                &OutputLimits::unbounded(),
            )
            .unwrap();
        assert_eq!(out.inserted, 1);
        assert_eq!(out.skipped, 0);
        assert_eq!(
            ring_points(&out.polygons),
            vec![(0.0, 0.0), (10.0, 0.0), (9.0, 5.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]
        );
        assert_eq!(out.polygons.tags[2], 50);
    }

    #[test]
    fn test_coincident_point_skipped() {
        let polys = unit_square(10.0);
        let out = PolyEdit::new()
            .add_points_to_boundary(
                &polys,
                &[TaggedPoint::new(10.0, 0.00001, 7)],
                &OutputLimits::unbounded(),
            )
            .unwrap();
        assert_eq!(out.inserted, 0);
        assert_eq!(out.skipped, 1);
        assert_eq!(out.polygons.point_count(), polys.point_count());
    }

    #[test]
    fn test_point_without_foot_skipped() {
        // Beyond a corner, every perpendicular foot misses its edge.
        let polys = unit_square(10.0);
        let out = PolyEdit::new()
            .add_points_to_boundary(
                &polys,
                &[TaggedPoint::new(12.0, -3.0, 7)],
                &OutputLimits::unbounded(),
            )
            .unwrap();
        assert_eq!(out.skipped, 1);
        assert!(out.is_unchanged());
    }

    #[test]
    fn test_later_points_see_earlier_inserts() {
        let polys = unit_square(10.0);
        let out = PolyEdit::new()
            .add_points_to_boundary(
                &polys,
                &[TaggedPoint::new(5.0, 1.0, 1), TaggedPoint::new(5.0, 1.0, 2)],
                &OutputLimits::unbounded(),
            )
            .unwrap();
        assert_eq!(out.inserted, 1);
        assert_eq!(out.skipped, 1);
        assert_eq!(out.polygons.point_count(), 6);
    }

    #[test]
    fn test_tie_line_inside_is_identity() {
        let polys = unit_square(10.0);
        let out = PolyEdit::new()
            .add_tie_line_to_boundary(
                &polys,
                TaggedPoint::new(2.0, 2.0, 1),
                TaggedPoint::new(8.0, 7.0, 2),
                &OutputLimits::new(0, 0),
            )
            .unwrap();
        assert_eq!(out.polygons, polys);
        assert!(out.is_unchanged());
    }

    #[test]
    fn test_tie_line_one_end_outside() {
        let polys = unit_square(10.0);
        let out = PolyEdit::new()
            .add_tie_line_to_boundary(
                &polys,
                TaggedPoint::new(5.0, 5.0, 1),
                TaggedPoint::new(15.0, 5.0, 2),
                &OutputLimits::unbounded(),
            )
            .unwrap();
        assert_eq!(out.inserted, 1);
        assert_eq!(
            ring_points(&out.polygons),
            vec![(0.0, 0.0), (10.0, 0.0), (15.0, 5.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]
        );
    }

    #[test]
    fn test_tie_line_through_polygon() {
        let polys = unit_square(10.0);
        let out = PolyEdit::new()
            .add_tie_line_to_boundary(
                &polys,
                TaggedPoint::new(-5.0, 5.0, 1),
                TaggedPoint::new(15.0, 5.0, 2),
                &OutputLimits::unbounded(),
            )
            .unwrap();
        assert_eq!(out.inserted, 2);
        assert_eq!(
            ring_points(&out.polygons),
            vec![
                (0.0, 0.0),
                (10.0, 0.0),
                (15.0, 5.0),
                (10.0, 10.0),
                (0.0, 10.0),
                (-5.0, 5.0),
                (0.0, 0.0)
            ]
        );
    }

    #[test]
    fn test_crossing_at_vertex_uses_following_edge() {
        // Tie line passes exactly through corner (10, 10).
        let polys = unit_square(10.0);
        let mut list = BoundaryList::from_packed(&polys);
        mark_crossed_edges(&mut list, (5.0, 15.0), (15.0, 5.0), polys.same_point_distance());
        let marked: Vec<usize> = list.crossings().map(|(id, _)| id).collect();
        // Edge 1-2 ends at the corner, so only edge 2-3 carries it.
        assert_eq!(marked, vec![2]);
    }

    #[test]
    fn test_tie_line_missing_boundary() {
        let polys = unit_square(10.0);
        let out = PolyEdit::new()
            .add_tie_line_to_boundary(
                &polys,
                TaggedPoint::new(20.0, 0.0, 1),
                TaggedPoint::new(20.0, 10.0, 2),
                &OutputLimits::unbounded(),
            )
            .unwrap();
        assert_eq!(out.inserted, 0);
        assert_eq!(out.skipped, 2);
        assert_eq!(out.polygons, polys);
    }

    #[test]
    fn test_invalid_input_rejected() {
        let mut polys = unit_square(10.0);
        polys.points_per_component[0] = 9;
        assert!(
            PolyEdit::new()
                .add_points_to_boundary(&polys, &[], &OutputLimits::unbounded())
                .is_err()
        );
    }
}
