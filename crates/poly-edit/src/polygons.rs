//! Packed polygon sets.
//!
//! A polygon set is stored the way boundary data is exchanged: flat `x`,
//! `y` and tag arrays plus two count arrays. `points_per_component` gives
//! the length of each ring in order; `components_per_polygon` groups
//! consecutive rings into polygons. Rings are closed, so the last point of
//! each ring repeats the first.

use serde::{Deserialize, Serialize};

use crate::error::{PolyEditError, PolyEditResult};

/// A point carrying an opaque caller tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedPoint<T> {
    pub x: f64,
    pub y: f64,
    pub tag: T,
}

impl<T> TaggedPoint<T> {
    pub fn new(x: f64, y: f64, tag: T) -> Self {
        Self { x, y, tag }
    }
}

/// Polygons packed into flat arrays.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PackedPolygons<T> {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub tags: Vec<T>,
    pub components_per_polygon: Vec<usize>,
    pub points_per_component: Vec<usize>,
}

impl<T: Clone> PackedPolygons<T> {
    /// Empty set.
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            tags: Vec::new(),
            components_per_polygon: Vec::new(),
            points_per_component: Vec::new(),
        }
    }

    /// Build from nested rings: polygons, each a list of rings.
    ///
    /// Rings are stored as given; they are not closed here.
    pub fn from_rings(polygons: Vec<Vec<Vec<TaggedPoint<T>>>>) -> Self {
        let mut out = Self::new();
        for polygon in polygons {
            out.components_per_polygon.push(polygon.len());
            for ring in polygon {
                out.points_per_component.push(ring.len());
                for p in ring {
                    out.x.push(p.x);
                    out.y.push(p.y);
                    out.tags.push(p.tag);
                }
            }
        }
        out
    }

    /// Unpack into nested rings.
    pub fn to_rings(&self) -> PolyEditResult<Vec<Vec<Vec<TaggedPoint<T>>>>> {
        self.validate()?;
        let mut out = Vec::with_capacity(self.components_per_polygon.len());
        let mut comp = 0;
        let mut start = 0;
        for &ncomp in &self.components_per_polygon {
            let mut polygon = Vec::with_capacity(ncomp);
            for &npts in &self.points_per_component[comp..comp + ncomp] {
                let ring = (start..start + npts)
                    .map(|i| TaggedPoint::new(self.x[i], self.y[i], self.tags[i].clone()))
                    .collect();
                polygon.push(ring);
                start += npts;
            }
            comp += ncomp;
            out.push(polygon);
        }
        Ok(out)
    }

    /// Coordinate slices of every ring, grouped by polygon.
    ///
    /// Assumes the counts have been validated.
    pub fn polygon_rings(&self) -> Vec<Vec<(&[f64], &[f64])>> {
        let mut out = Vec::with_capacity(self.components_per_polygon.len());
        let mut counts = self.points_per_component.iter();
        let mut start = 0;
        for &ncomp in &self.components_per_polygon {
            let rings = counts
                .by_ref()
                .take(ncomp)
                .map(|&npts| {
                    let range = start..start + npts;
                    start += npts;
                    (&self.x[range.clone()], &self.y[range])
                })
                .collect();
            out.push(rings);
        }
        out
    }

    /// Check that the arrays and counts agree.
    pub fn validate(&self) -> PolyEditResult<()> {
        let n = self.x.len();
        if self.y.len() != n || self.tags.len() != n {
            return Err(PolyEditError::invalid_input(format!(
                "{} x values, {} y values, {} tags",
                n,
                self.y.len(),
                self.tags.len()
            )));
        }
        let components: usize = self.components_per_polygon.iter().sum();
        if components != self.points_per_component.len() {
            return Err(PolyEditError::invalid_input(format!(
                "components_per_polygon sums to {}, but {} component counts were given",
                components,
                self.points_per_component.len()
            )));
        }
        let points: usize = self.points_per_component.iter().sum();
        if points != n {
            return Err(PolyEditError::invalid_input(format!(
                "points_per_component sums to {}, but {} points were given",
                points, n
            )));
        }
        if let Some(i) = self
            .x
            .iter()
            .zip(&self.y)
            .position(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(PolyEditError::invalid_input(format!(
                "point {} has a non-finite coordinate",
                i
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.x.len()
    }

    #[inline]
    pub fn component_count(&self) -> usize {
        self.points_per_component.len()
    }

    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.components_per_polygon.len()
    }

    /// Plan-view bounding box as `(xmin, ymin, xmax, ymax)`.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        if self.x.is_empty() {
            return None;
        }
        let mut b = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (&x, &y) in self.x.iter().zip(&self.y) {
            b.0 = b.0.min(x);
            b.1 = b.1.min(y);
            b.2 = b.2.max(x);
            b.3 = b.3.max(y);
        }
        Some(b)
    }

    /// Distance under which two points are treated as the same point.
    ///
    /// Proportional to the bounding box: `(width + height) / 200000`.
    pub fn same_point_distance(&self) -> f64 {
        match self.bounds() {
            Some((xmin, ymin, xmax, ymax)) => (xmax - xmin + ymax - ymin) / 200_000.0,
            None => 0.0,
        }
    }
}

/// Capacity of the union output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLimits {
    pub max_points: usize,
    pub max_components: usize,
}

impl OutputLimits {
    pub fn new(max_points: usize, max_components: usize) -> Self {
        Self {
            max_points,
            max_components,
        }
    }

    /// No limit on either count.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX, usize::MAX)
    }

    /// Error if `polygons` does not fit.
    pub fn check<T>(&self, polygons: &PackedPolygons<T>) -> PolyEditResult<()> {
        if polygons.x.len() > self.max_points {
            return Err(PolyEditError::CapacityExceeded {
                what: "points",
                needed: polygons.x.len(),
                limit: self.max_points,
            });
        }
        if polygons.points_per_component.len() > self.max_components {
            return Err(PolyEditError::CapacityExceeded {
                what: "components",
                needed: polygons.points_per_component.len(),
                limit: self.max_components,
            });
        }
        Ok(())
    }
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self::unbounded()
    }
}


#[cfg(test)]
mod tests {
    use super::test_polygons::*;
    use super::*;

    #[test]
    fn test_from_rings_counts() {
        let polys = PackedPolygons::from_rings(vec![
            vec![square(0.0, 0.0, 10.0), square(2.0, 2.0, 2.0)],
            vec![square(20.0, 0.0, 5.0)],
        ]);
        assert_eq!(polys.polygon_count(), 2);
        assert_eq!(polys.component_count(), 3);
        assert_eq!(polys.point_count(), 15);
        assert_eq!(polys.components_per_polygon, vec![2, 1]);
        assert_eq!(polys.points_per_component, vec![5, 5, 5]);
        assert!(polys.validate().is_ok());

        let rings = polys.to_rings().unwrap();
        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0][1][0], TaggedPoint::new(2.0, 2.0, 0));
        assert_eq!(rings[1][0][2], TaggedPoint::new(25.0, 5.0, 2));
    }

    #[test]
    fn test_validate_rejects_bad_counts() {
        let mut polys = unit_square(10.0);
        polys.points_per_component[0] = 4;
        assert!(polys.validate().is_err());

        let mut polys = unit_square(10.0);
        polys.components_per_polygon[0] = 2;
        assert!(polys.validate().is_err());

        let mut polys = unit_square(10.0);
        polys.tags.pop();
        assert!(polys.validate().is_err());

        let mut polys = unit_square(10.0);
        polys.y[2] = f64::NAN;
        assert!(polys.validate().is_err());
    }

    #[test]
    fn test_same_point_distance() {
        let polys = unit_square(10.0);
        assert!((polys.same_point_distance() - 1e-4).abs() < 1e-15);
        assert_eq!(PackedPolygons::<u32>::new().same_point_distance(), 0.0);
    }

    #[test]
    fn test_limits() {
        let polys = unit_square(10.0);
        assert!(OutputLimits::new(5, 1).check(&polys).is_ok());
        let err = OutputLimits::new(4, 1).check(&polys).unwrap_err();
        assert!(err.to_string().contains("points"));
        let err = OutputLimits::new(10, 0).check(&polys).unwrap_err();
        assert!(err.to_string().contains("components"));
    }
}
