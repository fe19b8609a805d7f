//! Plan-view primitives used by the boundary edits.

/// Tolerance on segment parameters when testing for a crossing.
const PARAM_EPS: f64 = 1e-12;

/// True when `a` and `b` are within `tolerance` of each other.
#[inline]
pub fn same_point(a: (f64, f64), b: (f64, f64), tolerance: f64) -> bool {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    dx * dx + dy * dy <= tolerance * tolerance
}

/// Squared distance between two points.
#[inline]
pub fn distance_sq(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    dx * dx + dy * dy
}

/// Squared perpendicular distance from `p` to segment `a`-`b`.
///
/// `None` when the foot of the perpendicular falls outside the segment or
/// the segment has zero length.
pub fn perpendicular_distance_sq(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> Option<f64> {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= 0.0 {
        return None;
    }
    let t = ((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let foot = (a.0 + t * dx, a.1 + t * dy);
    Some(distance_sq(foot, p))
}

/// Crossing point of segments `p1`-`p2` and `q1`-`q2`, endpoints included.
///
/// Parallel and collinear segments report no crossing.
pub fn segment_intersection(
    p1: (f64, f64),
    p2: (f64, f64),
    q1: (f64, f64),
    q2: (f64, f64),
) -> Option<(f64, f64)> {
    let d1 = (p2.0 - p1.0, p2.1 - p1.1);
    let d2 = (q2.0 - q1.0, q2.1 - q1.1);
    let denom = d1.0 * d2.1 - d1.1 * d2.0;
    let scale = (d1.0.abs() + d1.1.abs()) * (d2.0.abs() + d2.1.abs());
    if scale <= 0.0 || denom.abs() <= scale * 1e-14 {
        return None;
    }
    let w = (q1.0 - p1.0, q1.1 - p1.1);
    let t = (w.0 * d2.1 - w.1 * d2.0) / denom;
    let u = (w.0 * d1.1 - w.1 * d1.0) / denom;
    let range = -PARAM_EPS..=1.0 + PARAM_EPS;
    if range.contains(&t) && range.contains(&u) {
        Some((p1.0 + t * d1.0, p1.1 + t * d1.1))
    } else {
        None
    }
}

/// Even-odd test of a point against one ring.
///
/// The ring may be open or closed; the closing edge is implied.
pub fn point_in_ring(p: (f64, f64), xs: &[f64], ys: &[f64]) -> bool {
    let n = xs.len().min(ys.len());
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (xs[i], ys[i]);
        let (xj, yj) = (xs[j], ys[j]);
        if (yi > p.1) != (yj > p.1) {
            let x_cross = xi + (p.1 - yi) * (xj - xi) / (yj - yi);
            if p.0 < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Even-odd test against all rings of one polygon, so holes count as outside.
pub fn point_in_polygon<'a, I>(p: (f64, f64), rings: I) -> bool
where
    I: IntoIterator<Item = (&'a [f64], &'a [f64])>,
{
    rings
        .into_iter()
        .fold(false, |inside, (xs, ys)| inside ^ point_in_ring(p, xs, ys))
}
