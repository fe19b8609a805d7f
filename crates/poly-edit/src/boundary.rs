//! Rings flattened into one linked node arena.
//!
//! Each ring is a chain of nodes from its first point to its (repeated)
//! last point; an edge joins a node to its `next`. Splitting an edge links
//! a new node in place, so ring order survives any number of inserts.

use crate::polygons::PackedPolygons;

#[derive(Debug, Clone)]
pub(crate) struct BoundaryNode<T> {
    pub x: f64,
    pub y: f64,
    pub tag: T,
    pub prev: Option<usize>,
    pub next: Option<usize>,
    /// Where a tie line crosses the edge starting at this node.
    pub crossing: Option<(f64, f64)>,
}

impl<T> BoundaryNode<T> {
    #[inline]
    pub fn point(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BoundaryList<T> {
    nodes: Vec<BoundaryNode<T>>,
    ring_starts: Vec<usize>,
    components_per_polygon: Vec<usize>,
}

impl<T: Clone> BoundaryList<T> {
    /// Link every ring of a validated polygon set.
    pub fn from_packed(polys: &PackedPolygons<T>) -> Self {
        let mut nodes = Vec::with_capacity(polys.point_count() + 8);
        let mut ring_starts = Vec::with_capacity(polys.component_count());
        let mut next_point = 0;
        for &npts in &polys.points_per_component {
            if npts == 0 {
                continue;
            }
            let first = nodes.len();
            ring_starts.push(first);
            for k in 0..npts {
                let i = next_point + k;
                let id = nodes.len();
                nodes.push(BoundaryNode {
                    x: polys.x[i],
                    y: polys.y[i],
                    tag: polys.tags[i].clone(),
                    prev: (k > 0).then(|| id - 1),
                    next: (k + 1 < npts).then_some(id + 1),
                    crossing: None,
                });
            }
            next_point += npts;
        }

        // Empty rings were skipped; keep the grouping consistent with that.
        let mut components_per_polygon = Vec::with_capacity(polys.polygon_count());
        let mut counts = polys.points_per_component.iter();
        for &ncomp in &polys.components_per_polygon {
            let kept = counts.by_ref().take(ncomp).filter(|&&n| n > 0).count();
            components_per_polygon.push(kept);
        }

        Self {
            nodes,
            ring_starts,
            components_per_polygon,
        }
    }

    #[inline]
    pub fn node(&self, id: usize) -> &BoundaryNode<T> {
        &self.nodes[id]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Every edge as `(start, end)` node ids, ring by ring.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.ring_starts.iter().flat_map(move |&start| {
            let mut cur = Some(start);
            std::iter::from_fn(move || {
                let a = cur?;
                let b = self.nodes[a].next?;
                cur = Some(b);
                Some((a, b))
            })
        })
    }

    /// Insert a node between `after` and its successor.
    pub fn split_after(&mut self, after: usize, x: f64, y: f64, tag: T) -> usize {
        let id = self.nodes.len();
        let next = self.nodes[after].next;
        debug_assert!(next.is_none_or(|n| self.nodes[n].prev == Some(after)));
        self.nodes.push(BoundaryNode {
            x,
            y,
            tag,
            prev: Some(after),
            next,
            crossing: None,
        });
        self.nodes[after].next = Some(id);
        if let Some(n) = next {
            self.nodes[n].prev = Some(id);
        }
        id
    }

    pub fn mark_crossing(&mut self, id: usize, at: (f64, f64)) {
        self.nodes[id].crossing = Some(at);
    }

    /// Marked nodes that still start an edge.
    pub fn crossings(&self) -> impl Iterator<Item = (usize, (f64, f64))> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.next.is_some())
            .filter_map(|(id, n)| n.crossing.map(|c| (id, c)))
    }

    /// Walk the rings back into packed arrays.
    pub fn to_packed(&self) -> PackedPolygons<T> {
        let mut out = PackedPolygons::new();
        out.components_per_polygon = self.components_per_polygon.clone();
        for &start in &self.ring_starts {
            let mut count = 0;
            let mut cur = Some(start);
            while let Some(id) = cur {
                let n = &self.nodes[id];
                out.x.push(n.x);
                out.y.push(n.y);
                out.tags.push(n.tag.clone());
                count += 1;
                cur = n.next;
            }
            out.points_per_component.push(count);
        }
        out
    }
}
