use kd_tree::{KdPoint, KdTree};

use crate::error::WarpError;
use crate::warp_grid::Point2;

/// A target-set point carrying its original index, so that neighbor lookups
/// can report positions in the source ordering.
#[derive(Clone, Copy)]
struct IndexedPoint {
    pos: [f64; 2],
    index: usize,
}

impl KdPoint for IndexedPoint {
    type Scalar = f64;
    type Dim = typenum::U2;
    fn at(&self, k: usize) -> f64 {
        self.pos[k]
    }
}

/// Static k-nearest-neighbor index over a fixed 2-D point set.
///
/// Built once over the target set and queried repeatedly; the underlying
/// point set never changes after construction. Backed by a [`KdTree`] from
/// the `kd_tree` crate.
pub struct SpatialIndex {
    tree: KdTree<IndexedPoint>,
    len: usize,
}

impl SpatialIndex {
    /// Builds the index over `points`.
    ///
    /// # Errors
    /// Returns [`WarpError::EmptyPointSet`] if `points` is empty.
    pub fn build(points: &[Point2]) -> Result<SpatialIndex, WarpError> {
        if points.is_empty() {
            return Err(WarpError::EmptyPointSet("target"));
        }
        let items: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .map(|(index, p)| IndexedPoint {
                pos: [p.x, p.y],
                index,
            })
            .collect();
        Ok(SpatialIndex {
            tree: KdTree::build_by_ordered_float(items),
            len: points.len(),
        })
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the index holds no points. Never the case for a built index.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns up to `k` nearest points to `query` as
    /// `(index, squared distance)` pairs, ordered by increasing distance,
    /// ties broken by index order.
    pub fn k_nearest(&self, query: Point2, k: usize) -> Vec<(usize, f64)> {
        let probe = IndexedPoint {
            pos: [query.x, query.y],
            index: usize::MAX,
        };
        let mut found: Vec<(usize, f64)> = self
            .tree
            .nearests(&probe, k)
            .iter()
            .map(|n| (n.item.index, n.squared_distance))
            .collect();
        // the kd-tree does not define an order for equidistant results
        found.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_point_set_is_rejected() {
        assert!(SpatialIndex::build(&[]).is_err());
    }

    #[test]
    fn neighbors_come_back_in_distance_order() {
        let points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(0.5, 0.0),
            Point2::new(0.1, 0.0),
            Point2::new(0.9, 0.9),
        ];
        let index = SpatialIndex::build(&points).unwrap();
        let found = index.k_nearest(Point2::new(0.0, 0.0), 3);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].0, 0);
        assert_eq!(found[1].0, 2);
        assert_eq!(found[2].0, 1);
        assert!(found[0].1 <= found[1].1 && found[1].1 <= found[2].1);
        assert!((found[1].1 - 0.01).abs() < 1e-12);
    }

    #[test]
    fn equidistant_neighbors_tie_break_by_index() {
        let points = vec![
            Point2::new(0.5, 0.6),
            Point2::new(0.5, 0.4),
            Point2::new(0.4, 0.5),
            Point2::new(0.6, 0.5),
        ];
        let index = SpatialIndex::build(&points).unwrap();
        let found = index.k_nearest(Point2::new(0.5, 0.5), 4);
        let order: Vec<usize> = found.iter().map(|f| f.0).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn asking_for_more_neighbors_than_points_returns_all() {
        let points = vec![Point2::new(0.2, 0.2), Point2::new(0.8, 0.8)];
        let index = SpatialIndex::build(&points).unwrap();
        let found = index.k_nearest(Point2::new(0.0, 0.0), 10);
        assert_eq!(found.len(), 2);
    }
}
