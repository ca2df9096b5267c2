use nalgebra::DVector;

use crate::grid_sampler::PeriodicGridSampler;

/// A 2-D point in normalized `[0,1]x[0,1]` texture space.
pub type Point2 = nalgebra::Vector2<f64>;

/// Coarsest grid side length used by the multiresolution matcher. The
/// upsampling phase correction below applies exactly at this level.
pub const START_SCALE: usize = 8;

/// A square lattice of 2-D control points describing where each regular grid
/// node is warped to.
///
/// The grid is stored row-major in a flat `Vec`, one [`Point2`] per node,
/// addressed as `(x, y)` with `x` the column and `y` the row. Grid
/// coordinates wrap toroidally: column `size` aliases column `0` and row
/// `size` aliases row `0`. The registration path enforces this through
/// explicit periodic constraint equations; the matcher path through
/// [`PaddedWarpGrid`] sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct WarpGrid {
    /// Node positions, laid out row by row in a single vector.
    nodes: Vec<Point2>,

    /// Side length of the square grid (number of nodes per row).
    size: usize,
}

impl WarpGrid {
    /// Creates a grid with node `(k, l)` placed at the lattice position
    /// `(k / (size - 1), l / (size - 1))`, i.e. the undeformed node layout
    /// used by the registration solver.
    pub fn lattice(size: usize) -> WarpGrid {
        let step = 1.0 / (size as f64 - 1.0);
        let mut nodes = Vec::with_capacity(size * size);
        for l in 0..size {
            for k in 0..size {
                nodes.push(Point2::new(k as f64 * step, l as f64 * step));
            }
        }
        WarpGrid { nodes, size }
    }

    /// Creates a grid with node `(k, l)` placed at the center of its cell,
    /// `((k + 0.5) / size, (l + 0.5) / size)`, the initial state of the
    /// multiresolution matcher.
    pub fn cell_centers(size: usize) -> WarpGrid {
        let mut nodes = Vec::with_capacity(size * size);
        for l in 0..size {
            for k in 0..size {
                nodes.push(Point2::new(
                    (k as f64 + 0.5) / size as f64,
                    (l as f64 + 0.5) / size as f64,
                ));
            }
        }
        WarpGrid { nodes, size }
    }

    /// Builds a grid from a solved unknown vector of length `2 * size^2`,
    /// where node `(k, l)` reads its coordinates from slots
    /// `2 * (k + l * size)` and `2 * (k + l * size) + 1`.
    pub fn from_solution(x: &DVector<f64>, size: usize) -> WarpGrid {
        let mut nodes = Vec::with_capacity(size * size);
        for l in 0..size {
            for k in 0..size {
                let base = 2 * (k + l * size);
                nodes.push(Point2::new(x[base], x[base + 1]));
            }
        }
        WarpGrid { nodes, size }
    }

    /// Wraps an existing node vector. The length must be `size * size`.
    pub fn from_nodes(nodes: Vec<Point2>, size: usize) -> WarpGrid {
        assert_eq!(nodes.len(), size * size);
        WarpGrid { nodes, size }
    }

    /// Side length of the grid.
    pub fn size(&self) -> usize {
        self.size
    }

    /// All nodes in row-major order.
    pub fn nodes(&self) -> &[Point2] {
        &self.nodes
    }

    /// Returns the node at column `x`, row `y`.
    ///
    /// # Panics
    /// Panics if `(x, y)` is out of bounds.
    pub fn node(&self, x: usize, y: usize) -> Point2 {
        self.nodes[y * self.size + x]
    }

    /// Replaces the node at column `x`, row `y`.
    pub fn set_node(&mut self, x: usize, y: usize, p: Point2) {
        self.nodes[y * self.size + x] = p;
    }

    /// Extends the grid by one ring of ghost nodes on each side, derived
    /// from the opposite edge shifted by one tile unit (toroidal
    /// continuation). Used only for sampling and interpolation, never
    /// persisted.
    pub fn padded(&self) -> PaddedWarpGrid {
        let s = self.size;
        let side = s + 2;
        let mut nodes = vec![Point2::new(0.0, 0.0); side * side];

        let mut set = |x: usize, y: usize, p: Point2| nodes[y * side + x] = p;

        // corners
        set(0, 0, self.node(s - 1, s - 1) - Point2::new(1.0, 1.0));
        set(side - 1, 0, self.node(0, s - 1) + Point2::new(1.0, -1.0));
        set(0, side - 1, self.node(s - 1, 0) + Point2::new(-1.0, 1.0));
        set(side - 1, side - 1, self.node(0, 0) + Point2::new(1.0, 1.0));

        // interior
        for y in 0..s {
            for x in 0..s {
                set(x + 1, y + 1, self.node(x, y));
            }
        }

        // top and bottom rows
        for x in 0..s {
            set(x + 1, 0, self.node(x, s - 1) - Point2::new(0.0, 1.0));
            set(x + 1, side - 1, self.node(x, 0) + Point2::new(0.0, 1.0));
        }

        // left and right columns
        for y in 0..s {
            set(0, y + 1, self.node(s - 1, y) - Point2::new(1.0, 0.0));
            set(side - 1, y + 1, self.node(0, y) + Point2::new(1.0, 0.0));
        }

        PaddedWarpGrid { nodes, side }
    }

    /// Doubles the grid resolution by periodic bilinear interpolation of the
    /// padded grid.
    ///
    /// New node `(j, i)` samples the padded grid at
    /// `((j + 3 - offset) / (2 * (size + 2)), (i + 3 - offset) / (2 * (size + 2)))`,
    /// where `offset` is 1 at the coarsest [`START_SCALE`] level and 0
    /// afterwards (half-texel phase correction of the first upsampling).
    pub fn upsampled(&self) -> WarpGrid {
        let padded = self.padded();
        let side = padded.side;
        let sampler = PeriodicGridSampler::new(padded.nodes.clone(), side, side);

        let offset = if self.size == START_SCALE { 1.0 } else { 0.0 };
        let out_size = 2 * self.size;
        let denom = 2.0 * side as f64;

        let mut nodes = Vec::with_capacity(out_size * out_size);
        for i in 0..out_size {
            for j in 0..out_size {
                nodes.push(sampler.sample(
                    (j as f64 + 3.0 - offset) / denom,
                    (i as f64 + 3.0 - offset) / denom,
                ));
            }
        }
        WarpGrid {
            nodes,
            size: out_size,
        }
    }
}

/// A [`WarpGrid`] extended by one ghost ring on every side.
///
/// Node `(x, y)` of the padded grid, for `x, y` in `1..=size`, is the
/// original node `(x - 1, y - 1)`; the border ring holds the opposite edge
/// shifted by one tile unit, so bilinear interpolation across the seam sees
/// a seamless continuation.
#[derive(Debug, Clone)]
pub struct PaddedWarpGrid {
    nodes: Vec<Point2>,
    side: usize,
}

impl PaddedWarpGrid {
    /// Side length including both ghost columns.
    pub fn side(&self) -> usize {
        self.side
    }

    /// Returns the padded node at column `x`, row `y`.
    ///
    /// # Panics
    /// Panics if `(x, y)` is out of bounds.
    pub fn node(&self, x: usize, y: usize) -> Point2 {
        self.nodes[y * self.side + x]
    }

    /// All padded nodes in row-major order.
    pub fn nodes(&self) -> &[Point2] {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_spans_unit_square() {
        let grid = WarpGrid::lattice(4);
        assert_eq!(grid.node(0, 0), Point2::new(0.0, 0.0));
        assert_eq!(grid.node(3, 3), Point2::new(1.0, 1.0));
        assert_eq!(grid.node(3, 0), Point2::new(1.0, 0.0));
    }

    #[test]
    fn cell_centers_are_half_steps() {
        let grid = WarpGrid::cell_centers(8);
        assert_eq!(grid.node(0, 0), Point2::new(0.5 / 8.0, 0.5 / 8.0));
        assert_eq!(grid.node(7, 3), Point2::new(7.5 / 8.0, 3.5 / 8.0));
    }

    #[test]
    fn padding_wraps_with_unit_shift() {
        let grid = WarpGrid::cell_centers(4);
        let padded = grid.padded();
        let s = grid.size();

        for j in 0..s {
            assert_eq!(
                padded.node(j + 1, 0),
                grid.node(j, s - 1) - Point2::new(0.0, 1.0)
            );
            assert_eq!(
                padded.node(j + 1, s + 1),
                grid.node(j, 0) + Point2::new(0.0, 1.0)
            );
            assert_eq!(
                padded.node(0, j + 1),
                grid.node(s - 1, j) - Point2::new(1.0, 0.0)
            );
            assert_eq!(
                padded.node(s + 1, j + 1),
                grid.node(0, j) + Point2::new(1.0, 0.0)
            );
        }

        // corners combine both shifts
        assert_eq!(
            padded.node(0, 0),
            grid.node(s - 1, s - 1) - Point2::new(1.0, 1.0)
        );
        assert_eq!(
            padded.node(s + 1, s + 1),
            grid.node(0, 0) + Point2::new(1.0, 1.0)
        );
        assert_eq!(
            padded.node(s + 1, 0),
            grid.node(0, s - 1) + Point2::new(1.0, -1.0)
        );
        assert_eq!(
            padded.node(0, s + 1),
            grid.node(s - 1, 0) + Point2::new(-1.0, 1.0)
        );
    }

    #[test]
    fn padding_keeps_interior_unchanged() {
        let grid = WarpGrid::cell_centers(4);
        let padded = grid.padded();
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(padded.node(x + 1, y + 1), grid.node(x, y));
            }
        }
    }

    #[test]
    fn upsampling_doubles_resolution_uniformly() {
        let grid = WarpGrid::cell_centers(START_SCALE);
        let up = grid.upsampled();
        assert_eq!(up.size(), 2 * START_SCALE);

        // a uniform grid stays uniform: consecutive nodes in a row are spaced
        // by 1 / (2 * START_SCALE)
        let spacing = 1.0 / (2.0 * START_SCALE as f64);
        for i in 0..up.size() {
            for j in 0..up.size() - 1 {
                let dx = up.node(j + 1, i).x - up.node(j, i).x;
                assert!((dx - spacing).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn from_solution_reads_interleaved_coordinates() {
        let n = 2;
        let x = DVector::from_vec(vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7]);
        let grid = WarpGrid::from_solution(&x, n);
        assert_eq!(grid.node(0, 0), Point2::new(0.0, 0.1));
        assert_eq!(grid.node(1, 0), Point2::new(0.2, 0.3));
        assert_eq!(grid.node(0, 1), Point2::new(0.4, 0.5));
        assert_eq!(grid.node(1, 1), Point2::new(0.6, 0.7));
    }
}
