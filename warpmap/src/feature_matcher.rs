use log::info;
use nalgebra::Matrix2;

use crate::error::WarpError;
use crate::feature_map::FeatureMap;
use crate::warp_grid::{PaddedWarpGrid, Point2, WarpGrid, START_SCALE};

/// How the 9 candidate target positions of a node are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateMode {
    /// The node itself plus the midpoints between the node and each of its
    /// 8 toroidal neighbors in the padded grid.
    NeighborMidpoints,
    /// The node itself plus 8 fixed offsets of magnitude `1 / (4 * scale)`.
    FixedDeltas,
}

/// Configuration of the multiresolution matcher.
#[derive(Debug, Clone)]
pub struct MatcherParams {
    /// Weight of the local distortion penalty against the appearance term.
    pub alpha: f64,
    /// Final grid side length; a power of two, at least [`START_SCALE`].
    pub output_size: usize,
    /// Candidate enumeration variant.
    pub mode: CandidateMode,
}

impl Default for MatcherParams {
    fn default() -> MatcherParams {
        MatcherParams {
            alpha: 0.1,
            output_size: 64,
            mode: CandidateMode::NeighborMidpoints,
        }
    }
}

/// Grows a deformation grid level by level through discrete neighbor search
/// over two scalar feature maps, used when point correspondences are
/// unavailable or too sparse.
///
/// # How It Works
/// 1. The grid starts at [`START_SCALE`] with every node on its cell center.
/// 2. At each level the shape guide F0 is box-resampled to the grid
///    resolution and the style guide F1 to twice that; both are wrapped in
///    periodic samplers.
/// 3. Every node tries 9 candidate positions (its own first). A candidate
///    costs the squared difference between the style value at the candidate
///    and the shape value at the node's cell center, plus α times a local
///    Frobenius-norm distortion measure over the six triangle edges incident
///    to the node in the padded grid.
/// 4. The sweep is synchronous: all reads go through the padded snapshot
///    taken at the start of the level, and the winning candidates replace
///    the grid only once the sweep is complete.
/// 5. Below the requested output size the grid is upsampled to double
///    resolution by periodic bilinear interpolation and the next level
///    begins; the loop stops exactly at the output size.
pub struct MultiresolutionFeatureMatcher {
    shape_guide: FeatureMap,
    style_guide: FeatureMap,
    params: MatcherParams,
}

impl MultiresolutionFeatureMatcher {
    /// Validates the output size against the fixed start scale.
    pub fn new(
        shape_guide: FeatureMap,
        style_guide: FeatureMap,
        params: MatcherParams,
    ) -> Result<MultiresolutionFeatureMatcher, WarpError> {
        if !params.output_size.is_power_of_two() || params.output_size < START_SCALE {
            return Err(WarpError::BadOutputSize(params.output_size, START_SCALE));
        }
        Ok(MultiresolutionFeatureMatcher {
            shape_guide,
            style_guide,
            params,
        })
    }

    /// Runs the coarse-to-fine search and returns the final grid.
    ///
    /// # Errors
    /// A resampling failure at any level is fatal and aborts the whole
    /// computation.
    pub fn run(&self) -> Result<WarpGrid, WarpError> {
        let mut grid = WarpGrid::cell_centers(START_SCALE);
        let mut scale = START_SCALE;

        loop {
            let shape_level = self.shape_guide.resized(scale, scale)?;
            let style_level = self.style_guide.resized(2 * scale, 2 * scale)?;
            let shape_sampler = shape_level.sampler();
            let style_sampler = style_level.sampler();

            // snapshot for the synchronous sweep: every neighborhood read of
            // this level sees the grid as it was when the level started
            let padded = grid.padded();
            let mut swept = grid.clone();

            for i in 0..scale {
                for j in 0..scale {
                    let candidates = match self.params.mode {
                        CandidateMode::NeighborMidpoints => neighbor_midpoints(&padded, j + 1, i + 1),
                        CandidateMode::FixedDeltas => fixed_deltas(grid.node(j, i), scale),
                    };

                    let shape_value = shape_sampler.sample(
                        (j as f64 + 0.5) / scale as f64,
                        (i as f64 + 0.5) / scale as f64,
                    );

                    let mut best = candidates[0];
                    let mut best_cost = f64::INFINITY;
                    for candidate in candidates {
                        let style_value = style_sampler.sample(candidate.x, candidate.y);
                        let distortion =
                            frobenius_distortion(&padded, candidate, j + 1, i + 1);
                        let cost = (style_value - shape_value).powi(2)
                            + self.params.alpha * distortion;
                        // strict improvement keeps the first candidate on ties
                        if cost < best_cost {
                            best_cost = cost;
                            best = candidate;
                        }
                    }
                    swept.set_node(j, i, best);
                }
            }

            info!("feature match sweep at scale {}", scale);

            if scale < self.params.output_size {
                grid = swept.upsampled();
                scale *= 2;
            } else {
                grid = swept;
                break;
            }
        }

        Ok(grid)
    }
}

/// The node's current position followed by the midpoints toward its 8
/// padded neighbors. `(col, row)` address the node in padded coordinates.
fn neighbor_midpoints(padded: &PaddedWarpGrid, col: usize, row: usize) -> [Point2; 9] {
    let center = padded.node(col, row);
    let mid = |x: usize, y: usize| 0.5 * padded.node(x, y) + 0.5 * center;
    [
        center,
        mid(col - 1, row),
        mid(col - 1, row + 1),
        mid(col, row - 1),
        mid(col, row + 1),
        mid(col + 1, row - 1),
        mid(col + 1, row),
        mid(col - 1, row - 1),
        mid(col + 1, row + 1),
    ]
}

/// The node's current position followed by 8 fixed half-cell offsets.
fn fixed_deltas(center: Point2, scale: usize) -> [Point2; 9] {
    let delta = 1.0 / (4.0 * scale as f64);
    let at = |dx: f64, dy: f64| center + Point2::new(dx, dy) * delta;
    [
        center,
        at(0.0, -1.0),
        at(1.0, -1.0),
        at(-1.0, 0.0),
        at(1.0, 0.0),
        at(-1.0, 1.0),
        at(0.0, 1.0),
        at(-1.0, -1.0),
        at(1.0, 1.0),
    ]
}

/// Local distortion of the padded grid if the node at `(col, row)` moved to
/// `candidate`: the six triangle edges incident to the node are compared
/// against an ideal unit-spacing basis, and the Frobenius norms of the six
/// 2x2 difference matrices are summed and normalized by the grid scale.
fn frobenius_distortion(
    padded: &PaddedWarpGrid,
    candidate: Point2,
    col: usize,
    row: usize,
) -> f64 {
    let scale = (padded.side() - 2) as f64;
    let spacing = 1.0 / scale;

    let b = padded.node(col + 1, row);
    let c = padded.node(col + 1, row - 1);
    let d = padded.node(col, row + 1);
    let e = padded.node(col, row - 1);
    let f = padded.node(col - 1, row);
    let g = padded.node(col - 1, row + 1);

    let ba = b - candidate;
    let bc = b - c;
    let ce = c - e;
    let da = d - candidate;
    let ae = candidate - e;
    let af = candidate - f;
    let dg = d - g;
    let gf = g - f;

    let norm = |e1: Point2, e2: Point2| {
        Matrix2::new(e1.x - spacing, e2.x, e1.y, e2.y - spacing).norm()
    };

    let mut sum = 0.0;
    sum += norm(ba, bc);
    sum += norm(ce, ae);
    sum += norm(ba, da);
    sum += norm(af, ae);
    sum += norm(dg, da);
    sum += norm(af, gf);

    sum / scale
}
