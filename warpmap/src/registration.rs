use log::{info, warn};
use nalgebra::DVector;

use crate::error::WarpError;
use crate::grid_sampler::clamped_cell;
use crate::sparse_system::SparseSystem;
use crate::spatial_index::SpatialIndex;
use crate::warp_grid::{Point2, WarpGrid};

/// Bandwidth of the localized Gaussian correspondence kernel.
const GAUSS_KERNEL_STD: f64 = 0.001;

/// Additive epsilon inside the squared distance, guarding the power-law
/// falloff against division by zero.
const EPSILON_PREC: f64 = 0.001;

/// Exponent of the inverse-power-law falloff; the effective power applied
/// to the squared distance is `(P_EXPONENT - 2) / 2`.
const P_EXPONENT: f64 = 0.1;

/// Configuration of the elastic registration.
#[derive(Debug, Clone)]
pub struct RegistrationParams {
    /// Side length N of the deformation grid (N >= 2).
    pub grid_size: usize,
    /// Interior smoothness weight applied to the discrete Laplacian rows.
    pub alpha: f64,
    /// Periodic boundary coupling weight applied to the edge/corner rows.
    pub beta: f64,
    /// Number of fit/advect iterations.
    pub iterations: usize,
    /// Neighbor count k for each correspondence query.
    pub neighbors: usize,
}

impl Default for RegistrationParams {
    fn default() -> RegistrationParams {
        RegistrationParams {
            grid_size: 128,
            alpha: 200.0,
            beta: 4000.0,
            iterations: 10,
            neighbors: 10,
        }
    }
}

/// Output of a registration run: the fitted grid plus the final advected
/// source points (useful for diagnostics and convergence checks).
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    pub grid: WarpGrid,
    pub points: Vec<Point2>,
}

/// Fits a regular deformation grid so that bilinearly resampling the grid at
/// each source point approaches a plausible target correspondence, while
/// keeping the grid internally smooth and seamlessly tileable.
///
/// # How It Works
/// 1. **Neighbor search**: a [`SpatialIndex`] over the fixed target set Q is
///    built once; every iteration queries the k nearest targets of each
///    current source point.
/// 2. **Data equations**: each (point, neighbor) pair contributes two
///    weighted rows tying the bilinear combination of the four grid nodes
///    around the point's *original* position to the neighbor's coordinates.
///    The weight blends a localized Gaussian kernel with a long-range
///    inverse-power-law pull.
/// 3. **Smoothness equations**: every node carries an α-scaled discrete
///    Laplacian row with toroidal neighbor indices; nodes along the seam get
///    a ±1 shift correction on the right-hand side so the wraparound stays
///    smooth instead of tearing at the tile edge.
/// 4. **Boundary equations**: β-scaled rows pin the edge-normal coordinate of
///    border nodes to 0 or 1 and weakly tie the two sides of each seam,
///    added exactly once per edge node and corner.
/// 5. **Solve and advect**: the accumulated [`SparseSystem`] is solved for
///    the 2N² node coordinates, and every point moves a growing fraction
///    `(iter + 1) / iterations` of the way toward its resampled target.
pub struct ElasticGridRegistration {
    source: Vec<Point2>,
    target: Vec<Point2>,
    params: RegistrationParams,
}

impl ElasticGridRegistration {
    /// Validates the inputs and parameters.
    ///
    /// # Errors
    /// Fails before any solve if a point set is empty, the grid is smaller
    /// than 2x2, or the iteration/neighbor budget is zero.
    pub fn new(
        source: Vec<Point2>,
        target: Vec<Point2>,
        params: RegistrationParams,
    ) -> Result<ElasticGridRegistration, WarpError> {
        if source.is_empty() {
            return Err(WarpError::EmptyPointSet("source"));
        }
        if target.is_empty() {
            return Err(WarpError::EmptyPointSet("target"));
        }
        if params.grid_size < 2 {
            return Err(WarpError::GridTooSmall(params.grid_size));
        }
        if params.iterations == 0 {
            return Err(WarpError::BadParameter("iteration count must be at least 1"));
        }
        if params.neighbors == 0 {
            return Err(WarpError::BadParameter("neighbor count must be at least 1"));
        }
        Ok(ElasticGridRegistration {
            source,
            target,
            params,
        })
    }

    /// Runs the configured number of fit/advect iterations.
    ///
    /// # Errors
    /// Returns [`WarpError::SolverFailure`] if the normal equations turn
    /// singular; no partial result is produced in that case.
    pub fn run(&self) -> Result<RegistrationResult, WarpError> {
        let n = self.params.grid_size;
        let unknowns = 2 * n * n;

        let index = SpatialIndex::build(&self.target)?;
        let mut points = self.source.clone();
        let mut solution = DVector::zeros(unknowns);

        for iteration in 0..self.params.iterations {
            let mut system = SparseSystem::new(unknowns);
            self.push_correspondence_rows(&mut system, &points, &index);
            self.push_smoothness_rows(&mut system);
            self.push_boundary_rows(&mut system);

            solution = system.solve()?;
            info!(
                "registration solve {}/{} ({} equations)",
                iteration + 1,
                self.params.iterations,
                system.rows()
            );

            // points move gradually toward the fitted grid rather than
            // jumping to it in one step
            let step = (iteration as f64 + 1.0) / self.params.iterations as f64;
            for (i, p) in points.iter_mut().enumerate() {
                let fitted = sample_solution(&solution, self.source[i], n);
                *p += step * (fitted - *p);
            }
        }

        Ok(RegistrationResult {
            grid: WarpGrid::from_solution(&solution, n),
            points,
        })
    }

    /// Two weighted data rows per (point, neighbor) pair. The grid cell is
    /// looked up at the point's original (pre-advection) position with
    /// clamped addressing.
    fn push_correspondence_rows(
        &self,
        system: &mut SparseSystem,
        points: &[Point2],
        index: &SpatialIndex,
    ) {
        let n = self.params.grid_size;

        for (i, p) in points.iter().enumerate() {
            for (target_index, _) in index.k_nearest(*p, self.params.neighbors) {
                if target_index >= self.target.len() {
                    warn!(
                        "neighbor index {} outside target set of {} points, skipping correspondence",
                        target_index,
                        self.target.len()
                    );
                    continue;
                }
                let q = self.target[target_index];

                let d2 = (*p - q).norm_squared();
                let weight = (-d2 / GAUSS_KERNEL_STD).exp()
                    * (d2 + EPSILON_PREC).powf((P_EXPONENT - 2.0) / 2.0);

                let (coords, u, v) = clamped_cell(self.source[i], n);
                let w00 = weight * (1.0 - u) * (1.0 - v);
                let w10 = weight * u * (1.0 - v);
                let w01 = weight * (1.0 - u) * v;
                let w11 = weight * u * v;

                system.push_row(
                    &[
                        (2 * coords[0], w00),
                        (2 * coords[1], w10),
                        (2 * coords[2], w01),
                        (2 * coords[3], w11),
                    ],
                    weight * q.x,
                );
                system.push_row(
                    &[
                        (2 * coords[0] + 1, w00),
                        (2 * coords[1] + 1, w10),
                        (2 * coords[2] + 1, w01),
                        (2 * coords[3] + 1, w11),
                    ],
                    weight * q.y,
                );
            }
        }
    }

    /// One α-scaled Laplacian row per node and coordinate. Neighbor indices
    /// wrap toroidally, skipping the duplicated seam column/row (k-1 wraps
    /// to N-2, k+1 wraps to 1); the right-hand side carries the ±1 tile
    /// shift for nodes adjacent to the seam.
    fn push_smoothness_rows(&self, system: &mut SparseSystem) {
        let n = self.params.grid_size;
        let alpha = self.params.alpha;

        for l in 0..n {
            for k in 0..n {
                let x_shift = if k == 0 {
                    1.0
                } else if k == n - 1 {
                    -1.0
                } else {
                    0.0
                };
                let y_shift = if l == 0 {
                    1.0
                } else if l == n - 1 {
                    -1.0
                } else {
                    0.0
                };

                let k_plus = if k == n - 1 { 1 } else { k + 1 };
                let k_minus = if k == 0 { n - 2 } else { k - 1 };
                let l_plus = if l == n - 1 { 1 } else { l + 1 };
                let l_minus = if l == 0 { n - 2 } else { l - 1 };

                system.push_row(
                    &[
                        (2 * (k + l * n), -4.0 * alpha),
                        (2 * (k_minus + l * n), alpha),
                        (2 * (k_plus + l * n), alpha),
                        (2 * (k + l_minus * n), alpha),
                        (2 * (k + l_plus * n), alpha),
                    ],
                    x_shift * alpha,
                );
                system.push_row(
                    &[
                        (2 * (k + l * n) + 1, -4.0 * alpha),
                        (2 * (k_minus + l * n) + 1, alpha),
                        (2 * (k_plus + l * n) + 1, alpha),
                        (2 * (k + l_minus * n) + 1, alpha),
                        (2 * (k + l_plus * n) + 1, alpha),
                    ],
                    y_shift * alpha,
                );
            }
        }
    }

    /// β-scaled rows pinning border nodes and weakly coupling the two sides
    /// of each seam, each added exactly once per edge node or corner.
    fn push_boundary_rows(&self, system: &mut SparseSystem) {
        let n = self.params.grid_size;
        let beta = self.params.beta;

        for l in 0..n {
            for k in 0..n {
                let on_vertical = k == 0 || k == n - 1;
                let on_horizontal = l == 0 || l == n - 1;

                // vertical edges: pin x to 0 / 1, tie y across the seam
                if on_vertical && !on_horizontal {
                    system.push_row(
                        &[(2 * (k + l * n), beta)],
                        if k == n - 1 { beta } else { 0.0 },
                    );
                    if k == 0 {
                        system.push_row(
                            &[(2 * ((n - 1) + l * n) + 1, -beta), (2 * (l * n) + 1, beta)],
                            0.0,
                        );
                    }
                }

                // horizontal edges: pin y to 0 / 1, tie x across the seam
                if on_horizontal && !on_vertical {
                    system.push_row(
                        &[(2 * (k + l * n) + 1, beta)],
                        if l == n - 1 { beta } else { 0.0 },
                    );
                    if l == 0 {
                        system.push_row(
                            &[(2 * (k + (n - 1) * n), -beta), (2 * k, beta)],
                            0.0,
                        );
                    }
                }

                // corners: pin both coordinates
                if on_vertical && on_horizontal {
                    system.push_row(
                        &[(2 * (k + l * n), beta)],
                        if k == n - 1 { beta } else { 0.0 },
                    );
                    system.push_row(
                        &[(2 * (k + l * n) + 1, beta)],
                        if l == n - 1 { beta } else { 0.0 },
                    );
                }
            }
        }
    }
}

/// Bilinearly resamples the solved node coordinates at `p`, with the same
/// clamped addressing used to build the data rows.
fn sample_solution(x: &DVector<f64>, p: Point2, n: usize) -> Point2 {
    let (coords, u, v) = clamped_cell(p, n);
    let node = |i: usize| Point2::new(x[2 * coords[i]], x[2 * coords[i] + 1]);
    node(0) * ((1.0 - u) * (1.0 - v))
        + node(1) * (u * (1.0 - v))
        + node(2) * ((1.0 - u) * v)
        + node(3) * (u * v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice_points(side: usize, origin: f64, step: f64) -> Vec<Point2> {
        let mut points = Vec::new();
        for j in 0..side {
            for i in 0..side {
                points.push(Point2::new(
                    origin + step * i as f64,
                    origin + step * j as f64,
                ));
            }
        }
        points
    }

    fn mean_squared_nearest_distance(points: &[Point2], targets: &[Point2]) -> f64 {
        let total: f64 = points
            .iter()
            .map(|p| {
                targets
                    .iter()
                    .map(|q| (p - q).norm_squared())
                    .fold(f64::INFINITY, f64::min)
            })
            .sum();
        total / points.len() as f64
    }

    #[test]
    fn empty_inputs_are_rejected_before_solving() {
        let p = vec![Point2::new(0.5, 0.5)];
        assert!(ElasticGridRegistration::new(vec![], p.clone(), RegistrationParams::default())
            .is_err());
        assert!(ElasticGridRegistration::new(p.clone(), vec![], RegistrationParams::default())
            .is_err());
        let params = RegistrationParams {
            grid_size: 1,
            ..RegistrationParams::default()
        };
        assert!(ElasticGridRegistration::new(p.clone(), p, params).is_err());
    }

    #[test]
    fn identical_point_sets_yield_an_identity_grid() {
        let points = WarpGrid::lattice(4).nodes().to_vec();
        let params = RegistrationParams {
            grid_size: 4,
            alpha: 200.0,
            beta: 4000.0,
            iterations: 1,
            neighbors: 10,
        };
        let registration =
            ElasticGridRegistration::new(points.clone(), points, params).unwrap();
        let result = registration.run().unwrap();

        let expected = WarpGrid::lattice(4);
        for (fitted, ideal) in result.grid.nodes().iter().zip(expected.nodes()) {
            assert!(
                (fitted - ideal).norm() < 1e-3,
                "node {:?} drifted from {:?}",
                fitted,
                ideal
            );
        }
    }

    #[test]
    fn advected_points_do_not_drift_away_from_targets() {
        let source = lattice_points(5, 0.15, 0.15);
        let target: Vec<Point2> = source
            .iter()
            .map(|p| p + Point2::new(0.02, 0.015))
            .collect();
        let initial = mean_squared_nearest_distance(&source, &target);

        let params = RegistrationParams {
            grid_size: 4,
            alpha: 200.0,
            beta: 4000.0,
            iterations: 5,
            neighbors: 10,
        };
        let registration =
            ElasticGridRegistration::new(source, target.clone(), params).unwrap();
        let result = registration.run().unwrap();

        let final_error = mean_squared_nearest_distance(&result.points, &target);
        assert!(
            final_error <= initial + 1e-9,
            "error grew from {} to {}",
            initial,
            final_error
        );
    }

    #[test]
    fn solution_sampling_matches_node_values_at_lattice_points() {
        // an identity solution vector reproduces the lattice positions
        let n = 4;
        let grid = WarpGrid::lattice(n);
        let mut x = DVector::zeros(2 * n * n);
        for l in 0..n {
            for k in 0..n {
                let base = 2 * (k + l * n);
                x[base] = grid.node(k, l).x;
                x[base + 1] = grid.node(k, l).y;
            }
        }
        for l in 0..n {
            for k in 0..n {
                let p = grid.node(k, l);
                assert!((sample_solution(&x, p, n) - p).norm() < 1e-12);
            }
        }
    }
}
