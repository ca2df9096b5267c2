//! # WarpMap Library
//!
//! The `warpmap` library computes smooth, periodic 2-D deformation grids
//! ("warp grids") that map the feature layout of one material's texture maps
//! onto another's, so a renderer can morph between the two appearances
//! without visible seams at tile boundaries. The computation is batch and
//! deterministic: a driver feeds it point sets or scalar feature images once
//! per material pair and serializes the resulting grid.
//!
//! ## Overview of Modules
//!
//! - **`registration`**: Fits a deformation grid to two point sets by
//!   iterative weighted least squares: k-nearest-neighbor correspondences
//!   drive bilinear data equations, a toroidal Laplacian keeps the grid
//!   smooth, and periodic boundary equations keep it tileable.
//!
//! - **`feature_matcher`**: Alternative coarse-to-fine algorithm that grows
//!   a grid level by level through discrete candidate search over two scalar
//!   feature maps, used when point correspondences are unavailable.
//!
//! - **`warp_grid`**: The shared grid representation: a square lattice of
//!   2-D control points, its one-ring toroidally padded extension, and
//!   periodic upsampling between resolution levels.
//!
//! - **`grid_sampler`**: Bilinear sampling over grids of scalars or 2-D
//!   points, with toroidal wraparound for the matcher and clamped addressing
//!   for the registration path.
//!
//! - **`spatial_index`**: Static k-nearest-neighbor lookup over a fixed
//!   2-D point set.
//!
//! - **`sparse_system`**: Growable weighted-equation builder solved through
//!   the sparse normal equations with a Cholesky-type factorization.
//!
//! - **`feature_map`**: Single-channel intensity images with box-average
//!   resampling, the matcher's per-level input.
//!
//! - **`warp_io`**: The flat text grid format, point-set loading, and the
//!   diagnostic wireframe/channel rasters.
//!
//! - **`error`**: The [`error::WarpError`] taxonomy shared by all modules.

pub mod error;
pub mod feature_map;
pub mod feature_matcher;
pub mod grid_sampler;
pub mod registration;
pub mod sparse_system;
pub mod spatial_index;
pub mod warp_grid;
pub mod warp_io;

pub use error::WarpError;
pub use warp_grid::{Point2, WarpGrid};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
