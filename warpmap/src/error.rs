use thiserror::Error;

/// Error type for the warp grid computations.
///
/// Fatal input errors are raised before any solve starts; no partial output
/// is ever written for them. Per-correspondence problems (a neighbor index
/// pointing outside the target set) are not errors: they are logged and the
/// offending correspondence is skipped.
#[derive(Debug, Error)]
pub enum WarpError {
    /// A point set required by the registration is empty.
    #[error("point set '{0}' is empty")]
    EmptyPointSet(&'static str),

    /// The requested grid resolution cannot represent a deformation.
    #[error("grid resolution must be at least 2, got {0}")]
    GridTooSmall(usize),

    /// A feature map has a zero dimension or inconsistent storage.
    #[error("feature map dimensions {0}x{1} are invalid")]
    InvalidFeatureMap(usize, usize),

    /// The matcher output size is not a power of two reachable from the
    /// start scale.
    #[error("output size {0} must be a power of two no smaller than {1}")]
    BadOutputSize(usize, usize),

    /// A numeric parameter is outside its accepted range.
    #[error("invalid parameter: {0}")]
    BadParameter(&'static str),

    /// Text input (point set or serialized grid) could not be parsed.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The normal-equations matrix is singular or not positive definite.
    #[error("sparse normal equations are singular or not positive definite")]
    SolverFailure,

    /// I/O error while reading inputs or writing the serialized grid.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
