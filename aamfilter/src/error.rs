use thiserror::Error;

/// Errors raised while building the appearance model or running the detector.
///
/// Per-sample numerical trouble (a collinear triangle, a mean-shape loop that
/// hits its iteration cap) is handled locally and never surfaces here; these
/// variants describe dataset-level problems.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AamError {
    #[error("dataset contains no samples")]
    EmptyDataset,

    #[error("sample {sample} has {found} landmarks, expected {expected}")]
    InputShapeMismatch {
        sample: usize,
        expected: usize,
        found: usize,
    },

    #[error("sample {sample} has a flat shape vector of odd length {len}")]
    OddShapeLength { sample: usize, len: usize },

    #[error("triangulation is empty")]
    EmptyTriangulation,

    #[error("triangle {triangle} references vertex {index}, but shapes have {num_points} points")]
    TriangleIndexOutOfRange {
        triangle: usize,
        index: usize,
        num_points: usize,
    },

    #[error("the canonical pixel map covers no pixels")]
    EmptyCanonicalTexture,

    #[error("pass {iteration} would remove every remaining sample")]
    EmptyActiveSubset { iteration: usize },

    #[error("pass {iteration} needs at least {needed} active samples, found {found}")]
    TooFewSamples {
        iteration: usize,
        needed: usize,
        found: usize,
    },

    #[error("robust matrix recovery did not converge after {iterations} iterations (residual {residual:e})")]
    RobustRecoveryFailed { iterations: usize, residual: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("diagnostics sink failed: {0}")]
    DiagnosticsSink(String),
}

pub type Result<T> = std::result::Result<T, AamError>;
