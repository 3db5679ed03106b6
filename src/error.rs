use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value for params sampling: {0:?}")]
    InvalidSampling(String),
    #[error("at least one of the instantaneous or terminal cost functions is required")]
    MissingCostFunction,
    #[error("covariance matrix is not positive definite")]
    NotPositiveDefinite,
    #[error("{what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        found: String,
    },
    #[error("params sampling requires a model with a distribution over its uncertain parameters")]
    MissingUncertainty,
    #[error("rejection sampling exhausted after {attempts} attempts ({accepted}/{requested} accepted)")]
    SamplingExhausted {
        attempts: usize,
        accepted: usize,
        requested: usize,
    },
    #[error("mixture must have matching non-empty components and non-negative weights")]
    InvalidMixture,
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn shape(what: &'static str, expected: impl ToString, found: impl ToString) -> Self {
        Error::ShapeMismatch {
            what,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}
