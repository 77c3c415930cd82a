use thiserror::Error;

/// Everything that can stop a chain.
///
/// There is no degraded mode: any of these ends the run.
#[derive(Error, Debug)]
pub enum McmcError {
    #[error("invalid setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("`{value}` is not a supported value for `{name}` (expected one of {expected})")]
    UnsupportedOption {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("parameter `{label}` has lower bound {lower} above upper bound {upper}")]
    InvalidBounds { label: String, lower: f64, upper: f64 },

    #[error("parameter `{label}` starts at {value}, outside its bounds [{lower}, {upper}]")]
    ValueOutOfBounds {
        label: String,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("no active parameters: at least one parameter must be free to move in the chain")]
    NoActiveParameters,

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("covariance is not symmetric: entry ({row}, {col}) is {upper} but ({col}, {row}) is {lower}")]
    NotSymmetric {
        row: usize,
        col: usize,
        upper: f64,
        lower: f64,
    },

    #[error("covariance is not positive definite: pivot {pivot} at matrix entry ({row}, {row})")]
    NotPositiveDefinite { row: usize, pivot: f64 },

    #[error("covariance re-estimation at iteration {iteration} failed")]
    CovarianceCheckpoint {
        iteration: u64,
        #[source]
        source: Box<McmcError>,
    },

    #[error("failed to generate new candidates after {attempts} attempts, parameter `{label}` kept leaving its bounds")]
    CandidateGeneration { attempts: usize, label: String },

    #[error("failed to generate a random start after {attempts} attempts, parameter `{label}` kept leaving its bounds")]
    RandomStart { attempts: usize, label: String },

    #[error("objective evaluation failed")]
    Objective(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("the chain already reached its length")]
    ChainFinished,
}

pub type Result<T> = std::result::Result<T, McmcError>;
