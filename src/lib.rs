//! Adaptive Metropolis-Hastings sampling of stock assessment posteriors.
//!
//! A chain starts from the maximum posterior density point and an approximate
//! covariance, proposes correlated jumps inside the parameter bounds and adapts
//! its step size and, once, its covariance while it runs.
//!
//! ```ignore
//! let settings = MetropolisSettings {
//!     chain_length: 10_000,
//!     keep: 10,
//!     ..Default::default()
//! };
//! let output = sample_sequentially(&settings, objective, covariance, 0, rng)?;
//! ```

pub(crate) mod adapt_strategy;
pub(crate) mod chain;
pub(crate) mod cholesky;
pub(crate) mod covariance;
pub(crate) mod error;
pub(crate) mod math;
pub(crate) mod objective;
pub(crate) mod observer;
pub(crate) mod parameter;
pub(crate) mod proposal;
pub(crate) mod sampler;
pub(crate) mod stepsize;

pub use adapt_strategy::{
    AdaptationController, AdaptationSchedule, AdaptedCovariance, JumpCounters,
    MIN_JUMPS_FOR_COVARIANCE,
};
pub use chain::{acceptance_ratio, Chain, ChainLink, ChainState, MetropolisChain, Progress};
pub use cholesky::CholeskyFactor;
pub use covariance::{Covariance, CovarianceAdjustment, CovarianceAdjustmentMethod};
pub use error::McmcError;
pub use objective::{Objective, ObjectiveScore};
pub use observer::{ChainObserver, ChannelObserver, NullObserver};
pub use parameter::{Parameter, ParameterRegistry, ParameterSet};
pub use proposal::{random_start, ProposalDistribution, ProposalSampler, MAX_PROPOSAL_ATTEMPTS};
pub use sampler::{
    sample_parallel, sample_parallel_with, sample_sequentially, ChainOutput, MetropolisSettings,
    Model, ResumeState, Trace,
};
pub use stepsize::{StepSize, StepSizeAdaptMethod, MIN_STEP_SIZE, SPM_TARGET_ACCEPT};
