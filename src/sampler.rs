use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::{prelude::*, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::{
    chain::{ChainLink, MetropolisChain},
    covariance::{Covariance, CovarianceAdjustment, CovarianceAdjustmentMethod},
    error::McmcError,
    objective::Objective,
    observer::{ChainObserver, NullObserver},
    proposal::ProposalDistribution,
    stepsize::StepSizeAdaptMethod,
};

/// All sampler settings.
///
/// Every field has a default, so a partial configuration deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetropolisSettings {
    /// Number of iterations. Must be positive.
    pub chain_length: u64,
    /// Multiplier of the random start jump. Zero starts at the given values.
    pub start: f64,
    /// Record every `keep`th iteration.
    pub keep: u64,
    /// Links up to this iteration are labelled as burn-in.
    pub burn_in: u64,
    pub max_correlation: f64,
    pub covariance_adjustment_method: CovarianceAdjustmentMethod,
    pub correlation_adjustment_floor: f64,
    /// Initial step size. Zero picks `2.4 / sqrt(active parameters)`.
    pub step_size: f64,
    pub proposal_distribution: ProposalDistribution,
    pub degrees_of_freedom: f64,
    pub adapt_stepsize_at: Vec<u64>,
    /// At most one iteration.
    pub adapt_covariance_at: Vec<u64>,
    pub adapt_stepsize_method: StepSizeAdaptMethod,
    pub seed: u64,
    pub num_chains: usize,
}

impl Default for MetropolisSettings {
    fn default() -> Self {
        Self {
            chain_length: 1000,
            start: 0.,
            keep: 1,
            burn_in: 0,
            max_correlation: 0.8,
            covariance_adjustment_method: CovarianceAdjustmentMethod::Covariance,
            correlation_adjustment_floor: 1e-4,
            step_size: 0.,
            proposal_distribution: ProposalDistribution::T,
            degrees_of_freedom: 4.,
            adapt_stepsize_at: vec![1],
            adapt_covariance_at: vec![1],
            adapt_stepsize_method: StepSizeAdaptMethod::Spm,
            seed: 0,
            num_chains: 1,
        }
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> McmcError {
    McmcError::InvalidSetting {
        name,
        reason: reason.into(),
    }
}

impl MetropolisSettings {
    pub fn validate(&self) -> std::result::Result<(), McmcError> {
        if self.chain_length == 0 {
            return Err(invalid("chain_length", "must be positive"));
        }
        if self.keep == 0 {
            return Err(invalid("keep", "must be at least 1"));
        }
        if !(self.max_correlation > 0. && self.max_correlation <= 1.) {
            return Err(invalid(
                "max_correlation",
                format!("{} is not in (0, 1]", self.max_correlation),
            ));
        }
        if !(self.degrees_of_freedom > 0. && self.degrees_of_freedom.is_finite()) {
            return Err(invalid(
                "degrees_of_freedom",
                format!("{} is not positive", self.degrees_of_freedom),
            ));
        }
        if !(self.start >= 0. && self.start.is_finite()) {
            return Err(invalid("start", format!("{} is negative", self.start)));
        }
        if !(self.step_size >= 0. && self.step_size.is_finite()) {
            return Err(invalid("step_size", format!("{} is negative", self.step_size)));
        }
        if !(self.correlation_adjustment_floor >= 0. && self.correlation_adjustment_floor.is_finite())
        {
            return Err(invalid(
                "correlation_adjustment_floor",
                format!("{} is negative", self.correlation_adjustment_floor),
            ));
        }
        if let Some(&iteration) = self
            .adapt_stepsize_at
            .iter()
            .find(|&&iteration| iteration == 0 || iteration > self.chain_length)
        {
            return Err(invalid(
                "adapt_stepsize_at",
                format!(
                    "iteration {} is outside 1..={}",
                    iteration, self.chain_length
                ),
            ));
        }
        if self.adapt_covariance_at.len() > 1 {
            return Err(invalid(
                "adapt_covariance_at",
                format!(
                    "only one re-estimation is supported, got {}",
                    self.adapt_covariance_at.len()
                ),
            ));
        }
        if self.num_chains == 0 {
            return Err(invalid("num_chains", "must be at least 1"));
        }
        Ok(())
    }

    pub fn covariance_adjustment(&self) -> CovarianceAdjustment {
        CovarianceAdjustment {
            method: self.covariance_adjustment_method,
            max_correlation: self.max_correlation,
            relative_floor: self.correlation_adjustment_floor,
        }
    }

    /// Start a new chain at the current values of `objective`.
    pub fn new_chain<O: Objective, R: Rng, B: ChainObserver>(
        &self,
        chain: u64,
        objective: O,
        covariance: Covariance,
        rng: R,
        observer: B,
    ) -> std::result::Result<MetropolisChain<O, R, B>, McmcError> {
        MetropolisChain::new(chain, objective, covariance, self, None, rng, observer)
    }

    /// Continue an interrupted chain from the current values of `objective`.
    pub fn resume_chain<O: Objective, R: Rng, B: ChainObserver>(
        &self,
        chain: u64,
        objective: O,
        covariance: Covariance,
        resume: &ResumeState,
        rng: R,
        observer: B,
    ) -> std::result::Result<MetropolisChain<O, R, B>, McmcError> {
        MetropolisChain::new(chain, objective, covariance, self, Some(resume), rng, observer)
    }
}

/// Where an interrupted chain left off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResumeState {
    pub starting_iteration: u64,
    pub step_size: f64,
    pub acceptance_rate: f64,
    pub acceptance_rate_since_adapt: f64,
}

impl ResumeState {
    pub fn validate(&self) -> std::result::Result<(), McmcError> {
        if !(self.step_size >= 0. && self.step_size.is_finite()) {
            return Err(invalid("step_size", format!("{} is negative", self.step_size)));
        }
        for (name, rate) in [
            ("acceptance_rate", self.acceptance_rate),
            ("acceptance_rate_since_adapt", self.acceptance_rate_since_adapt),
        ] {
            if !(0. ..=1.).contains(&rate) {
                return Err(invalid(name, format!("{} is not in [0, 1]", rate)));
            }
        }
        Ok(())
    }

    /// The state a finished or interrupted chain would resume from.
    pub fn from_last_link(link: &ChainLink) -> Self {
        Self {
            starting_iteration: link.iteration,
            step_size: link.step_size,
            acceptance_rate: link.acceptance_rate,
            acceptance_rate_since_adapt: link.acceptance_rate_since_adapt,
        }
    }
}

/// Result of one finished chain.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub chain_id: u64,
    pub links: Vec<ChainLink>,
    /// Step size after the last adaptation.
    pub step_size: f64,
    pub acceptance_rate: f64,
    /// Proposal covariance in use at the end of the run.
    pub covariance: Covariance,
    pub covariance_adapted: bool,
}

/// Output of all chains of a run, ordered by chain id.
#[derive(Debug, Clone)]
pub struct Trace {
    pub chains: Vec<ChainOutput>,
}

/// Builds the per-chain inputs of a run.
///
/// Every chain gets its own objective, so chains never share mutable state.
pub trait Model: Send + Sync {
    type Objective: Objective;

    fn objective(&self, chain_id: u64) -> Result<Self::Objective>;

    /// Initial proposal covariance, in the parameter order of the objective.
    fn covariance(&self) -> Result<Covariance>;
}

/// Run a single chain to completion on the current thread.
pub fn sample_sequentially<O: Objective, R: Rng>(
    settings: &MetropolisSettings,
    objective: O,
    covariance: Covariance,
    chain: u64,
    rng: R,
) -> Result<ChainOutput> {
    let mut sampler = settings
        .new_chain(chain, objective, covariance, rng, NullObserver)
        .context("Could not initialize chain")?;
    sampler.run().context("Chain failed")?;
    Ok(sampler.into_output())
}

/// Run `settings.num_chains` independent chains on a thread pool.
pub fn sample_parallel<M: Model>(model: &M, settings: &MetropolisSettings) -> Result<Trace> {
    sample_parallel_with(model, settings, |_| NullObserver)
}

/// Like [`sample_parallel`], with an observer built for every chain.
///
/// Chain `i` draws from stream `i` of a generator seeded with `settings.seed`,
/// so the trace does not depend on thread scheduling.
pub fn sample_parallel_with<M, B, F>(
    model: &M,
    settings: &MetropolisSettings,
    make_observer: F,
) -> Result<Trace>
where
    M: Model,
    B: ChainObserver,
    F: Fn(u64) -> B + Sync,
{
    settings.validate().context("Invalid sampler settings")?;

    let pool = ThreadPoolBuilder::new()
        .num_threads(settings.num_chains)
        .thread_name(|i| format!("assess-mcmc-worker-{}", i))
        .build()
        .context("Could not start thread pool")?;

    log::info!(
        "Sampling {} chains of length {}",
        settings.num_chains,
        settings.chain_length
    );

    let chains = pool.install(|| {
        (0..settings.num_chains as u64)
            .into_par_iter()
            .map(|chain_id| {
                let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
                rng.set_stream(chain_id);

                let objective = model
                    .objective(chain_id)
                    .context("Failed to create objective")?;
                let covariance = model
                    .covariance()
                    .context("Failed to create initial covariance")?;
                let mut sampler = settings
                    .new_chain(chain_id, objective, covariance, rng, make_observer(chain_id))
                    .with_context(|| format!("Could not initialize chain {}", chain_id))?;
                sampler
                    .run()
                    .with_context(|| format!("Chain {} failed", chain_id))?;
                Ok(sampler.into_output())
            })
            .collect::<Result<Vec<_>>>()
    })?;

    Ok(Trace { chains })
}
