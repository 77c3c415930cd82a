use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    adapt_strategy::{AdaptationController, AdaptationSchedule, JumpCounters},
    cholesky::CholeskyFactor,
    covariance::Covariance,
    error::{McmcError, Result},
    objective::{Objective, ObjectiveScore},
    observer::ChainObserver,
    parameter::{ParameterRegistry, ParameterSet},
    proposal::{random_start, ProposalSampler},
    sampler::{MetropolisSettings, ResumeState},
    stepsize::StepSize,
};

/// Whether a link belongs to the burn-in or to the posterior sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    BurnIn,
    Mcmc,
}

/// One recorded sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainLink {
    pub iteration: u64,
    pub state: ChainState,
    pub values: Box<[f64]>,
    pub score: f64,
    pub prior: f64,
    pub likelihood: f64,
    pub penalty: f64,
    pub additional_prior: f64,
    pub jacobian: f64,
    pub step_size: f64,
    pub acceptance_rate: f64,
    pub acceptance_rate_since_adapt: f64,
}

/// Diagnostic information about one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub chain: u64,
    pub iteration: u64,
    pub accepted: bool,
    /// A link was appended in this iteration.
    pub recorded: bool,
    pub step_size: f64,
    pub acceptance_rate: f64,
    pub acceptance_rate_since_adapt: f64,
    pub finished: bool,
}

/// Draw samples from the posterior with a random-walk Metropolis chain.
pub trait Chain {
    /// Run one iteration: adapt, propose, evaluate and decide.
    ///
    /// Fails with [`McmcError::ChainFinished`] once the chain reached its length.
    fn draw(&mut self) -> Result<Progress>;

    /// Number of parameters, fixed ones included.
    fn dim(&self) -> usize;

    fn is_finished(&self) -> bool;

    /// Recorded links, starting point first.
    fn links(&self) -> &[ChainLink];
}

/// Acceptance probability of moving from `old` to `new`.
pub fn acceptance_ratio(old: f64, new: f64) -> f64 {
    if new <= old {
        1.
    } else {
        (old - new).exp()
    }
}

pub struct MetropolisChain<O, R, B>
where
    O: Objective,
    R: Rng,
    B: ChainObserver,
{
    chain: u64,
    objective: O,
    parameters: ParameterSet,
    covariance: Covariance,
    factor: CholeskyFactor,
    proposal: ProposalSampler,
    controller: AdaptationController,
    counters: JumpCounters,
    current: Box<[f64]>,
    current_score: ObjectiveScore,
    links: Vec<ChainLink>,
    chain_length: u64,
    keep: u64,
    burn_in: u64,
    rng: R,
    observer: B,
}

impl<O, R, B> MetropolisChain<O, R, B>
where
    O: Objective,
    R: Rng,
    B: ChainObserver,
{
    /// Set up a chain at the current values of `objective` and record the starting link.
    ///
    /// A fresh chain adjusts `covariance` and takes the random start when
    /// configured. A resumed chain uses `covariance` as given and restores
    /// its counters from `resume`.
    pub fn new(
        chain: u64,
        mut objective: O,
        covariance: Covariance,
        settings: &MetropolisSettings,
        resume: Option<&ResumeState>,
        mut rng: R,
        observer: B,
    ) -> Result<Self> {
        settings.validate()?;
        if let Some(resume) = resume {
            resume.validate()?;
        }

        let parameters = ParameterSet::from_registry(&objective)?;
        if covariance.dim() != parameters.len() {
            return Err(McmcError::DimensionMismatch {
                expected: parameters.len(),
                found: covariance.dim(),
            });
        }

        let mut step_size = resume.map_or(settings.step_size, |resume| resume.step_size);
        if step_size == 0. {
            step_size = parameters.default_step_size();
        }

        let schedule = AdaptationSchedule::new(
            settings.adapt_stepsize_at.clone(),
            settings.adapt_covariance_at.first().copied(),
        );
        let adjustment = settings.covariance_adjustment();

        let covariance = match resume {
            Some(_) => covariance,
            None => covariance.adjust(&adjustment, &parameters.bound_ranges()),
        };
        let factor = CholeskyFactor::new(&covariance)?;
        let proposal =
            ProposalSampler::new(settings.proposal_distribution, settings.degrees_of_freedom)?;

        let mut current = parameters.values();
        if resume.is_none() && settings.start > 0. {
            current = random_start(&current, &factor, settings.start, &parameters, &mut rng)?;
        }

        let counters = match resume {
            Some(resume) => JumpCounters::resumed(
                resume.starting_iteration,
                resume.acceptance_rate,
                resume.acceptance_rate_since_adapt,
                &schedule,
            ),
            None => JumpCounters::default(),
        };

        let controller = AdaptationController::new(
            schedule,
            StepSize::new(settings.adapt_stepsize_method, step_size),
            adjustment,
            &parameters,
        );

        push_values(&mut objective, &current);
        let current_score = objective
            .evaluate(&current)
            .map_err(|err| McmcError::Objective(Box::new(err)))?;

        log::info!(
            "Starting chain {} at iteration {} with {} of {} parameters active, step size {}",
            chain,
            counters.jumps,
            parameters.active_count(),
            parameters.len(),
            step_size,
        );

        let mut this = Self {
            chain,
            objective,
            parameters,
            covariance,
            factor,
            proposal,
            controller,
            counters,
            current,
            current_score,
            links: Vec::new(),
            chain_length: settings.chain_length,
            keep: settings.keep,
            burn_in: settings.burn_in,
            rng,
            observer,
        };

        let (acceptance_rate, acceptance_rate_since_adapt) = resume.map_or((0., 0.), |resume| {
            (resume.acceptance_rate, resume.acceptance_rate_since_adapt)
        });
        this.record(acceptance_rate, acceptance_rate_since_adapt);
        Ok(this)
    }

    fn record(&mut self, acceptance_rate: f64, acceptance_rate_since_adapt: f64) {
        let iteration = self.counters.jumps;
        let state = if iteration > self.burn_in {
            ChainState::Mcmc
        } else {
            ChainState::BurnIn
        };
        let ObjectiveScore {
            score,
            prior,
            likelihood,
            penalty,
            additional_prior,
            jacobian,
        } = self.current_score;
        let link = ChainLink {
            iteration,
            state,
            values: self.current.clone(),
            score,
            prior,
            likelihood,
            penalty,
            additional_prior,
            jacobian,
            step_size: self.controller.current_step_size(),
            acceptance_rate,
            acceptance_rate_since_adapt,
        };
        self.observer.link_recorded(self.chain, &link);
        self.links.push(link);
    }

    /// Draw until the chain reaches its length.
    pub fn run(&mut self) -> Result<()> {
        while !self.is_finished() {
            self.draw()?;
        }
        Ok(())
    }

    pub fn chain_id(&self) -> u64 {
        self.chain
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn covariance(&self) -> &Covariance {
        &self.covariance
    }

    pub fn step_size(&self) -> f64 {
        self.controller.current_step_size()
    }

    pub fn counters(&self) -> &JumpCounters {
        &self.counters
    }

    pub fn current(&self) -> &[f64] {
        &self.current
    }

    pub fn objective(&self) -> &O {
        &self.objective
    }

    pub fn into_links(self) -> Vec<ChainLink> {
        self.links
    }

    pub(crate) fn into_output(self) -> crate::sampler::ChainOutput {
        crate::sampler::ChainOutput {
            chain_id: self.chain,
            step_size: self.controller.current_step_size(),
            acceptance_rate: self.counters.acceptance_rate(),
            covariance_adapted: self.controller.covariance_adapted(),
            covariance: self.covariance,
            links: self.links,
        }
    }
}

fn push_values<P: ParameterRegistry + ?Sized>(registry: &mut P, values: &[f64]) {
    values
        .iter()
        .enumerate()
        .for_each(|(index, &value)| registry.set_value(index, value));
}

impl<O, R, B> Chain for MetropolisChain<O, R, B>
where
    O: Objective,
    R: Rng,
    B: ChainObserver,
{
    fn draw(&mut self) -> Result<Progress> {
        if self.is_finished() {
            return Err(McmcError::ChainFinished);
        }

        let adapted = self
            .controller
            .adapt(&mut self.counters, &self.links, &self.covariance)?;
        if let Some(adapted) = adapted {
            self.covariance = adapted.covariance;
            self.factor = adapted.factor;
        }

        let step_size = self.controller.current_step_size();
        let candidate = self.proposal.draw(
            &self.factor,
            step_size,
            &self.current,
            &self.parameters,
            &mut self.rng,
        )?;

        push_values(&mut self.objective, &candidate);
        let score = self
            .objective
            .evaluate(&candidate)
            .map_err(|err| McmcError::Objective(Box::new(err)))?;

        let ratio = acceptance_ratio(self.current_score.score, score.score);
        let accepted = ratio == 1. || self.rng.random::<f64>() < ratio;
        self.counters.record(accepted);

        if accepted {
            log::debug!(
                "chain {} accepted iteration {}: score {} (previous {})",
                self.chain,
                self.counters.jumps,
                score.score,
                self.current_score.score
            );
            self.current = candidate;
            self.current_score = score;
        } else {
            log::debug!(
                "chain {} rejected iteration {}: score {} (previous {})",
                self.chain,
                self.counters.jumps,
                score.score,
                self.current_score.score
            );
            push_values(&mut self.objective, &self.current);
        }

        let recorded = self.counters.jumps % self.keep == 0;
        if recorded {
            self.record(
                self.counters.acceptance_rate(),
                self.counters.acceptance_rate_since_adapt(),
            );
        }

        Ok(Progress {
            chain: self.chain,
            iteration: self.counters.jumps,
            accepted,
            recorded,
            step_size,
            acceptance_rate: self.counters.acceptance_rate(),
            acceptance_rate_since_adapt: self.counters.acceptance_rate_since_adapt(),
            finished: self.is_finished(),
        })
    }

    fn dim(&self) -> usize {
        self.parameters.len()
    }

    fn is_finished(&self) -> bool {
        self.counters.jumps >= self.chain_length
    }

    fn links(&self) -> &[ChainLink] {
        &self.links
    }
}
