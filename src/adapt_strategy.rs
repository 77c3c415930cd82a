use crate::{
    chain::ChainLink,
    cholesky::CholeskyFactor,
    covariance::{Covariance, CovarianceAdjustment},
    error::{McmcError, Result},
    parameter::ParameterSet,
    stepsize::StepSize,
};

/// Covariance re-estimation needs more jumps than this since the last adaptation.
pub const MIN_JUMPS_FOR_COVARIANCE: u64 = 1000;

/// Iterations at which the proposal is allowed to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptationSchedule {
    step_size_at: Box<[u64]>,
    covariance_at: Option<u64>,
}

impl AdaptationSchedule {
    pub fn new(mut step_size_at: Vec<u64>, covariance_at: Option<u64>) -> Self {
        step_size_at.sort_unstable();
        step_size_at.dedup();
        Self {
            step_size_at: step_size_at.into(),
            covariance_at,
        }
    }

    pub fn step_size_checkpoints(&self) -> &[u64] {
        &self.step_size_at
    }

    pub fn covariance_checkpoint(&self) -> Option<u64> {
        self.covariance_at
    }

    pub fn is_step_size_checkpoint(&self, iteration: u64) -> bool {
        self.step_size_at.binary_search(&iteration).is_ok()
    }

    /// Latest step-size checkpoint strictly before `iteration`.
    pub fn last_step_size_checkpoint_before(&self, iteration: u64) -> Option<u64> {
        self.step_size_at
            .iter()
            .copied()
            .take_while(|&checkpoint| checkpoint < iteration)
            .last()
    }
}

impl Default for AdaptationSchedule {
    fn default() -> Self {
        Self::new(vec![1], Some(1))
    }
}

/// Jump bookkeeping of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JumpCounters {
    pub jumps: u64,
    pub successful_jumps: u64,
    pub jumps_since_adapt: u64,
    pub successful_jumps_since_adapt: u64,
}

impl JumpCounters {
    /// Rebuild the counters of an interrupted chain from its reported rates.
    pub fn resumed(
        starting_iteration: u64,
        acceptance_rate: f64,
        acceptance_rate_since_adapt: f64,
        schedule: &AdaptationSchedule,
    ) -> Self {
        let jumps = starting_iteration;
        let last_adapt = schedule
            .last_step_size_checkpoint_before(starting_iteration)
            .unwrap_or(1);
        let jumps_since_adapt = jumps.saturating_sub(last_adapt);
        Self {
            jumps,
            successful_jumps: (jumps as f64 * acceptance_rate).floor() as u64,
            jumps_since_adapt,
            successful_jumps_since_adapt: (jumps_since_adapt as f64 * acceptance_rate_since_adapt)
                .floor() as u64,
        }
    }

    pub fn record(&mut self, accepted: bool) {
        self.jumps += 1;
        self.jumps_since_adapt += 1;
        if accepted {
            self.successful_jumps += 1;
            self.successful_jumps_since_adapt += 1;
        }
    }

    pub fn reset_since_adapt(&mut self) {
        self.jumps_since_adapt = 0;
        self.successful_jumps_since_adapt = 0;
    }

    pub fn acceptance_rate(&self) -> f64 {
        ratio(self.successful_jumps, self.jumps)
    }

    pub fn acceptance_rate_since_adapt(&self) -> f64 {
        ratio(self.successful_jumps_since_adapt, self.jumps_since_adapt)
    }
}

fn ratio(successes: u64, total: u64) -> f64 {
    if total == 0 {
        0.
    } else {
        successes as f64 / total as f64
    }
}

/// A re-estimated proposal covariance together with its factor.
#[derive(Debug, Clone)]
pub struct AdaptedCovariance {
    pub covariance: Covariance,
    pub factor: CholeskyFactor,
}

/// Decides when and how the proposal changes during a run.
#[derive(Debug, Clone)]
pub struct AdaptationController {
    schedule: AdaptationSchedule,
    step_size: StepSize,
    adjustment: CovarianceAdjustment,
    bound_ranges: Box<[f64]>,
    active: Box<[bool]>,
    covariance_adapted: bool,
}

impl AdaptationController {
    pub fn new(
        schedule: AdaptationSchedule,
        step_size: StepSize,
        adjustment: CovarianceAdjustment,
        parameters: &ParameterSet,
    ) -> Self {
        Self {
            schedule,
            step_size,
            adjustment,
            bound_ranges: parameters.bound_ranges(),
            active: parameters.active().into(),
            covariance_adapted: false,
        }
    }

    pub fn schedule(&self) -> &AdaptationSchedule {
        &self.schedule
    }

    pub fn current_step_size(&self) -> f64 {
        self.step_size.current_step_size()
    }

    pub fn covariance_adapted(&self) -> bool {
        self.covariance_adapted
    }

    /// Run the adaptations due at the iteration following `counters.jumps`.
    ///
    /// Returns the new covariance when it was re-estimated from `history`.
    /// Entries of inactive parameters are kept from `current`.
    pub fn adapt(
        &mut self,
        counters: &mut JumpCounters,
        history: &[ChainLink],
        current: &Covariance,
    ) -> Result<Option<AdaptedCovariance>> {
        let iteration = counters.jumps;

        if self.schedule.is_step_size_checkpoint(iteration) && counters.jumps_since_adapt > 0 {
            let before = self.step_size.current_step_size();
            self.step_size.adapt(counters);
            log::info!(
                "Adapted step size at iteration {} from {} to {} (acceptance since last adaptation {:.3})",
                iteration,
                before,
                self.step_size.current_step_size(),
                counters.acceptance_rate_since_adapt(),
            );
            counters.reset_since_adapt();
        }

        // A step-size reset at the same iteration empties the window, so a
        // shared checkpoint never re-estimates the covariance.
        let mut adapted = None;
        if !self.covariance_adapted
            && self.schedule.covariance_at == Some(iteration)
            && counters.jumps_since_adapt > MIN_JUMPS_FOR_COVARIANCE
        {
            self.covariance_adapted = true;
            adapted = self
                .reestimate_covariance(history, current)
                .map_err(|err| McmcError::CovarianceCheckpoint {
                    iteration,
                    source: Box::new(err),
                })?;
        }

        Ok(adapted)
    }

    fn reestimate_covariance(
        &self,
        history: &[ChainLink],
        current: &Covariance,
    ) -> Result<Option<AdaptedCovariance>> {
        let Some(empirical) = Covariance::empirical(history.iter().map(|link| &*link.values))
        else {
            log::warn!(
                "Skipping covariance re-estimation: {} recorded links, need at least two",
                history.len()
            );
            return Ok(None);
        };
        log::info!(
            "Re-estimating proposal covariance from {} recorded links",
            history.len()
        );
        let covariance = empirical
            .with_inactive_from(current, &self.active)
            .adjust(&self.adjustment, &self.bound_ranges);
        let factor = CholeskyFactor::new(&covariance)?;
        Ok(Some(AdaptedCovariance { covariance, factor }))
    }
}
