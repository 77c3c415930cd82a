use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    adapt_strategy::JumpCounters,
    error::{McmcError, Result},
    math::smooth_floor,
};

/// Acceptance rate the SPM policy steers towards.
pub const SPM_TARGET_ACCEPT: f64 = 0.24;

/// Step sizes below this are pushed back up smoothly.
pub const MIN_STEP_SIZE: f64 = 1e-10;

/// Rule used at a step-size checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSizeAdaptMethod {
    /// Rescale by the ratio of observed to target acceptance.
    #[default]
    Spm,
    /// Double above 0.5 acceptance, halve below 0.2.
    Casal,
}

impl FromStr for StepSizeAdaptMethod {
    type Err = McmcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "spm" => Ok(Self::Spm),
            "casal" => Ok(Self::Casal),
            _ => Err(McmcError::UnsupportedOption {
                name: "adapt_stepsize_method",
                value: s.to_string(),
                expected: "spm, casal",
            }),
        }
    }
}

impl fmt::Display for StepSizeAdaptMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spm => f.write_str("spm"),
            Self::Casal => f.write_str("casal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSize {
    method: StepSizeAdaptMethod,
    step_size: f64,
}

impl StepSize {
    pub fn new(method: StepSizeAdaptMethod, initial_step: f64) -> Self {
        Self {
            method,
            step_size: initial_step,
        }
    }

    pub fn method(&self) -> StepSizeAdaptMethod {
        self.method
    }

    pub fn current_step_size(&self) -> f64 {
        self.step_size
    }

    /// Update at a step-size checkpoint.
    ///
    /// SPM looks at the window since the previous adaptation. CASAL looks at
    /// the acceptance rate of every jump made before that window, and leaves
    /// the step alone while there is none.
    pub fn adapt(&mut self, counters: &JumpCounters) {
        if counters.jumps_since_adapt == 0 {
            return;
        }
        match self.method {
            StepSizeAdaptMethod::Spm => {
                let step = self.step_size * counters.acceptance_rate_since_adapt() / SPM_TARGET_ACCEPT;
                self.step_size = smooth_floor(step, MIN_STEP_SIZE);
            }
            StepSizeAdaptMethod::Casal => {
                let jumps = counters.jumps.saturating_sub(counters.jumps_since_adapt);
                if jumps == 0 {
                    return;
                }
                let successful = counters
                    .successful_jumps
                    .saturating_sub(counters.successful_jumps_since_adapt);
                let accept_rate = successful as f64 / jumps as f64;
                if accept_rate > 0.5 {
                    self.step_size *= 2.;
                } else if accept_rate < 0.2 {
                    self.step_size /= 2.;
                }
            }
        }
    }
}
