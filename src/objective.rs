use crate::parameter::ParameterRegistry;

/// Objective value of one candidate and its components.
///
/// Lower scores are better.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ObjectiveScore {
    pub score: f64,
    pub prior: f64,
    pub likelihood: f64,
    pub penalty: f64,
    pub additional_prior: f64,
    pub jacobian: f64,
}

impl ObjectiveScore {
    /// A score without a breakdown into components.
    pub fn from_score(score: f64) -> Self {
        Self {
            score,
            ..Default::default()
        }
    }
}

/// The model being sampled.
///
/// The chain pushes every trial vector into the registry before calling
/// [`Objective::evaluate`] with the same values.
pub trait Objective: ParameterRegistry {
    type Error: std::error::Error + Send + Sync + 'static;

    fn evaluate(&mut self, values: &[f64]) -> Result<ObjectiveScore, Self::Error>;
}
