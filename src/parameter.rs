use crate::error::{McmcError, Result};

/// A free parameter of the model as seen by the sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub label: String,
    pub value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Excluded from proposals even if the bounds differ.
    pub is_fixed: bool,
}

impl Parameter {
    pub fn new(label: impl Into<String>, value: f64, lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            label: label.into(),
            value,
            lower_bound,
            upper_bound,
            is_fixed: false,
        }
    }

    pub fn fixed(mut self) -> Self {
        self.is_fixed = true;
        self
    }

    /// Whether proposals may move this parameter.
    pub fn is_active(&self) -> bool {
        !(self.is_fixed || self.lower_bound == self.upper_bound)
    }

    pub fn range(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }

    pub fn contains(&self, value: f64) -> bool {
        !(self.lower_bound > value || self.upper_bound < value)
    }
}

/// Access to the free parameters of the surrounding model.
pub trait ParameterRegistry {
    /// The free parameters, in the order used by the covariance matrix.
    fn parameters(&self) -> Vec<Parameter>;

    /// Push a trial or accepted value back into the model.
    fn set_value(&mut self, index: usize, value: f64);
}

/// The ordered parameters of one chain.
///
/// Bounds never change after the set is built.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    parameters: Box<[Parameter]>,
    active: Box<[bool]>,
}

impl ParameterSet {
    pub fn new(parameters: Vec<Parameter>) -> Result<Self> {
        for parameter in parameters.iter() {
            let Parameter {
                label,
                value,
                lower_bound,
                upper_bound,
                ..
            } = parameter;
            if !lower_bound.is_finite() || !upper_bound.is_finite() || lower_bound > upper_bound {
                return Err(McmcError::InvalidBounds {
                    label: label.clone(),
                    lower: *lower_bound,
                    upper: *upper_bound,
                });
            }
            if !value.is_finite() || !parameter.contains(*value) {
                return Err(McmcError::ValueOutOfBounds {
                    label: label.clone(),
                    value: *value,
                    lower: *lower_bound,
                    upper: *upper_bound,
                });
            }
        }

        let active: Box<[bool]> = parameters.iter().map(Parameter::is_active).collect();
        if !active.iter().any(|&active| active) {
            return Err(McmcError::NoActiveParameters);
        }

        Ok(Self {
            parameters: parameters.into(),
            active,
        })
    }

    pub fn from_registry<R: ParameterRegistry + ?Sized>(registry: &R) -> Result<Self> {
        Self::new(registry.parameters())
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&active| active).count()
    }

    /// Mask of the parameters proposals are allowed to move.
    pub fn active(&self) -> &[bool] {
        &self.active
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Parameter> {
        self.parameters.get(index)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.label.as_str())
    }

    pub fn values(&self) -> Box<[f64]> {
        self.parameters.iter().map(|p| p.value).collect()
    }

    pub fn bound_ranges(&self) -> Box<[f64]> {
        self.parameters.iter().map(Parameter::range).collect()
    }

    /// Index of the last coordinate of `values` outside its bounds.
    pub fn last_violation(&self, values: &[f64]) -> Option<usize> {
        assert!(values.len() == self.len());
        self.parameters
            .iter()
            .zip(values)
            .rposition(|(parameter, &value)| !parameter.contains(value))
    }

    pub fn within_bounds(&self, values: &[f64]) -> bool {
        self.last_violation(values).is_none()
    }

    /// Step size used when none is configured.
    pub fn default_step_size(&self) -> f64 {
        2.4 * (self.active_count() as f64).powf(-0.5)
    }
}
