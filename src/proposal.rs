use std::{fmt, str::FromStr};

use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::{
    cholesky::CholeskyFactor,
    error::{McmcError, Result},
    math::masked_jump,
    parameter::ParameterSet,
};

/// Candidates outside the bounds are redrawn at most this often.
pub const MAX_PROPOSAL_ATTEMPTS: usize = 1000;

/// Shape of the jump distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalDistribution {
    Normal,
    #[default]
    T,
}

impl FromStr for ProposalDistribution {
    type Err = McmcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(Self::Normal),
            "t" => Ok(Self::T),
            _ => Err(McmcError::UnsupportedOption {
                name: "proposal_distribution",
                value: s.to_string(),
                expected: "normal, t",
            }),
        }
    }
}

impl fmt::Display for ProposalDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::T => f.write_str("t"),
        }
    }
}

#[derive(Debug, Clone)]
enum Shape {
    Normal,
    StudentT { chi_squared: ChiSquared<f64>, df: f64 },
}

/// Draws bounded candidates around the current point.
///
/// Holds no state besides the distribution shape. All randomness comes
/// from the generator passed to [`ProposalSampler::draw`].
#[derive(Debug, Clone)]
pub struct ProposalSampler {
    shape: Shape,
}

impl ProposalSampler {
    pub fn new(distribution: ProposalDistribution, degrees_of_freedom: f64) -> Result<Self> {
        let shape = match distribution {
            ProposalDistribution::Normal => Shape::Normal,
            ProposalDistribution::T => {
                let chi_squared =
                    ChiSquared::new(degrees_of_freedom).map_err(|err| McmcError::InvalidSetting {
                        name: "degrees_of_freedom",
                        reason: err.to_string(),
                    })?;
                Shape::StudentT {
                    chi_squared,
                    df: degrees_of_freedom,
                }
            }
        };
        Ok(Self { shape })
    }

    pub fn normal() -> Self {
        Self {
            shape: Shape::Normal,
        }
    }

    pub fn distribution(&self) -> ProposalDistribution {
        match self.shape {
            Shape::Normal => ProposalDistribution::Normal,
            Shape::StudentT { .. } => ProposalDistribution::T,
        }
    }

    fn fill_noise<R: Rng + ?Sized>(&self, rng: &mut R, noise: &mut [f64]) {
        match &self.shape {
            Shape::Normal => noise
                .iter_mut()
                .for_each(|z| *z = StandardNormal.sample(rng)),
            Shape::StudentT { chi_squared, df } => noise.iter_mut().for_each(|z| {
                let normal: f64 = StandardNormal.sample(rng);
                let weight = 1. / (chi_squared.sample(rng) / *df);
                *z = normal * weight;
            }),
        }
    }

    /// A new candidate inside the bounds of `parameters`.
    ///
    /// Every attempt starts again from `current`. Only active parameters move.
    pub fn draw<R: Rng + ?Sized>(
        &self,
        factor: &CholeskyFactor,
        step_size: f64,
        current: &[f64],
        parameters: &ParameterSet,
        rng: &mut R,
    ) -> Result<Box<[f64]>> {
        self.draw_bounded(factor, step_size, current, parameters, rng)
            .map_err(|label| McmcError::CandidateGeneration {
                attempts: MAX_PROPOSAL_ATTEMPTS,
                label,
            })
    }

    fn draw_bounded<R: Rng + ?Sized>(
        &self,
        factor: &CholeskyFactor,
        scale: f64,
        current: &[f64],
        parameters: &ParameterSet,
        rng: &mut R,
    ) -> std::result::Result<Box<[f64]>, String> {
        let dim = parameters.len();
        assert!(current.len() == dim);
        assert!(factor.dim() == dim);

        let mut noise = vec![0.; dim];
        let mut jump = vec![0.; dim];
        let mut candidate = vec![0.; dim].into_boxed_slice();
        let mut offending = 0;

        for _ in 0..MAX_PROPOSAL_ATTEMPTS {
            self.fill_noise(rng, &mut noise);
            factor.mul_vec(&noise, &mut jump);
            masked_jump(current, &jump, parameters.active(), scale, &mut candidate);
            match parameters.last_violation(&candidate) {
                None => return Ok(candidate),
                Some(index) => offending = index,
            }
        }

        let label = parameters
            .get(offending)
            .map(|parameter| parameter.label.clone())
            .unwrap_or_default();
        Err(label)
    }
}

/// Perturb the starting point with a normal jump scaled by `start_multiplier`.
pub fn random_start<R: Rng + ?Sized>(
    current: &[f64],
    factor: &CholeskyFactor,
    start_multiplier: f64,
    parameters: &ParameterSet,
    rng: &mut R,
) -> Result<Box<[f64]>> {
    ProposalSampler::normal()
        .draw_bounded(factor, start_multiplier, current, parameters, rng)
        .map_err(|label| McmcError::RandomStart {
            attempts: MAX_PROPOSAL_ATTEMPTS,
            label,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{covariance::Covariance, parameter::Parameter};
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn setup() -> (ParameterSet, CholeskyFactor) {
        let parameters = ParameterSet::new(vec![
            Parameter::new("a", 0., -5., 5.),
            Parameter::new("b", 1., 1., 1.),
            Parameter::new("c", 0.5, 0., 1.),
        ])
        .unwrap();
        let cov = Covariance::from_rows(&[
            vec![1., 0.2, 0.1],
            vec![0.2, 1., 0.],
            vec![0.1, 0., 0.05],
        ])
        .unwrap();
        let factor = CholeskyFactor::new(&cov).unwrap();
        (parameters, factor)
    }

    #[test]
    fn candidates_stay_in_bounds() {
        let (parameters, factor) = setup();
        let mut rng = StdRng::seed_from_u64(42);
        for distribution in [ProposalDistribution::Normal, ProposalDistribution::T] {
            let sampler = ProposalSampler::new(distribution, 4.).unwrap();
            for _ in 0..500 {
                let candidate = sampler
                    .draw(&factor, 1., &[0., 1., 0.5], &parameters, &mut rng)
                    .unwrap();
                assert!(parameters.within_bounds(&candidate));
                assert_eq!(candidate[1], 1.);
            }
        }
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let parameters = ParameterSet::new(vec![
            Parameter::new("wide", 0., -1e3, 1e3),
            Parameter::new("narrow", 0., -1e-9, 1e-9),
        ])
        .unwrap();
        let factor = CholeskyFactor::new(&Covariance::from_diagonal(&[1., 1.])).unwrap();
        let sampler = ProposalSampler::new(ProposalDistribution::Normal, 4.).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let err = sampler
            .draw(&factor, 10., &[0., 0.], &parameters, &mut rng)
            .unwrap_err();
        match err {
            McmcError::CandidateGeneration { attempts, label } => {
                assert_eq!(attempts, MAX_PROPOSAL_ATTEMPTS);
                assert_eq!(label, "narrow");
            }
            other => panic!("unexpected error {other}"),
        }

        let err = random_start(&[0., 0.], &factor, 10., &parameters, &mut rng).unwrap_err();
        assert!(matches!(err, McmcError::RandomStart { .. }));
    }

    #[test]
    fn same_seed_same_candidate() {
        let (parameters, factor) = setup();
        let sampler = ProposalSampler::new(ProposalDistribution::T, 4.).unwrap();
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            sampler
                .draw(&factor, 0.5, &[0., 1., 0.5], &parameters, &mut rng)
                .unwrap()
        };
        assert_eq!(draw(3), draw(3));
        assert!(draw(3) != draw(4));
    }

    #[test]
    fn t_weights_are_applied_before_the_factor() {
        let parameters = ParameterSet::new(vec![
            Parameter::new("a", 0.5, -1e6, 1e6),
            Parameter::new("b", -1., -1e6, 1e6),
        ])
        .unwrap();
        // L = [[2, 0], [1, 2]]
        let cov = Covariance::from_rows(&[vec![4., 2.], vec![2., 5.]]).unwrap();
        let factor = CholeskyFactor::new(&cov).unwrap();
        let sampler = ProposalSampler::new(ProposalDistribution::T, 4.).unwrap();
        let step = 0.3;

        let mut rng = StdRng::seed_from_u64(7);
        let mut replay = rng.clone();
        let candidate = sampler
            .draw(&factor, step, &[0.5, -1.], &parameters, &mut rng)
            .unwrap();

        let chi_squared = ChiSquared::new(4.).unwrap();
        let mut weighted = [0.; 2];
        for value in weighted.iter_mut() {
            let z: f64 = StandardNormal.sample(&mut replay);
            let w = 4. / chi_squared.sample(&mut replay);
            *value = z * w;
        }
        let expected = [
            0.5 + step * 2. * weighted[0],
            -1. + step * (weighted[0] + 2. * weighted[1]),
        ];
        assert_abs_diff_eq!(candidate[0], expected[0], epsilon = 1e-12);
        assert_abs_diff_eq!(candidate[1], expected[1], epsilon = 1e-12);
    }

    #[test]
    fn invalid_degrees_of_freedom() {
        let err = ProposalSampler::new(ProposalDistribution::T, -1.).unwrap_err();
        assert!(matches!(
            err,
            McmcError::InvalidSetting {
                name: "degrees_of_freedom",
                ..
            }
        ));
        assert!(ProposalSampler::new(ProposalDistribution::Normal, -1.).is_ok());
    }

    #[test]
    fn parse_distribution() {
        assert_eq!("t".parse::<ProposalDistribution>().unwrap(), ProposalDistribution::T);
        assert_eq!(ProposalDistribution::Normal.to_string(), "normal");
        assert!("cauchy".parse::<ProposalDistribution>().is_err());
    }
}
