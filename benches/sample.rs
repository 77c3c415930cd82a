use std::convert::Infallible;

use assess_mcmc::{
    CholeskyFactor, Covariance, MetropolisSettings, Objective, ObjectiveScore, Parameter,
    ParameterRegistry, ParameterSet, ProposalDistribution, ProposalSampler,
};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::{rngs::StdRng, SeedableRng};

struct NormalObjective {
    parameters: Vec<Parameter>,
}

impl NormalObjective {
    fn new(dim: usize) -> Self {
        Self {
            parameters: (0..dim)
                .map(|i| Parameter::new(format!("p{}", i), 0., -50., 50.))
                .collect(),
        }
    }
}

impl ParameterRegistry for NormalObjective {
    fn parameters(&self) -> Vec<Parameter> {
        self.parameters.clone()
    }

    fn set_value(&mut self, index: usize, value: f64) {
        self.parameters[index].value = value;
    }
}

impl Objective for NormalObjective {
    type Error = Infallible;

    fn evaluate(&mut self, values: &[f64]) -> Result<ObjectiveScore, Infallible> {
        Ok(ObjectiveScore::from_score(
            values.iter().map(|x| 0.5 * x * x).sum(),
        ))
    }
}

fn correlated(dim: usize) -> Covariance {
    let rows: Vec<Vec<f64>> = (0..dim)
        .map(|i| {
            (0..dim)
                .map(|j| if i == j { 1. } else { 0.3 })
                .collect()
        })
        .collect();
    Covariance::from_rows(&rows).unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    for dim in [10, 100] {
        let covariance = correlated(dim);
        c.bench_function(&format!("cholesky {}", dim), |b| {
            b.iter(|| CholeskyFactor::new(black_box(&covariance)).unwrap())
        });

        let factor = CholeskyFactor::new(&covariance).unwrap();
        let parameters = ParameterSet::new(NormalObjective::new(dim).parameters()).unwrap();
        let current = vec![0.; dim];
        let proposal = ProposalSampler::new(ProposalDistribution::T, 4.).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        c.bench_function(&format!("propose t {}", dim), |b| {
            b.iter(|| {
                proposal
                    .draw(&factor, black_box(0.1), &current, &parameters, &mut rng)
                    .unwrap()
            })
        });

        let settings = MetropolisSettings {
            chain_length: 1000,
            keep: 10,
            ..Default::default()
        };
        c.bench_function(&format!("chain 1000 normal {}", dim), |b| {
            b.iter_batched(
                || (NormalObjective::new(dim), StdRng::seed_from_u64(42)),
                |(objective, rng)| {
                    assess_mcmc::sample_sequentially(&settings, objective, covariance.clone(), 0, rng)
                        .unwrap()
                },
                BatchSize::SmallInput,
            )
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
