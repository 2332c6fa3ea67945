//! Seeded synthetic instances for both problem families.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    LocalObjective, LogisticLoss, ProblemFamily, ProblemInstance, ProblemOptions,
    QuadraticConstraint, QuadraticObjective,
};
use crate::error::{ProblemError, ProblemResult};
use crate::linalg::{norm2, DenseMatrix};

/// Labels are `1` where a standard normal draw reaches this threshold.
const LABEL_THRESHOLD: f64 = 0.5;
/// Diagonal shift that keeps generated objective matrices positive definite.
const OBJECTIVE_RIDGE: f64 = 0.1;
const CONSTRAINT_LINEAR_SCALE: f64 = 0.1;
const CONSTRAINT_OFFSET: f64 = -1.0;

/// Parameters of a synthetic instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSpec {
    pub family: ProblemFamily,
    /// `n`
    pub dimension: usize,
    /// Samples per worker (logistic regression only).
    pub samples: usize,
    /// `κ`
    pub sparsity: usize,
    /// `N`
    pub workers: usize,
    /// `M`
    pub bound: f64,
    pub seed: u64,
    pub options: ProblemOptions,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            family: ProblemFamily::SparseLogisticRegression,
            dimension: 10,
            samples: 1000,
            sparsity: 2,
            workers: 2,
            bound: 0.16,
            seed: 0,
            options: ProblemOptions::default(),
        }
    }
}

impl SyntheticSpec {
    /// Default scenario of a family.
    pub fn for_family(family: ProblemFamily) -> Self {
        Self {
            family,
            ..Self::default()
        }
    }

    /// Draw the instance. The same spec always yields the same instance.
    pub fn build(&self) -> ProblemResult<ProblemInstance> {
        if self.workers == 0 {
            return Err(ProblemError::InvalidParameter(
                "at least one worker is required".into(),
            ));
        }
        if self.dimension == 0 {
            return Err(ProblemError::InvalidParameter(
                "problem dimension must be positive".into(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        debug!(
            family = %self.family,
            n = self.dimension,
            workers = self.workers,
            seed = self.seed,
            "generating synthetic instance"
        );

        let (objectives, constraint) = match self.family {
            ProblemFamily::SparseLogisticRegression => {
                if self.samples == 0 {
                    return Err(ProblemError::InvalidParameter(
                        "logistic regression needs at least one sample per worker".into(),
                    ));
                }
                let objectives = (0..self.workers)
                    .map(|_| logistic_objective(&mut rng, self.samples, self.dimension))
                    .collect::<ProblemResult<Vec<_>>>()?;
                (objectives, None)
            }
            ProblemFamily::SparseQcqp => {
                let objectives = (0..self.workers)
                    .map(|_| quadratic_objective(&mut rng, self.dimension))
                    .collect::<ProblemResult<Vec<_>>>()?;
                let constraint = quadratic_constraint(&mut rng, self.dimension)?;
                (objectives, Some(constraint))
            }
        };

        ProblemInstance::new(
            self.family,
            objectives,
            constraint,
            self.sparsity,
            self.bound,
            self.options,
        )
    }
}

/// A named benchmark scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// `sc-1` .. `sc-5` for dslr, `sc-1` and `sc-2` for dsqcqp.
    pub name: &'static str,
    /// One spec per instance of the scenario; sweeps have several.
    pub instances: Vec<SyntheticSpec>,
}

/// Benchmark scenarios of a family for `workers` workers, seeded with `seed`.
///
/// Logistic scenarios fix the total sample count, split evenly over the
/// workers.
pub fn scenarios(family: ProblemFamily, workers: usize, seed: u64) -> Vec<Scenario> {
    let base = SyntheticSpec {
        seed,
        workers,
        ..SyntheticSpec::for_family(family)
    };
    let logistic = |rows: usize, cols: usize| SyntheticSpec {
        samples: (rows / workers.max(1)).max(1),
        dimension: cols,
        ..base.clone()
    };
    let qcqp = |n: usize| SyntheticSpec {
        dimension: n,
        ..base.clone()
    };

    match family {
        ProblemFamily::SparseLogisticRegression => vec![
            Scenario {
                name: "sc-1",
                instances: (2_000..54_000)
                    .step_by(4_000)
                    .map(|rows| logistic(rows, 20))
                    .collect(),
            },
            Scenario {
                name: "sc-2",
                instances: (40..220)
                    .step_by(20)
                    .map(|cols| logistic(50_000, cols))
                    .collect(),
            },
            Scenario {
                name: "sc-3",
                instances: vec![logistic(10_000, 20)],
            },
            Scenario {
                name: "sc-4",
                instances: vec![logistic(100_000, 200)],
            },
            Scenario {
                name: "sc-5",
                instances: vec![logistic(300_000, 300)],
            },
        ],
        ProblemFamily::SparseQcqp => vec![
            Scenario {
                name: "sc-1",
                instances: vec![qcqp(100)],
            },
            Scenario {
                name: "sc-2",
                instances: vec![qcqp(200)],
            },
        ],
    }
}

/// Look up a scenario by name.
pub fn scenario(
    family: ProblemFamily,
    name: &str,
    workers: usize,
    seed: u64,
) -> ProblemResult<Scenario> {
    scenarios(family, workers, seed)
        .into_iter()
        .find(|sc| sc.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            ProblemError::InvalidParameter(format!("unknown {family} scenario '{name}'"))
        })
}

fn randn_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> DenseMatrix {
    DenseMatrix::from_fn(rows, cols, |_, _| rng.sample(StandardNormal))
}

fn randn_vec(rng: &mut StdRng, len: usize) -> Vec<f64> {
    (0..len).map(|_| rng.sample(StandardNormal)).collect()
}

fn logistic_objective(
    rng: &mut StdRng,
    samples: usize,
    n: usize,
) -> ProblemResult<LocalObjective> {
    let mut features = randn_matrix(rng, samples, n);
    for r in 0..samples {
        let row = features.row_mut(r);
        let norm = norm2(row);
        if norm > 0.0 {
            row.iter_mut().for_each(|v| *v /= norm);
        }
    }
    let labels = (0..samples)
        .map(|_| {
            let draw: f64 = rng.sample(StandardNormal);
            if draw >= LABEL_THRESHOLD {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    Ok(LocalObjective::Logistic(LogisticLoss::new(features, labels)?))
}

/// `Q = BᵀB/n + 0.1·I`, `q ~ N(0, I)`.
fn quadratic_objective(rng: &mut StdRng, n: usize) -> ProblemResult<LocalObjective> {
    let b = randn_matrix(rng, n, n);
    let mut q_mat = b.gram().scaled(1.0 / n as f64);
    for i in 0..n {
        let v = q_mat.get(i, i) + OBJECTIVE_RIDGE;
        q_mat.set(i, i, v);
    }
    let q = randn_vec(rng, n);
    Ok(LocalObjective::Quadratic(QuadraticObjective::new(q_mat, q)?))
}

/// `P = CᵀC/n`, `c = 0.1·N(0, I)`, `d = -1`; the origin is strictly feasible.
fn quadratic_constraint(rng: &mut StdRng, n: usize) -> ProblemResult<QuadraticConstraint> {
    let c_mat = randn_matrix(rng, n, n);
    let p = c_mat.gram().scaled(1.0 / n as f64);
    let c = randn_vec(rng, n)
        .into_iter()
        .map(|v| CONSTRAINT_LINEAR_SCALE * v)
        .collect();
    QuadraticConstraint::new(p, c, CONSTRAINT_OFFSET)
}
