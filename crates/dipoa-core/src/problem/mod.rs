//! Problem families and immutable problem instances.
//!
//! An instance is the separable MINLP
//!
//! ```text
//! minimize    Σ_i f_i(x)
//! subject to  g(x) <= 0                 (optional)
//!             -M·δ_j <= x_j <= M·δ_j
//!             Σ_j δ_j <= κ,  δ ∈ {0,1}^n
//! ```
//!
//! with one local objective `f_i` per worker.

mod generate;
mod logistic;
mod quadratic;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProblemError, ProblemResult};
use crate::linalg::{min_eigenvalue, DenseMatrix};

pub use generate::{scenario, scenarios, Scenario, SyntheticSpec};
pub use logistic::{sigmoid, softplus, LogisticLoss};
pub use quadratic::{QuadraticConstraint, QuadraticObjective};

/// Supported problem classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProblemFamily {
    /// Distributed sparse logistic regression.
    #[serde(rename = "dslr")]
    SparseLogisticRegression,
    /// Distributed sparse QCQP.
    #[serde(rename = "dsqcqp")]
    SparseQcqp,
}

impl ProblemFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemFamily::SparseLogisticRegression => "dslr",
            ProblemFamily::SparseQcqp => "dsqcqp",
        }
    }
}

impl fmt::Display for ProblemFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemFamily {
    type Err = ProblemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dslr" => Ok(ProblemFamily::SparseLogisticRegression),
            "dsqcqp" => Ok(ProblemFamily::SparseQcqp),
            other => Err(ProblemError::UnsupportedFamily(other.to_string())),
        }
    }
}

/// Run-wide switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemOptions {
    /// Compute an initial support pattern with the warm-start heuristic
    /// instead of starting from all zeros.
    pub warm_start: bool,
    /// Add curvature terms to the cuts (second-order cone cuts).
    pub curvature_cuts: bool,
}

/// One worker's term of the objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalObjective {
    Logistic(LogisticLoss),
    Quadratic(QuadraticObjective),
}

impl LocalObjective {
    pub fn dimension(&self) -> usize {
        match self {
            LocalObjective::Logistic(l) => l.dimension(),
            LocalObjective::Quadratic(q) => q.dimension(),
        }
    }

    pub fn value(&self, x: &[f64]) -> f64 {
        match self {
            LocalObjective::Logistic(l) => l.value(x),
            LocalObjective::Quadratic(q) => q.value(x),
        }
    }

    pub fn gradient(&self, x: &[f64]) -> Vec<f64> {
        match self {
            LocalObjective::Logistic(l) => l.gradient(x),
            LocalObjective::Quadratic(q) => q.gradient(x),
        }
    }

    pub fn hessian(&self, x: &[f64]) -> DenseMatrix {
        match self {
            LocalObjective::Logistic(l) => l.hessian(x),
            LocalObjective::Quadratic(q) => q.hessian(),
        }
    }

    /// Whether the Hessian is independent of the evaluation point.
    pub fn has_constant_hessian(&self) -> bool {
        matches!(self, LocalObjective::Quadratic(_))
    }

    /// Smallest eigenvalue of the Hessian at `x`.
    pub fn min_curvature(&self, x: &[f64]) -> f64 {
        min_eigenvalue(&self.hessian(x))
    }
}

/// 0/1 support vector: `true` where `x_j` may be nonzero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupportPattern(Vec<bool>);

impl SupportPattern {
    pub fn zeros(n: usize) -> Self {
        Self(vec![false; n])
    }

    pub fn ones(n: usize) -> Self {
        Self(vec![true; n])
    }

    pub fn from_indices(n: usize, active: impl IntoIterator<Item = usize>) -> Self {
        let mut pattern = Self::zeros(n);
        for j in active {
            if j < n {
                pattern.0[j] = true;
            }
        }
        pattern
    }

    /// Round a (possibly relaxed) 0/1 vector at one half.
    pub fn from_values(values: &[f64]) -> Self {
        Self(values.iter().map(|&v| v > 0.5).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_active(&self, j: usize) -> bool {
        self.0.get(j).copied().unwrap_or(false)
    }

    /// Number of active entries.
    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&b| b).count()
    }

    pub fn active_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(j, &b)| b.then_some(j))
    }

    /// As a 0/1 float vector, for collectives.
    pub fn to_values(&self) -> Vec<f64> {
        self.0.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect()
    }
}

/// Everything that stays fixed during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemInstance {
    family: ProblemFamily,
    dimension: usize,
    kappa: usize,
    bound: f64,
    options: ProblemOptions,
    objectives: Vec<LocalObjective>,
    constraint: Option<QuadraticConstraint>,
}

impl ProblemInstance {
    /// Validate and assemble an instance. The worker count is the number of
    /// local objectives.
    pub fn new(
        family: ProblemFamily,
        objectives: Vec<LocalObjective>,
        constraint: Option<QuadraticConstraint>,
        kappa: usize,
        bound: f64,
        options: ProblemOptions,
    ) -> ProblemResult<Self> {
        let first = objectives.first().ok_or_else(|| {
            ProblemError::InvalidParameter("at least one local objective is required".into())
        })?;
        let dimension = first.dimension();
        if dimension == 0 {
            return Err(ProblemError::InvalidParameter(
                "problem dimension must be positive".into(),
            ));
        }
        for obj in &objectives {
            if obj.dimension() != dimension {
                return Err(ProblemError::DimensionMismatch {
                    context: "local objective",
                    expected: dimension,
                    found: obj.dimension(),
                });
            }
        }
        if let Some(g) = &constraint {
            if g.dimension() != dimension {
                return Err(ProblemError::DimensionMismatch {
                    context: "global constraint",
                    expected: dimension,
                    found: g.dimension(),
                });
            }
        }
        if kappa == 0 || kappa > dimension {
            return Err(ProblemError::InvalidParameter(format!(
                "sparsity budget must be in 1..={dimension}, got {kappa}"
            )));
        }
        if !(bound.is_finite() && bound > 0.0) {
            return Err(ProblemError::InvalidParameter(format!(
                "box bound must be positive and finite, got {bound}"
            )));
        }

        match family {
            ProblemFamily::SparseLogisticRegression => {
                if !objectives
                    .iter()
                    .all(|o| matches!(o, LocalObjective::Logistic(_)))
                {
                    return Err(ProblemError::Inconsistent(
                        "dslr instances need logistic objectives".into(),
                    ));
                }
                if constraint.is_some() {
                    return Err(ProblemError::Inconsistent(
                        "dslr instances have no global constraint".into(),
                    ));
                }
            }
            ProblemFamily::SparseQcqp => {
                if !objectives
                    .iter()
                    .all(|o| matches!(o, LocalObjective::Quadratic(_)))
                {
                    return Err(ProblemError::Inconsistent(
                        "dsqcqp instances need quadratic objectives".into(),
                    ));
                }
            }
        }

        Ok(Self {
            family,
            dimension,
            kappa,
            bound,
            options,
            objectives,
            constraint,
        })
    }

    pub fn family(&self) -> ProblemFamily {
        self.family
    }

    /// `n`
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// `N`
    pub fn workers(&self) -> usize {
        self.objectives.len()
    }

    /// `κ`
    pub fn kappa(&self) -> usize {
        self.kappa
    }

    /// `M`
    pub fn bound(&self) -> f64 {
        self.bound
    }

    pub fn options(&self) -> ProblemOptions {
        self.options
    }

    pub fn objective(&self, worker: usize) -> Option<&LocalObjective> {
        self.objectives.get(worker)
    }

    pub fn objectives(&self) -> &[LocalObjective] {
        &self.objectives
    }

    pub fn constraint(&self) -> Option<&QuadraticConstraint> {
        self.constraint.as_ref()
    }

    /// `Σ_i f_i(x)`
    pub fn total_objective(&self, x: &[f64]) -> f64 {
        self.objectives.iter().map(|o| o.value(x)).sum()
    }
}
