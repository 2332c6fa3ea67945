//! Per-worker subproblem solvers.
//!
//! Each consensus iteration asks every worker for
//!
//! ```text
//! x = argmin  f_i(x) + yᵀ(x − z) + ρ/2·‖x − z‖²
//!     s.t.    g(x) <= 0            (when the instance has a constraint)
//! ```
//!
//! Without a constraint the augmented objective is smooth and strongly
//! convex and goes to L-BFGS. With one, the objective must be quadratic and
//! the subproblem is solved as a conic QCQP.

mod lbfgs;
mod qcqp;

use argmin::core::{CostFunction, Gradient};
use dipoa_core::linalg::psd_factor;
use dipoa_core::{LocalObjective, ProblemInstance};
use serde::{Deserialize, Serialize};

use crate::error::{DipoaError, DipoaResult, LocalSolveError};

/// Settings shared by the local solvers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSolverConfig {
    /// L-BFGS history length.
    pub lbfgs_memory: usize,
    /// L-BFGS iteration cap per subproblem.
    pub lbfgs_max_iters: u64,
    /// Gradient-norm stopping tolerance for L-BFGS.
    pub tolerance_grad: f64,
    /// Relative cost-change stopping tolerance for L-BFGS.
    pub tolerance_cost: f64,
    /// Interior-point iteration cap for the conic subproblem.
    pub conic_max_iters: u32,
}

impl Default for LocalSolverConfig {
    fn default() -> Self {
        Self {
            lbfgs_memory: 7,
            lbfgs_max_iters: 200,
            tolerance_grad: 1e-8,
            tolerance_cost: 1e-12,
            conic_max_iters: 200,
        }
    }
}

impl LocalSolverConfig {
    pub fn validate(&self) -> DipoaResult<()> {
        if self.lbfgs_memory == 0 {
            return Err(DipoaError::InvalidConfig(
                "local lbfgs_memory must be at least 1".into(),
            ));
        }
        if self.lbfgs_max_iters == 0 || self.conic_max_iters == 0 {
            return Err(DipoaError::InvalidConfig(
                "local iteration caps must be positive".into(),
            ));
        }
        for (name, tol) in [
            ("tolerance_grad", self.tolerance_grad),
            ("tolerance_cost", self.tolerance_cost),
        ] {
            if !(tol >= 0.0 && tol.is_finite()) {
                return Err(DipoaError::InvalidConfig(format!(
                    "local {name} must be non-negative, got {tol}"
                )));
            }
        }
        Ok(())
    }
}

/// `L(x) = f(x) + yᵀ(x − z) + ρ/2·‖x − z‖²`
#[derive(Debug, Clone, Copy)]
pub struct AugmentedLagrangian<'a> {
    pub objective: &'a LocalObjective,
    pub z: &'a [f64],
    pub y: &'a [f64],
    pub rho: f64,
}

impl AugmentedLagrangian<'_> {
    pub fn value(&self, x: &[f64]) -> f64 {
        let mut aug = self.objective.value(x);
        let mut sq = 0.0;
        for ((xi, zi), yi) in x.iter().zip(self.z).zip(self.y) {
            let d = xi - zi;
            aug += yi * d;
            sq += d * d;
        }
        aug + 0.5 * self.rho * sq
    }

    pub fn gradient(&self, x: &[f64]) -> Vec<f64> {
        let mut g = self.objective.gradient(x);
        for (((gi, xi), zi), yi) in g.iter_mut().zip(x).zip(self.z).zip(self.y) {
            *gi += yi + self.rho * (xi - zi);
        }
        g
    }
}

impl CostFunction for AugmentedLagrangian<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.value(x))
    }
}

impl Gradient for AugmentedLagrangian<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        Ok(AugmentedLagrangian::gradient(self, x))
    }
}

/// Minimiser of a local subproblem and its augmented objective value.
#[derive(Debug, Clone)]
pub struct LocalSolution {
    pub x: Vec<f64>,
    pub value: f64,
}

/// Picks the subproblem solver for an instance and caches what can be
/// computed once per run (the constraint factorisation).
pub struct LocalSolver<'a> {
    instance: &'a ProblemInstance,
    config: LocalSolverConfig,
    /// Rows `f_k` with `xᵀPx = Σ_k (f_kᵀx)²`.
    constraint_factor: Option<Vec<Vec<f64>>>,
}

impl<'a> LocalSolver<'a> {
    pub fn new(instance: &'a ProblemInstance, config: LocalSolverConfig) -> Self {
        let constraint_factor = instance
            .constraint()
            .map(|g| psd_factor(g.quadratic_term()));
        Self {
            instance,
            config,
            constraint_factor,
        }
    }

    pub fn config(&self) -> &LocalSolverConfig {
        &self.config
    }

    /// Minimise worker `worker`'s augmented Lagrangian around `z`.
    pub fn minimize(
        &self,
        worker: usize,
        y: &[f64],
        z: &[f64],
        rho: f64,
    ) -> Result<LocalSolution, LocalSolveError> {
        let objective = self
            .instance
            .objective(worker)
            .ok_or_else(|| LocalSolveError::Unsupported {
                worker,
                reason: format!(
                    "no local objective for worker {worker} ({} workers)",
                    self.instance.workers()
                ),
            })?;
        let problem = AugmentedLagrangian {
            objective,
            z,
            y,
            rho,
        };

        match (self.instance.constraint(), &self.constraint_factor) {
            (Some(constraint), Some(factor)) => {
                qcqp::minimize(worker, &problem, constraint, factor, &self.config)
            }
            _ => lbfgs::minimize(worker, &problem, z, &self.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dipoa_core::{DenseMatrix, QuadraticObjective};

    fn identity_objective(n: usize) -> LocalObjective {
        LocalObjective::Quadratic(
            QuadraticObjective::new(DenseMatrix::identity(n), vec![0.0; n]).unwrap(),
        )
    }

    #[test]
    fn test_augmented_value_and_gradient() {
        let obj = identity_objective(2);
        let z = [1.0, 0.0];
        let y = [0.5, -1.0];
        let aug = AugmentedLagrangian {
            objective: &obj,
            z: &z,
            y: &y,
            rho: 2.0,
        };
        let x = [2.0, 1.0];
        // 5 + (0.5 - 1) + 1·(1 + 1)
        assert!((aug.value(&x) - 6.5).abs() < 1e-12);
        // 2x + y + ρ(x - z)
        assert_eq!(aug.gradient(&x), vec![4.0 + 0.5 + 2.0, 2.0 - 1.0 + 2.0]);
    }

    #[test]
    fn test_config_validation() {
        assert!(LocalSolverConfig::default().validate().is_ok());
        let bad = LocalSolverConfig {
            tolerance_cost: -1e-3,
            ..LocalSolverConfig::default()
        };
        assert!(matches!(bad.validate(), Err(DipoaError::InvalidConfig(_))));
        let bad = LocalSolverConfig {
            lbfgs_memory: 0,
            ..LocalSolverConfig::default()
        };
        assert!(matches!(bad.validate(), Err(DipoaError::InvalidConfig(_))));
    }
}
