//! Unconstrained subproblem: L-BFGS with More-Thuente line search.

use argmin::core::{Executor, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use dipoa_core::linalg::norm2;
use tracing::{debug, trace, warn};

use super::{AugmentedLagrangian, LocalSolution, LocalSolverConfig};
use crate::error::LocalSolveError;

/// Gradient norm below which the start point already solves the subproblem.
const STATIONARY_GRAD: f64 = 1e-10;

/// Minimise `problem` starting from `start`.
///
/// Invalid tolerances are a setup error. A run that fails at an already
/// stationary start (the line search has nowhere to go) keeps the start
/// point; any other run failure also keeps it but is reported at warn level.
pub(super) fn minimize(
    worker: usize,
    problem: &AugmentedLagrangian<'_>,
    start: &[f64],
    config: &LocalSolverConfig,
) -> Result<LocalSolution, LocalSolveError> {
    let setup = |e: argmin::core::Error| LocalSolveError::Setup {
        worker,
        message: format!("L-BFGS: {e}"),
    };
    let solver = LBFGS::new(MoreThuenteLineSearch::new(), config.lbfgs_memory)
        .with_tolerance_grad(config.tolerance_grad)
        .map_err(setup)?
        .with_tolerance_cost(config.tolerance_cost)
        .map_err(setup)?;

    let mut x = start.to_vec();
    let result = Executor::new(*problem, solver)
        .configure(|state| state.param(start.to_vec()).max_iters(config.lbfgs_max_iters))
        .run();
    match result {
        Ok(res) => {
            trace!(iters = res.state().get_iter(), "L-BFGS finished");
            if let Some(best) = res.state().get_best_param() {
                x = best.clone();
            }
        }
        Err(e) => {
            let grad = norm2(&problem.gradient(start));
            if grad <= config.tolerance_grad.max(STATIONARY_GRAD) {
                debug!(worker, "L-BFGS stopped at a stationary start: {e}");
            } else {
                warn!(worker, grad, "L-BFGS failed, keeping start point: {e}");
            }
        }
    }

    let value = problem.value(&x);
    Ok(LocalSolution { x, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dipoa_core::{DenseMatrix, LocalObjective, QuadraticObjective};

    #[test]
    fn test_minimises_shifted_quadratic() {
        // f = ‖x‖² − 2·(1, 2)ᵀx, augmented with ρ = 1 around z = 0
        let obj = LocalObjective::Quadratic(
            QuadraticObjective::new(DenseMatrix::identity(2), vec![-2.0, -4.0]).unwrap(),
        );
        let z = [0.0, 0.0];
        let y = [0.0, 0.0];
        let problem = AugmentedLagrangian {
            objective: &obj,
            z: &z,
            y: &y,
            rho: 1.0,
        };
        let sol = minimize(0, &problem, &z, &LocalSolverConfig::default()).unwrap();
        // 3x = (2, 4)
        assert!((sol.x[0] - 2.0 / 3.0).abs() < 1e-6);
        assert!((sol.x[1] - 4.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_stationary_start_is_kept() {
        let obj = LocalObjective::Quadratic(
            QuadraticObjective::new(DenseMatrix::identity(2), vec![0.0, 0.0]).unwrap(),
        );
        let z = [0.0, 0.0];
        let problem = AugmentedLagrangian {
            objective: &obj,
            z: &z,
            y: &z,
            rho: 1.0,
        };
        let sol = minimize(0, &problem, &z, &LocalSolverConfig::default()).unwrap();
        assert!(sol.x.iter().all(|v| v.abs() < 1e-12));
        assert!(sol.value.abs() < 1e-20);
    }

    #[test]
    fn test_negative_tolerance_is_setup_error() {
        let obj = LocalObjective::Quadratic(
            QuadraticObjective::new(DenseMatrix::identity(2), vec![1.0, 1.0]).unwrap(),
        );
        let z = [0.0, 0.0];
        let problem = AugmentedLagrangian {
            objective: &obj,
            z: &z,
            y: &z,
            rho: 1.0,
        };
        let config = LocalSolverConfig {
            tolerance_grad: -1.0,
            ..LocalSolverConfig::default()
        };
        let err = minimize(4, &problem, &z, &config).unwrap_err();
        assert!(matches!(err, LocalSolveError::Setup { worker: 4, .. }));
    }
}
