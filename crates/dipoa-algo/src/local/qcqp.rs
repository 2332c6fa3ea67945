//! Constrained subproblem: quadratic objective, one convex quadratic
//! constraint, solved as a conic program.
//!
//! With `f(x) = xᵀQx + qᵀx` the augmented Lagrangian is
//!
//! ```text
//! ½ xᵀ(2Q + ρI)x + (q + y − ρz)ᵀx + (ρ/2·‖z‖² − yᵀz)
//! ```
//!
//! and `xᵀPx + cᵀx + d <= 0` becomes one second-order cone through the
//! factorisation `P = FᵀF`.

use dipoa_core::linalg::dot;
use dipoa_core::{LocalObjective, QuadraticConstraint};

use super::{AugmentedLagrangian, LocalSolution, LocalSolverConfig};
use crate::conic::{ConicModel, ConicOutcome, SparseRow, SquaredTerm};
use crate::error::LocalSolveError;

pub(super) fn minimize(
    worker: usize,
    problem: &AugmentedLagrangian<'_>,
    constraint: &QuadraticConstraint,
    factor: &[Vec<f64>],
    config: &LocalSolverConfig,
) -> Result<LocalSolution, LocalSolveError> {
    let quadratic = match problem.objective {
        LocalObjective::Quadratic(q) => q,
        LocalObjective::Logistic(_) => {
            return Err(LocalSolveError::Unsupported {
                worker,
                reason: "the constrained local solver needs a quadratic objective".into(),
            })
        }
    };

    let n = quadratic.dimension();
    let q_mat = quadratic.quadratic_term();
    let mut model = ConicModel::new(n).with_max_iter(config.conic_max_iters);

    for j in 0..n {
        for i in 0..=j {
            let mut v = 2.0 * q_mat.get(i, j);
            if i == j {
                v += problem.rho;
            }
            if v != 0.0 {
                model.add_quadratic_objective(i, j, v);
            }
        }
        let lin = quadratic.linear_term()[j] + problem.y[j] - problem.rho * problem.z[j];
        model.add_linear_objective(j, lin);
    }
    model.add_objective_constant(
        0.5 * problem.rho * dot(problem.z, problem.z) - dot(problem.y, problem.z),
    );

    let terms: Vec<SquaredTerm> = factor
        .iter()
        .map(|row| SquaredTerm {
            coeffs: sparse(row),
            offset: 0.0,
        })
        .collect();
    model.push_convex_quadratic_leq(&terms, &sparse(constraint.linear_term()), constraint.offset());

    match model.solve() {
        ConicOutcome::Optimal { x, .. } => {
            let value = problem.value(&x);
            Ok(LocalSolution { x, value })
        }
        ConicOutcome::Infeasible => Err(LocalSolveError::Conic {
            worker,
            status: "PrimalInfeasible".into(),
        }),
        ConicOutcome::Unbounded => Err(LocalSolveError::Conic {
            worker,
            status: "DualInfeasible".into(),
        }),
        ConicOutcome::Failed(status) => Err(LocalSolveError::Conic { worker, status }),
    }
}

fn sparse(dense: &[f64]) -> SparseRow {
    dense
        .iter()
        .enumerate()
        .filter(|(_, &v)| v != 0.0)
        .map(|(j, &v)| (j, v))
        .collect()
}
