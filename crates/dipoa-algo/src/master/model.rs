//! Conic relaxation of the master problem.
//!
//! Variable layout: `[alpha (N) | x (n) | delta (n)]`.

use dipoa_core::linalg::dot;

use super::MasterProblem;
use crate::conic::{ConicModel, ConicOutcome, SparseRow, SquaredTerm};
use crate::cuts::CutStore;

/// Per-variable fixings of `delta` at a search node.
pub type NodeFixings = Vec<Option<bool>>;

/// Cuts and cardinality row, shared by every node of one master solve.
pub struct MasterModel {
    problem: MasterProblem,
    base: ConicModel,
}

impl MasterModel {
    pub fn new(problem: &MasterProblem, cuts: &CutStore, conic_max_iters: u32) -> Self {
        let n_var = problem.workers + 2 * problem.dimension;
        let mut base = ConicModel::new(n_var).with_max_iter(conic_max_iters);
        let layout = Layout::new(problem);

        for s in 0..problem.workers {
            base.add_linear_objective(layout.alpha(s), 1.0);
        }

        for (slot, cut) in cuts.slotted_objective_cuts(problem.workers) {
            let mut linear = layout.x_row(&cut.gx);
            linear.push((layout.alpha(slot), -1.0));
            let constant = cut.fx - dot(&cut.gx, &cut.x);
            let eig = if problem.curvature_cuts { cut.eig } else { None };
            push_cut(&mut base, &layout, &cut.x, eig, &linear, constant);
        }

        for cut in cuts.constraint_cuts() {
            let linear = layout.x_row(&cut.ggx);
            let constant = cut.gx - dot(&cut.ggx, &cut.x);
            let eig = if problem.curvature_cuts { cut.eig_g } else { None };
            push_cut(&mut base, &layout, &cut.x, eig, &linear, constant);
        }

        // Σ delta <= kappa
        let cardinality: SparseRow = (0..problem.dimension)
            .map(|j| (layout.delta(j), 1.0))
            .collect();
        base.push_leq(&cardinality, problem.kappa as f64);

        Self {
            problem: *problem,
            base,
        }
    }

    /// Solve the relaxation with `delta` restricted by `fixings`.
    ///
    /// Returns `(objective, x, delta)` on success.
    pub fn solve_relaxation(&self, fixings: &[Option<bool>]) -> RelaxationOutcome {
        let layout = Layout::new(&self.problem);
        let m = self.problem.bound;
        let mut model = self.base.clone();

        for j in 0..self.problem.dimension {
            let (x, d) = (layout.x(j), layout.delta(j));
            match fixings.get(j).copied().flatten() {
                Some(false) => {
                    model.push_eq(&[(d, 1.0)], 0.0);
                    model.push_eq(&[(x, 1.0)], 0.0);
                }
                Some(true) => {
                    model.push_eq(&[(d, 1.0)], 1.0);
                    model.push_leq(&[(x, 1.0), (d, -m)], 0.0);
                    model.push_leq(&[(x, -1.0), (d, -m)], 0.0);
                }
                None => {
                    model.push_leq(&[(d, -1.0)], 0.0);
                    model.push_leq(&[(d, 1.0)], 1.0);
                    model.push_leq(&[(x, 1.0), (d, -m)], 0.0);
                    model.push_leq(&[(x, -1.0), (d, -m)], 0.0);
                }
            }
        }

        match model.solve() {
            ConicOutcome::Optimal { x: sol, objective } => {
                let n = self.problem.dimension;
                let x_start = layout.x(0);
                let d_start = layout.delta(0);
                RelaxationOutcome::Optimal {
                    objective,
                    x: sol[x_start..x_start + n].to_vec(),
                    delta: sol[d_start..d_start + n].to_vec(),
                }
            }
            ConicOutcome::Infeasible => RelaxationOutcome::Infeasible,
            ConicOutcome::Unbounded => RelaxationOutcome::Unbounded,
            ConicOutcome::Failed(status) => RelaxationOutcome::Failed(status),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RelaxationOutcome {
    Optimal {
        objective: f64,
        x: Vec<f64>,
        delta: Vec<f64>,
    },
    Infeasible,
    Unbounded,
    Failed(String),
}

#[derive(Clone, Copy)]
struct Layout {
    workers: usize,
    dimension: usize,
}

impl Layout {
    fn new(problem: &MasterProblem) -> Self {
        Self {
            workers: problem.workers,
            dimension: problem.dimension,
        }
    }

    fn alpha(&self, s: usize) -> usize {
        s
    }

    fn x(&self, j: usize) -> usize {
        self.workers + j
    }

    fn delta(&self, j: usize) -> usize {
        self.workers + self.dimension + j
    }

    fn x_row(&self, coeffs: &[f64]) -> SparseRow {
        coeffs
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0)
            .map(|(j, &v)| (self.x(j), v))
            .collect()
    }
}

/// `eig/2·‖x − center‖² + linearᵀ(vars) + constant <= 0`.
///
/// Negative curvature is clamped to zero so the row stays convex.
fn push_cut(
    model: &mut ConicModel,
    layout: &Layout,
    center: &[f64],
    eig: Option<f64>,
    linear: &[(usize, f64)],
    constant: f64,
) {
    let weight = eig.map(|e| e.max(0.0)).unwrap_or(0.0);
    if weight <= 0.0 {
        model.push_leq(linear, -constant);
        return;
    }
    let scale = (weight / 2.0).sqrt();
    let terms: Vec<SquaredTerm> = center
        .iter()
        .enumerate()
        .map(|(j, &c)| SquaredTerm {
            coeffs: vec![(layout.x(j), scale)],
            offset: scale * c,
        })
        .collect();
    model.push_convex_quadratic_leq(&terms, linear, constant);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem(workers: usize, dimension: usize, kappa: usize, curvature_cuts: bool) -> MasterProblem {
        MasterProblem {
            dimension,
            workers,
            bound: 10.0,
            kappa,
            curvature_cuts,
        }
    }

    #[test]
    fn test_layout() {
        let layout = Layout::new(&problem(3, 2, 1, false));
        assert_eq!(layout.alpha(2), 2);
        assert_eq!(layout.x(0), 3);
        assert_eq!(layout.delta(1), 6);
    }

    #[test]
    fn test_relaxation_of_single_linear_cut() {
        // alpha >= 1 + (x - 0)·1  →  x pushed to -M·delta, Σdelta <= 1
        let mut cuts = CutStore::new();
        cuts.store_cut(0, 0, vec![0.0], 1.0, vec![1.0], None);
        let model = MasterModel::new(&problem(1, 1, 1, false), &cuts, 200);

        match model.solve_relaxation(&[None]) {
            RelaxationOutcome::Optimal {
                objective, x, delta, ..
            } => {
                assert!((objective + 9.0).abs() < 1e-5);
                assert!((x[0] + 10.0).abs() < 1e-5);
                assert!((delta[0] - 1.0).abs() < 1e-5);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        match model.solve_relaxation(&[Some(false)]) {
            RelaxationOutcome::Optimal { objective, x, .. } => {
                assert!((objective - 1.0).abs() < 1e-5);
                assert!(x[0].abs() < 1e-6);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_curvature_cut_tightens_bound() {
        // f(x) = x² − 2x at x0 = 0: fx = 0, g = −2, eig = 2
        let mut cuts = CutStore::new();
        cuts.store_cut(0, 0, vec![0.0], 0.0, vec![-2.0], Some(2.0));

        let linear = MasterModel::new(&problem(1, 1, 1, false), &cuts, 200);
        let curved = MasterModel::new(&problem(1, 1, 1, true), &cuts, 200);

        let lb = |m: &MasterModel| match m.solve_relaxation(&[None]) {
            RelaxationOutcome::Optimal { objective, .. } => objective,
            other => panic!("unexpected outcome {:?}", other),
        };
        // linear: −2·10; curved recovers min f = −1
        assert!((lb(&linear) + 20.0).abs() < 1e-5);
        assert!((lb(&curved) + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_negative_curvature_is_clamped() {
        let mut cuts = CutStore::new();
        cuts.store_cut(0, 0, vec![0.0], 0.0, vec![-2.0], Some(-5.0));
        let model = MasterModel::new(&problem(1, 1, 1, true), &cuts, 200);
        match model.solve_relaxation(&[None]) {
            RelaxationOutcome::Optimal { objective, .. } => {
                assert!((objective + 20.0).abs() < 1e-5)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
