//! Integration tests for the branch-and-bound master.

use dipoa_algo::{BranchAndBound, CutStore, MasterConfig, MasterError, MasterProblem, MasterSolver};

fn problem(workers: usize, dimension: usize, kappa: usize, curvature_cuts: bool) -> MasterProblem {
    MasterProblem {
        dimension,
        workers,
        bound: 3.0,
        kappa,
        curvature_cuts,
    }
}

#[test]
fn test_round_robin_slots_shape_the_bound() {
    // slot 0 gets cuts 0 and 2 (alpha_0 >= |x|), slot 1 gets cut 1 (alpha_1 >= −2x)
    let mut cuts = CutStore::new();
    cuts.store_cut(0, 0, vec![0.0], 0.0, vec![1.0], None);
    cuts.store_cut(0, 1, vec![0.0], 0.0, vec![-2.0], None);
    cuts.store_cut(1, 0, vec![0.0], 0.0, vec![-1.0], None);

    let sol = BranchAndBound::default()
        .solve(&problem(2, 1, 1, false), &cuts)
        .unwrap();

    // |x| − 2x at x = M
    assert!((sol.lower_bound + 3.0).abs() < 1e-4, "lb = {}", sol.lower_bound);
    assert!((sol.x[0] - 3.0).abs() < 1e-4);
}

#[test]
fn test_exact_sparse_optimum_with_curvature_cuts() {
    // f(x) = ‖x − c‖² linearised at 0 with curvature 2 is exact; with κ = 1
    // the best support keeps the largest |c_j|.
    let c = [1.0, -2.0, 0.5];
    let fx: f64 = c.iter().map(|v| v * v).sum();
    let gx: Vec<f64> = c.iter().map(|v| -2.0 * v).collect();
    let mut cuts = CutStore::new();
    cuts.store_cut(0, 0, vec![0.0; 3], fx, gx, Some(2.0));

    let sol = BranchAndBound::default()
        .solve(&problem(1, 3, 1, true), &cuts)
        .unwrap();

    assert!((sol.lower_bound - 1.25).abs() < 1e-4, "lb = {}", sol.lower_bound);
    assert_eq!(sol.support.active_indices().collect::<Vec<_>>(), vec![1]);
    assert!((sol.x[1] + 2.0).abs() < 1e-3);
    assert!(sol.x[0].abs() < 1e-3 && sol.x[2].abs() < 1e-3);
}

#[test]
fn test_cardinality_holds_for_every_kappa() {
    let c = [0.7, -1.5, 2.0, 0.1];
    let fx: f64 = c.iter().map(|v| v * v).sum();
    let gx: Vec<f64> = c.iter().map(|v| -2.0 * v).collect();
    let mut cuts = CutStore::new();
    cuts.store_cut(0, 0, vec![0.0; 4], fx, gx, Some(2.0));

    let mut previous = f64::INFINITY;
    for kappa in 1..=4 {
        let sol = BranchAndBound::default()
            .solve(&problem(1, 4, kappa, true), &cuts)
            .unwrap();
        assert!(sol.support.count() <= kappa);
        let nonzero = sol.x.iter().filter(|v| v.abs() > 1e-4).count();
        assert!(nonzero <= kappa);
        // a larger budget never hurts
        assert!(sol.lower_bound <= previous + 1e-6);
        previous = sol.lower_bound;
    }
    // full support recovers min f = 0
    assert!(previous.abs() < 1e-4);
}

#[test]
fn test_uncovered_slot_is_unbounded() {
    let cuts = CutStore::new();
    let err = BranchAndBound::default()
        .solve(&problem(1, 2, 1, false), &cuts)
        .unwrap_err();
    assert!(matches!(err, MasterError::Unbounded { cuts: 0, slots: 1 }));
}

#[test]
fn test_infeasible_constraint_cut() {
    let mut cuts = CutStore::new();
    cuts.store_cut(0, 0, vec![0.0], 0.0, vec![1.0], None);
    // 1 + 0·(x − 0) <= 0
    cuts.store_constraint_cut(vec![0.0], 1.0, vec![0.0], None);
    let err = BranchAndBound::default()
        .solve(&problem(1, 1, 1, false), &cuts)
        .unwrap_err();
    assert!(matches!(err, MasterError::Infeasible));
}

#[test]
fn test_constraint_cut_limits_the_point() {
    // alpha >= −x, and x − 1 <= 0 from the constraint cut
    let mut cuts = CutStore::new();
    cuts.store_cut(0, 0, vec![0.0], 0.0, vec![-1.0], None);
    cuts.store_constraint_cut(vec![0.0], -1.0, vec![1.0], None);
    let sol = BranchAndBound::new(MasterConfig::default())
        .solve(&problem(1, 1, 1, false), &cuts)
        .unwrap();
    assert!((sol.lower_bound + 1.0).abs() < 1e-4);
    assert!((sol.x[0] - 1.0).abs() < 1e-4);
}
