//! Integration tests for problem families and synthetic generation.

use dipoa_core::{
    LocalObjective, ProblemFamily, ProblemOptions, SupportPattern, SyntheticSpec,
};

const FD_STEP: f64 = 1e-6;

fn finite_difference(f: impl Fn(&[f64]) -> f64, x: &[f64]) -> Vec<f64> {
    (0..x.len())
        .map(|j| {
            let mut plus = x.to_vec();
            let mut minus = x.to_vec();
            plus[j] += FD_STEP;
            minus[j] -= FD_STEP;
            (f(&plus) - f(&minus)) / (2.0 * FD_STEP)
        })
        .collect()
}

fn assert_close(a: &[f64], b: &[f64], tol: f64) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!(
            (x - y).abs() <= tol * (1.0 + y.abs()),
            "component {i}: {x} vs {y}"
        );
    }
}

fn small(family: ProblemFamily) -> SyntheticSpec {
    SyntheticSpec {
        family,
        dimension: 5,
        samples: 40,
        sparsity: 2,
        workers: 3,
        seed: 7,
        ..SyntheticSpec::default()
    }
}

#[test]
fn logistic_gradient_matches_finite_differences() {
    let inst = small(ProblemFamily::SparseLogisticRegression).build().unwrap();
    let x = [0.3, -0.2, 0.1, 0.05, -0.4];
    for obj in inst.objectives() {
        let analytic = obj.gradient(&x);
        let numeric = finite_difference(|p| obj.value(p), &x);
        assert_close(&analytic, &numeric, 1e-6);
    }
}

#[test]
fn logistic_hessian_matches_gradient_differences() {
    let inst = small(ProblemFamily::SparseLogisticRegression).build().unwrap();
    let obj = inst.objective(0).unwrap();
    let x = [0.1, 0.2, -0.3, 0.0, 0.5];
    let h = obj.hessian(&x);
    for j in 0..x.len() {
        let column = finite_difference(|p| obj.gradient(p)[j], &x);
        let row: Vec<f64> = (0..x.len()).map(|k| h.get(j, k)).collect();
        assert_close(&row, &column, 1e-5);
    }
    assert!(!obj.has_constant_hessian());
    assert!(obj.min_curvature(&x) >= -1e-12);
}

#[test]
fn quadratic_gradient_matches_finite_differences() {
    let inst = small(ProblemFamily::SparseQcqp).build().unwrap();
    let x = [1.0, -0.5, 0.25, 2.0, 0.0];
    for obj in inst.objectives() {
        assert!(obj.has_constant_hessian());
        let numeric = finite_difference(|p| obj.value(p), &x);
        assert_close(&obj.gradient(&x), &numeric, 1e-6);
        // BᵀB/n + 0.1·I, doubled
        assert!(obj.min_curvature(&x) >= 0.2 - 1e-9);
    }

    let g = inst.constraint().unwrap();
    let numeric = finite_difference(|p| g.value(p), &x);
    assert_close(&g.gradient(&x), &numeric, 1e-6);
}

#[test]
fn qcqp_origin_is_strictly_feasible() {
    let inst = small(ProblemFamily::SparseQcqp).build().unwrap();
    let g = inst.constraint().unwrap();
    assert_eq!(g.value(&[0.0; 5]), -1.0);
    assert!(g.min_curvature() >= -1e-9);
}

#[test]
fn generation_is_deterministic_per_seed() {
    let spec = small(ProblemFamily::SparseQcqp);
    let a = spec.build().unwrap();
    let b = spec.build().unwrap();
    let other = SyntheticSpec { seed: 8, ..spec }.build().unwrap();

    let x = [0.5, 0.5, -0.5, 0.1, 0.2];
    assert_eq!(a.total_objective(&x), b.total_objective(&x));
    assert_ne!(a.total_objective(&x), other.total_objective(&x));
}

#[test]
fn workers_receive_distinct_partitions() {
    let inst = small(ProblemFamily::SparseLogisticRegression).build().unwrap();
    let x = [0.2; 5];
    let values: Vec<f64> = inst.objectives().iter().map(|o| o.value(&x)).collect();
    assert_ne!(values[0], values[1]);
    assert_ne!(values[1], values[2]);
}

#[test]
fn family_shapes_the_instance() {
    let dslr = small(ProblemFamily::SparseLogisticRegression).build().unwrap();
    assert!(dslr.constraint().is_none());
    assert!(matches!(dslr.objective(0), Some(LocalObjective::Logistic(_))));

    let qcqp = small(ProblemFamily::SparseQcqp).build().unwrap();
    assert!(qcqp.constraint().is_some());
    assert_eq!(qcqp.workers(), 3);
    assert_eq!(qcqp.kappa(), 2);
}

#[test]
fn unsupported_family_names_are_rejected() {
    let err = "dsmiqp".parse::<ProblemFamily>().unwrap_err();
    assert_eq!(err.to_string(), "problem class dsmiqp is not supported yet");
}

#[test]
fn options_round_trip_through_serde() {
    let opts = ProblemOptions {
        warm_start: true,
        curvature_cuts: false,
    };
    let json = serde_json::to_string(&opts).unwrap();
    let back: ProblemOptions = serde_json::from_str(&json).unwrap();
    assert_eq!(back, opts);

    let partial: ProblemOptions = serde_json::from_str(r#"{"curvature_cuts": true}"#).unwrap();
    assert!(partial.curvature_cuts);
    assert!(!partial.warm_start);

    let pattern: SupportPattern = serde_json::from_str("[true, false, true]").unwrap();
    assert_eq!(pattern.count(), 2);
}
