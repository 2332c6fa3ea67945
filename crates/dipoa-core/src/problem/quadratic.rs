use serde::{Deserialize, Serialize};

use crate::error::{ProblemError, ProblemResult};
use crate::linalg::{dot, min_eigenvalue, DenseMatrix};

/// Tolerance on the smallest eigenvalue of a constraint matrix.
const PSD_TOL: f64 = 1e-9;

fn check_square(m: &DenseMatrix, vector_len: usize, context: &'static str) -> ProblemResult<()> {
    if !m.is_square() {
        return Err(ProblemError::DimensionMismatch {
            context,
            expected: m.rows(),
            found: m.cols(),
        });
    }
    if vector_len != m.rows() {
        return Err(ProblemError::DimensionMismatch {
            context,
            expected: m.rows(),
            found: vector_len,
        });
    }
    Ok(())
}

/// `f(x) = xᵀQx + qᵀx`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuadraticObjective {
    hessian_half: DenseMatrix,
    linear: Vec<f64>,
}

impl QuadraticObjective {
    /// The stored matrix is the symmetric part of `q_mat`; the quadratic form
    /// is unchanged by this.
    pub fn new(q_mat: DenseMatrix, q: Vec<f64>) -> ProblemResult<Self> {
        check_square(&q_mat, q.len(), "quadratic objective")?;
        Ok(Self {
            hessian_half: q_mat.symmetrized(),
            linear: q,
        })
    }

    pub fn dimension(&self) -> usize {
        self.linear.len()
    }

    /// `Q`
    pub fn quadratic_term(&self) -> &DenseMatrix {
        &self.hessian_half
    }

    /// `q`
    pub fn linear_term(&self) -> &[f64] {
        &self.linear
    }

    pub fn value(&self, x: &[f64]) -> f64 {
        self.hessian_half.quad_form(x) + dot(&self.linear, x)
    }

    pub fn gradient(&self, x: &[f64]) -> Vec<f64> {
        self.hessian_half
            .matvec(x)
            .iter()
            .zip(&self.linear)
            .map(|(qx, q)| 2.0 * qx + q)
            .collect()
    }

    pub fn hessian(&self) -> DenseMatrix {
        self.hessian_half.scaled(2.0)
    }
}

/// Global constraint `g(x) = xᵀPx + cᵀx + d <= 0` with `P` PSD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuadraticConstraint {
    p: DenseMatrix,
    c: Vec<f64>,
    d: f64,
}

impl QuadraticConstraint {
    pub fn new(p: DenseMatrix, c: Vec<f64>, d: f64) -> ProblemResult<Self> {
        check_square(&p, c.len(), "quadratic constraint")?;
        let p = p.symmetrized();
        let lambda_min = min_eigenvalue(&p);
        if lambda_min < -PSD_TOL {
            return Err(ProblemError::InvalidParameter(format!(
                "constraint matrix is not positive semidefinite (min eigenvalue {lambda_min:e})"
            )));
        }
        if !d.is_finite() {
            return Err(ProblemError::InvalidParameter(
                "constraint offset must be finite".into(),
            ));
        }
        Ok(Self { p, c, d })
    }

    pub fn dimension(&self) -> usize {
        self.c.len()
    }

    pub fn quadratic_term(&self) -> &DenseMatrix {
        &self.p
    }

    pub fn linear_term(&self) -> &[f64] {
        &self.c
    }

    pub fn offset(&self) -> f64 {
        self.d
    }

    pub fn value(&self, x: &[f64]) -> f64 {
        self.p.quad_form(x) + dot(&self.c, x) + self.d
    }

    pub fn gradient(&self, x: &[f64]) -> Vec<f64> {
        self.p
            .matvec(x)
            .iter()
            .zip(&self.c)
            .map(|(px, c)| 2.0 * px + c)
            .collect()
    }

    pub fn hessian(&self) -> DenseMatrix {
        self.p.scaled(2.0)
    }

    /// Smallest eigenvalue of the Hessian `2P`.
    pub fn min_curvature(&self) -> f64 {
        min_eigenvalue(&self.hessian())
    }

    pub fn is_feasible(&self, x: &[f64], tol: f64) -> bool {
        self.value(x) <= tol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_symmetrizes() {
        let q = DenseMatrix::from_row_major(2, 2, vec![1.0, 2.0, 0.0, 1.0]).unwrap();
        let f = QuadraticObjective::new(q, vec![0.0, 0.0]).unwrap();
        assert_eq!(f.quadratic_term().get(0, 1), 1.0);
        assert_eq!(f.quadratic_term().get(1, 0), 1.0);
        // xᵀQx is unchanged
        assert_eq!(f.value(&[1.0, 1.0]), 4.0);
    }

    #[test]
    fn test_objective_gradient_and_hessian() {
        let f = QuadraticObjective::new(DenseMatrix::identity(2), vec![-2.0, -4.0]).unwrap();
        assert_eq!(f.gradient(&[1.0, 2.0]), vec![0.0, 0.0]);
        assert_eq!(f.hessian().get(1, 1), 2.0);
    }

    #[test]
    fn test_constraint_rejects_indefinite_matrix() {
        let mut p = DenseMatrix::identity(2);
        p.set(1, 1, -1.0);
        assert!(matches!(
            QuadraticConstraint::new(p, vec![0.0, 0.0], -1.0),
            Err(ProblemError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_constraint_value_and_curvature() {
        let g = QuadraticConstraint::new(DenseMatrix::identity(2), vec![1.0, 0.0], -1.0).unwrap();
        assert_eq!(g.value(&[0.0, 0.0]), -1.0);
        assert!(g.is_feasible(&[0.0, 0.0], 0.0));
        assert!(!g.is_feasible(&[1.0, 1.0], 0.0));
        assert!((g.min_curvature() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = QuadraticObjective::new(DenseMatrix::identity(3), vec![0.0; 2]).unwrap_err();
        assert_eq!(
            err,
            ProblemError::DimensionMismatch {
                context: "quadratic objective",
                expected: 3,
                found: 2
            }
        );
    }
}
