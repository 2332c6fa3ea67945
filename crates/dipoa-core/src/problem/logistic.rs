use serde::{Deserialize, Serialize};

use crate::error::{ProblemError, ProblemResult};
use crate::linalg::{dot, DenseMatrix};

/// `log(1 + e^t)` without overflow.
#[inline]
pub fn softplus(t: f64) -> f64 {
    if t > 0.0 {
        t + (-t).exp().ln_1p()
    } else {
        t.exp().ln_1p()
    }
}

/// Logistic sigmoid `1 / (1 + e^-t)` without overflow.
#[inline]
pub fn sigmoid(t: f64) -> f64 {
    if t >= 0.0 {
        1.0 / (1.0 + (-t).exp())
    } else {
        let e = t.exp();
        e / (1.0 + e)
    }
}

/// Negative log-likelihood of a logistic model on one worker's samples:
/// `f(x) = Σ_j softplus(a_jᵀx) − b_j·a_jᵀx`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticLoss {
    features: DenseMatrix,
    labels: Vec<f64>,
}

impl LogisticLoss {
    /// `features` is `m × n`; `labels` holds `m` values in `{0, 1}`.
    pub fn new(features: DenseMatrix, labels: Vec<f64>) -> ProblemResult<Self> {
        if labels.len() != features.rows() {
            return Err(ProblemError::DimensionMismatch {
                context: "logistic labels",
                expected: features.rows(),
                found: labels.len(),
            });
        }
        if let Some(bad) = labels.iter().find(|&&b| b != 0.0 && b != 1.0) {
            return Err(ProblemError::InvalidParameter(format!(
                "logistic labels must be 0 or 1, found {bad}"
            )));
        }
        Ok(Self { features, labels })
    }

    pub fn dimension(&self) -> usize {
        self.features.cols()
    }

    pub fn samples(&self) -> usize {
        self.features.rows()
    }

    pub fn features(&self) -> &DenseMatrix {
        &self.features
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    pub fn value(&self, x: &[f64]) -> f64 {
        self.features
            .matvec(x)
            .iter()
            .zip(&self.labels)
            .map(|(&t, &b)| softplus(t) - b * t)
            .sum()
    }

    /// `Aᵀ(σ(Ax) − b)`
    pub fn gradient(&self, x: &[f64]) -> Vec<f64> {
        let residual: Vec<f64> = self
            .features
            .matvec(x)
            .iter()
            .zip(&self.labels)
            .map(|(&t, &b)| sigmoid(t) - b)
            .collect();
        self.features.matvec_transpose(&residual)
    }

    /// `Aᵀ diag(σ(1−σ)) A`
    pub fn hessian(&self, x: &[f64]) -> DenseMatrix {
        let n = self.dimension();
        let mut h = DenseMatrix::zeros(n, n);
        for r in 0..self.samples() {
            let a = self.features.row(r);
            let s = sigmoid(dot(a, x));
            let w = s * (1.0 - s);
            if w == 0.0 {
                continue;
            }
            for i in 0..n {
                let wa = w * a[i];
                if wa == 0.0 {
                    continue;
                }
                for j in 0..n {
                    let v = h.get(i, j) + wa * a[j];
                    h.set(i, j, v);
                }
            }
        }
        h
    }
}
