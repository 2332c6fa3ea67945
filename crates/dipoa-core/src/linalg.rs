//! Small dense linear algebra helpers.
//!
//! Problem data is stored row-major in [`DenseMatrix`]. Spectral work
//! (minimum eigenvalue, PSD factors) is delegated to `faer`.

use faer::{FaerMat, Mat, Side};
use serde::{Deserialize, Serialize};

use crate::error::{ProblemError, ProblemResult};

/// Eigenvalues below this are treated as zero when factoring PSD matrices.
const EIG_FLOOR: f64 = 1e-12;

/// Row-major dense matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DenseMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    /// Build from a row-major buffer.
    pub fn from_row_major(rows: usize, cols: usize, data: Vec<f64>) -> ProblemResult<Self> {
        if data.len() != rows * cols {
            return Err(ProblemError::DimensionMismatch {
                context: "dense matrix buffer",
                expected: rows * cols,
                found: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// `A x`
    pub fn matvec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.cols);
        (0..self.rows).map(|i| dot(self.row(i), x)).collect()
    }

    /// `Aᵀ v`
    pub fn matvec_transpose(&self, v: &[f64]) -> Vec<f64> {
        debug_assert_eq!(v.len(), self.rows);
        let mut out = vec![0.0; self.cols];
        for (i, &vi) in v.iter().enumerate() {
            if vi == 0.0 {
                continue;
            }
            axpy(vi, self.row(i), &mut out);
        }
        out
    }

    /// `xᵀ A x` for square `A`.
    pub fn quad_form(&self, x: &[f64]) -> f64 {
        dot(x, &self.matvec(x))
    }

    /// `Aᵀ A`
    pub fn gram(&self) -> DenseMatrix {
        let n = self.cols;
        let mut out = DenseMatrix::zeros(n, n);
        for r in 0..self.rows {
            let row = self.row(r);
            for i in 0..n {
                if row[i] == 0.0 {
                    continue;
                }
                for j in i..n {
                    let v = out.get(i, j) + row[i] * row[j];
                    out.set(i, j, v);
                }
            }
        }
        for i in 0..n {
            for j in 0..i {
                let v = out.get(j, i);
                out.set(i, j, v);
            }
        }
        out
    }

    /// `(A + Aᵀ) / 2`
    pub fn symmetrized(&self) -> DenseMatrix {
        DenseMatrix::from_fn(self.rows, self.cols, |i, j| {
            0.5 * (self.get(i, j) + self.get(j, i))
        })
    }

    pub fn scaled(&self, alpha: f64) -> DenseMatrix {
        DenseMatrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|v| alpha * v).collect(),
        }
    }

    /// Largest absolute asymmetry `|a_ij - a_ji|`.
    pub fn asymmetry(&self) -> f64 {
        let mut worst: f64 = 0.0;
        for i in 0..self.rows {
            for j in (i + 1)..self.cols.min(self.rows) {
                worst = worst.max((self.get(i, j) - self.get(j, i)).abs());
            }
        }
        worst
    }

    fn to_faer(&self) -> Mat<f64> {
        Mat::from_fn(self.rows, self.cols, |i, j| self.get(i, j))
    }
}

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `y += alpha * x`
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

#[inline]
pub fn norm2(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// `‖a - b‖₂`
pub fn dist2(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Smallest eigenvalue of a symmetric matrix.
///
/// Only the lower triangle is read.
pub fn min_eigenvalue(matrix: &DenseMatrix) -> f64 {
    if matrix.rows() == 0 {
        return 0.0;
    }
    matrix
        .to_faer()
        .selfadjoint_eigenvalues(Side::Lower)
        .into_iter()
        .fold(f64::INFINITY, f64::min)
}

/// Factor a symmetric PSD matrix as `FᵀF`.
///
/// Returns the rows of `F` (one per eigenvalue above the floor), so that
/// `xᵀ A x = Σ_k (f_kᵀ x)²`. Negative eigenvalues are dropped, which makes
/// the result the PSD part of `A`.
pub fn psd_factor(matrix: &DenseMatrix) -> Vec<Vec<f64>> {
    let n = matrix.rows();
    if n == 0 {
        return Vec::new();
    }
    let evd = matrix.to_faer().selfadjoint_eigendecomposition(Side::Lower);
    let s = evd.s_diagonal();
    let u = evd.u();

    let mut factor = Vec::new();
    for k in 0..n {
        let lambda = s.read(k, 0);
        if lambda <= EIG_FLOOR {
            continue;
        }
        let scale = lambda.sqrt();
        factor.push((0..n).map(|i| scale * u.read(i, k)).collect());
    }
    factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matvec_and_transpose() {
        let a = DenseMatrix::from_row_major(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(a.matvec(&[1.0, 0.0, -1.0]), vec![-2.0, -2.0]);
        assert_eq!(a.matvec_transpose(&[1.0, 1.0]), vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_gram_is_symmetric() {
        let a = DenseMatrix::from_row_major(3, 2, vec![1.0, 2.0, 0.0, 1.0, -1.0, 3.0]).unwrap();
        let g = a.gram();
        assert_eq!(g.get(0, 0), 2.0);
        assert_eq!(g.get(0, 1), -1.0);
        assert_eq!(g.get(1, 0), -1.0);
        assert_eq!(g.get(1, 1), 14.0);
    }

    #[test]
    fn test_buffer_length_checked() {
        let err = DenseMatrix::from_row_major(2, 2, vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, ProblemError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_min_eigenvalue_diagonal() {
        let mut a = DenseMatrix::identity(3);
        a.set(1, 1, -2.0);
        a.set(2, 2, 5.0);
        assert!((min_eigenvalue(&a) + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_psd_factor_reproduces_quadratic_form() {
        let a = DenseMatrix::from_row_major(2, 2, vec![2.0, 1.0, 1.0, 2.0]).unwrap();
        let f = psd_factor(&a);
        assert_eq!(f.len(), 2);

        let x = [0.3, -1.7];
        let via_factor: f64 = f.iter().map(|row| dot(row, &x).powi(2)).sum();
        assert!((via_factor - a.quad_form(&x)).abs() < 1e-10);
    }

    #[test]
    fn test_psd_factor_drops_null_space() {
        let a = DenseMatrix::from_row_major(2, 2, vec![1.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(psd_factor(&a).len(), 1);
    }
}
