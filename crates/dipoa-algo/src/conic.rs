//! Small builder for Clarabel conic programs.
//!
//! Clarabel solves
//!
//! ```text
//! minimize    ½ xᵀPx + qᵀx
//! subject to  Ax + s = b,  s ∈ K
//! ```
//!
//! Constraints are accumulated column-wise (one entry list per variable) and
//! consecutive rows of the same cone type are merged into one cone, so the
//! final CSC conversion is a sort and a concatenation.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};

/// Sparse row: `(variable, coefficient)` pairs.
pub type SparseRow = Vec<(usize, f64)>;

/// One squared term `(aᵀx − b)²` of a convex quadratic.
#[derive(Debug, Clone)]
pub struct SquaredTerm {
    pub coeffs: SparseRow,
    pub offset: f64,
}

/// Result of a conic solve.
#[derive(Debug, Clone)]
pub enum ConicOutcome {
    Optimal { x: Vec<f64>, objective: f64 },
    Infeasible,
    Unbounded,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ConicModel {
    n_var: usize,
    columns: Vec<SparseRow>,
    rhs: Vec<f64>,
    cones: Vec<SupportedConeT<f64>>,
    /// Upper triangle of P, column-wise.
    p_columns: Vec<SparseRow>,
    q: Vec<f64>,
    objective_offset: f64,
    max_iter: u32,
}

impl ConicModel {
    pub fn new(n_var: usize) -> Self {
        Self {
            n_var,
            columns: vec![Vec::new(); n_var],
            rhs: Vec::new(),
            cones: Vec::new(),
            p_columns: vec![Vec::new(); n_var],
            q: vec![0.0; n_var],
            objective_offset: 0.0,
            max_iter: 200,
        }
    }

    pub fn with_max_iter(mut self, max_iter: u32) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn num_rows(&self) -> usize {
        self.rhs.len()
    }

    pub fn add_linear_objective(&mut self, var: usize, coeff: f64) {
        self.q[var] += coeff;
    }

    pub fn add_objective_constant(&mut self, value: f64) {
        self.objective_offset += value;
    }

    /// Add `v` to `P[i][j]` and `P[j][i]` (once on the diagonal).
    pub fn add_quadratic_objective(&mut self, i: usize, j: usize, v: f64) {
        let (row, col) = if i <= j { (i, j) } else { (j, i) };
        self.p_columns[col].push((row, v));
    }

    fn push_row(&mut self, coeffs: &[(usize, f64)], b: f64) -> usize {
        let row = self.rhs.len();
        for &(col, val) in coeffs {
            self.columns[col].push((row, val));
        }
        self.rhs.push(b);
        row
    }

    /// `Σ coeffᵢ·xᵢ = b`
    pub fn push_eq(&mut self, coeffs: &[(usize, f64)], b: f64) -> usize {
        let row = self.push_row(coeffs, b);
        match self.cones.last_mut() {
            Some(SupportedConeT::ZeroConeT(n)) => *n += 1,
            _ => self.cones.push(SupportedConeT::ZeroConeT(1)),
        }
        row
    }

    /// `Σ coeffᵢ·xᵢ <= b`
    pub fn push_leq(&mut self, coeffs: &[(usize, f64)], b: f64) -> usize {
        let row = self.push_row(coeffs, b);
        match self.cones.last_mut() {
            Some(SupportedConeT::NonnegativeConeT(n)) => *n += 1,
            _ => self.cones.push(SupportedConeT::NonnegativeConeT(1)),
        }
        row
    }

    /// `Σ_k (a_kᵀx − b_k)² + lᵀx + c <= 0`.
    ///
    /// With `t = −(lᵀx + c)` this is `‖(2(Ax − b), t − 1)‖ <= t + 1`, one
    /// second-order cone of dimension `2 + K`. Without squared terms it
    /// degenerates to a linear row.
    pub fn push_convex_quadratic_leq(
        &mut self,
        terms: &[SquaredTerm],
        linear: &[(usize, f64)],
        constant: f64,
    ) {
        if terms.is_empty() {
            self.push_leq(linear, -constant);
            return;
        }

        // s₀ = t + 1
        self.push_row(linear, 1.0 - constant);
        // s₁ = t − 1
        self.push_row(linear, -1.0 - constant);
        // s₂₊ₖ = 2(a_kᵀx − b_k)
        for term in terms {
            let scaled: SparseRow = term.coeffs.iter().map(|&(j, a)| (j, -2.0 * a)).collect();
            self.push_row(&scaled, -2.0 * term.offset);
        }
        self.cones
            .push(SupportedConeT::SecondOrderConeT(2 + terms.len()));
    }

    fn to_csc(n_rows: usize, columns: &[SparseRow]) -> CscMatrix<f64> {
        let mut col_ptr = Vec::with_capacity(columns.len() + 1);
        let mut row_idx = Vec::new();
        let mut values = Vec::new();

        for column in columns {
            let start = row_idx.len();
            col_ptr.push(start);
            let mut entries = column.clone();
            entries.sort_by_key(|&(r, _)| r);
            for (r, v) in entries {
                if row_idx.len() > start && row_idx.last() == Some(&r) {
                    if let Some(acc) = values.last_mut() {
                        *acc += v;
                    }
                } else {
                    row_idx.push(r);
                    values.push(v);
                }
            }
        }
        col_ptr.push(row_idx.len());

        CscMatrix::new(n_rows, columns.len(), col_ptr, row_idx, values)
    }

    pub fn solve(&self) -> ConicOutcome {
        let a_mat = Self::to_csc(self.rhs.len(), &self.columns);
        let p_mat = Self::to_csc(self.n_var, &self.p_columns);

        let settings = match DefaultSettingsBuilder::default()
            .verbose(false)
            .max_iter(self.max_iter)
            .build()
        {
            Ok(s) => s,
            Err(e) => return ConicOutcome::Failed(format!("Clarabel settings error: {:?}", e)),
        };

        let mut solver =
            match DefaultSolver::new(&p_mat, &self.q, &a_mat, &self.rhs, &self.cones, settings) {
                Ok(s) => s,
                Err(e) => {
                    return ConicOutcome::Failed(format!(
                        "Clarabel initialization failed: {:?}",
                        e
                    ))
                }
            };

        solver.solve();

        let sol = &solver.solution;
        match sol.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => ConicOutcome::Optimal {
                x: sol.x.clone(),
                objective: sol.obj_val + self.objective_offset,
            },
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                ConicOutcome::Infeasible
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                ConicOutcome::Unbounded
            }
            other => ConicOutcome::Failed(format!("{:?}", other)),
        }
    }
}
