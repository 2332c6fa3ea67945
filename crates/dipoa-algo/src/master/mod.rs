//! Master problem of the outer approximation.
//!
//! ```text
//! minimize    Σ_s alpha_s
//! subject to  fx_k + gx_kᵀ(x − x_k) [+ eig_k/2·‖x − x_k‖²] <= alpha_{k mod N}
//!             gx_c + ggx_cᵀ(x − x_c) [+ eig_c/2·‖x − x_c‖²] <= 0
//!             −M·delta_j <= x_j <= M·delta_j
//!             Σ_j delta_j <= kappa,  delta ∈ {0,1}^n
//! ```
//!
//! The optimum is a lower bound on the MINLP because every cut
//! underestimates its function (exactly for convex `f_i`, and with the
//! curvature term whenever the curvature is a true lower bound on the
//! Hessian spectrum).

mod bnb;
mod model;

pub use bnb::BranchAndBound;
pub use model::{MasterModel, NodeFixings};

use dipoa_core::{ProblemInstance, SupportPattern};
use serde::{Deserialize, Serialize};

use crate::cuts::CutStore;
use crate::error::MasterError;

/// Static data of the master problem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterProblem {
    /// `n`
    pub dimension: usize,
    /// `N`, the number of epigraph slots.
    pub workers: usize,
    /// `M`
    pub bound: f64,
    pub kappa: usize,
    pub curvature_cuts: bool,
}

impl MasterProblem {
    pub fn from_instance(instance: &ProblemInstance) -> Self {
        Self {
            dimension: instance.dimension(),
            workers: instance.workers(),
            bound: instance.bound(),
            kappa: instance.kappa(),
            curvature_cuts: instance.options().curvature_cuts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MasterSolution {
    pub lower_bound: f64,
    pub support: SupportPattern,
    pub x: Vec<f64>,
    /// Branch-and-bound nodes solved.
    pub nodes: usize,
}

/// Master configuration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Relative gap at which open nodes are pruned.
    pub mip_gap: f64,
    /// Maximum number of nodes per master solve.
    pub node_limit: usize,
    /// Distance from 0/1 under which a relaxed `delta` counts as integral.
    pub integrality_tol: f64,
    /// `|x_j|` above which a coordinate counts as nonzero in the round-up
    /// heuristic.
    pub support_tol: f64,
    /// Interior-point iteration cap per relaxation.
    pub conic_max_iters: u32,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            mip_gap: 1e-4,
            node_limit: 10_000,
            integrality_tol: 1e-5,
            support_tol: 1e-6,
            conic_max_iters: 200,
        }
    }
}

pub trait MasterSolver {
    fn solve(&self, problem: &MasterProblem, cuts: &CutStore) -> Result<MasterSolution, MasterError>;
}
