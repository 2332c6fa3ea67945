//! # dipoa-algo: Distributed Primal Outer Approximation
//!
//! Solves sparse, separable mixed-integer programs
//!
//! ```text
//! minimize    Σ_i f_i(x)
//! subject to  g(x) <= 0                 (optional)
//!             −M·δ_j <= x_j <= M·δ_j
//!             Σ_j δ_j <= κ,  δ ∈ {0,1}^n
//! ```
//!
//! across `N` lockstep workers, one per `f_i`.
//!
//! ## Architecture
//!
//! | Stage | Type | Runs on |
//! |-------|------|---------|
//! | Consensus for a fixed support | [`ConsensusSolver`] (RHADMM) | every worker |
//! | Subproblem `argmin f_i + yᵀ(x−z) + ρ/2‖x−z‖²` | [`local::LocalSolver`] | every worker |
//! | Cut bookkeeping | [`CutStore`] | root |
//! | Lower bound and next support | [`MasterSolver`] ([`BranchAndBound`]) | root |
//! | Outer loop | [`DipoaSolver`] | every worker |
//!
//! Subproblems go to L-BFGS (`argmin`) when unconstrained and to Clarabel
//! when the global quadratic constraint is present. The master's relaxations
//! are Clarabel second-order cone programs.
//!
//! ## Example
//!
//! ```no_run
//! use dipoa_algo::{DipoaSolver, SolverSettings};
//! use dipoa_core::{ProblemFamily, SyntheticSpec};
//!
//! let instance = SyntheticSpec::for_family(ProblemFamily::SparseQcqp).build()?;
//! let solver = DipoaSolver::new(&instance, SolverSettings::default())?;
//! let solution = solver.solve_in_process()?;
//! println!("objective {:.4}, gap {:.2e}", solution.obj, solution.gap);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod admm;
pub mod conic;
pub mod cuts;
pub mod error;
pub mod local;
pub mod master;
pub mod orchestrator;
pub mod solution;
pub mod warm_start;

pub use admm::{
    ConsensusResult, ConsensusSolver, FixedPenalty, PenaltyRule, ResidualBalancing, RhadmmConfig,
};
pub use cuts::{ConstraintCut, CutStore, ObjectiveCut};
pub use error::{DipoaError, DipoaResult, LocalSolveError, MasterError};
pub use master::{BranchAndBound, MasterConfig, MasterProblem, MasterSolution, MasterSolver};
pub use orchestrator::{
    relative_gap, DipoaConfig, DipoaSolver, SolverSettings, WorkerReport, MAX_OUTER_ITERATIONS,
};
pub use solution::{DipoaSolution, IterationRecord};
pub use warm_start::{top_k_support, warm_start};
