use dipoa_core::{CommError, ProblemError};
use thiserror::Error;

/// Failure of a per-worker subproblem solve.
#[derive(Debug, Error)]
pub enum LocalSolveError {
    /// The conic solver did not return a usable point.
    #[error("local conic solve failed on worker {worker}: status {status}")]
    Conic { worker: usize, status: String },

    /// Solver construction failed (bad settings or malformed data).
    #[error("local solver setup failed on worker {worker}: {message}")]
    Setup { worker: usize, message: String },

    /// The objective cannot be handled by the selected local solver.
    #[error("unsupported local objective on worker {worker}: {reason}")]
    Unsupported { worker: usize, reason: String },
}

/// Failure of the master problem. All variants are fatal for the run.
#[derive(Debug, Error)]
pub enum MasterError {
    #[error("master problem is infeasible")]
    Infeasible,

    /// Some `alpha` slot has no cut bounding it from below.
    #[error("master problem is unbounded ({cuts} objective cuts for {slots} slots)")]
    Unbounded { cuts: usize, slots: usize },

    #[error("master solve hit a numerical problem: {0}")]
    Numerical(String),

    #[error("branch-and-bound stopped after {nodes} nodes without an integer solution")]
    NodeLimit { nodes: usize },
}

/// Top-level error of a DiPOA run.
#[derive(Debug, Error)]
pub enum DipoaError {
    #[error("Problem error: {0}")]
    Problem(#[from] ProblemError),

    #[error("Communication error: {0}")]
    Comm(#[from] CommError),

    #[error("Local solve error: {0}")]
    Local(#[from] LocalSolveError),

    #[error("Master error: {0}")]
    Master(#[from] MasterError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type DipoaResult<T> = Result<T, DipoaError>;
