//! Error types shared by the DiPOA crates
//!
//! Two failure domains live here:
//!
//! - [`ProblemError`]: an instance could not be built (unknown family, bad
//!   parameters, inconsistent dimensions). These are raised before any
//!   distributed work starts.
//! - [`CommError`]: a collective operation failed. There is no recovery path
//!   for these; a run that sees one is considered failed on every worker.

use thiserror::Error;

/// Errors raised while describing or constructing a problem instance.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    /// The problem family name is not one of the supported families.
    #[error("problem class {0} is not supported yet")]
    UnsupportedFamily(String),

    /// A scalar parameter is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Vectors or matrices disagree on the problem dimension.
    #[error("Dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    /// The family and the supplied objectives/constraint do not fit together.
    #[error("Inconsistent instance: {0}")]
    Inconsistent(String),
}

/// Errors raised by collective communication.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommError {
    /// Another worker failed and the group was torn down.
    #[error("communicator group aborted by a failed worker")]
    Aborted,

    /// Workers contributed payloads of different lengths to one collective.
    #[error("payload length mismatch on rank {rank}: expected {expected}, found {found}")]
    ShapeMismatch {
        rank: usize,
        expected: usize,
        found: usize,
    },

    /// The root rank does not exist in this group.
    #[error("invalid root rank {root} for a group of size {size}")]
    InvalidRoot { root: usize, size: usize },

    /// Transport-level failure reported by a backend.
    #[error("communication backend error: {0}")]
    Backend(String),
}

/// Convenience alias for instance construction.
pub type ProblemResult<T> = Result<T, ProblemError>;

/// Convenience alias for collectives.
pub type CommResult<T> = Result<T, CommError>;
