//! # dipoa-core
//!
//! Shared building blocks of the DiPOA solver:
//!
//! - [`problem`]: problem families, local objectives, the optional global
//!   quadratic constraint, immutable [`ProblemInstance`]s and seeded synthetic
//!   generators.
//! - [`comm`]: the [`Communicator`] abstraction over lockstep workers, with an
//!   in-process thread backend and an optional MPI backend.
//! - [`linalg`]: the handful of dense operations the solver needs.
//!
//! The algorithms themselves live in `dipoa-algo`.

pub mod comm;
pub mod error;
pub mod linalg;
pub mod problem;

pub use comm::{run_local, Communicator, LocalCommunicator, ROOT};
pub use error::{CommError, CommResult, ProblemError, ProblemResult};
pub use linalg::DenseMatrix;
pub use problem::{
    LocalObjective, LogisticLoss, ProblemFamily, ProblemInstance, ProblemOptions,
    QuadraticConstraint, QuadraticObjective, Scenario, SupportPattern, SyntheticSpec,
};

#[cfg(feature = "mpi")]
pub use comm::MpiCommunicator;
