//! Collective communication between lockstep workers.
//!
//! The solver only needs three collectives over fixed-length `f64` buffers:
//! sum-reduction to a root, gather to a root and broadcast from a root. Every
//! collective is a blocking synchronisation point: all workers of the group
//! must call the same collectives in the same order.
//!
//! Backends:
//! - [`LocalCommunicator`]: one handle per thread inside a single process.
//! - `MpiCommunicator` (feature `mpi`): the MPI world communicator.

mod local;
#[cfg(feature = "mpi")]
mod mpi;

pub use local::{run_local, LocalCommunicator};
#[cfg(feature = "mpi")]
pub use self::mpi::MpiCommunicator;

use crate::error::{CommError, CommResult};

/// Rank that owns the cut store and the master problem.
pub const ROOT: usize = 0;

/// Rank/size plus the collectives the solver relies on.
///
/// Methods that deliver data only to the root return `Some` on the root and
/// `None` everywhere else.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// Element-wise sum of every worker's `local` buffer, delivered to `root`.
    fn reduce_sum(&self, local: &[f64], root: usize) -> CommResult<Option<Vec<f64>>>;

    /// Every worker's `local` buffer, indexed by rank, delivered to `root`.
    fn gather(&self, local: &[f64], root: usize) -> CommResult<Option<Vec<Vec<f64>>>>;

    /// Overwrite `buf` on every worker with the root's copy.
    fn broadcast(&self, buf: &mut [f64], root: usize) -> CommResult<()>;

    fn reduce_sum_scalar(&self, value: f64, root: usize) -> CommResult<Option<f64>> {
        Ok(self.reduce_sum(&[value], root)?.map(|v| v[0]))
    }

    /// Returns the root's `value` on every worker.
    fn broadcast_scalar(&self, value: f64, root: usize) -> CommResult<f64> {
        let mut buf = [value];
        self.broadcast(&mut buf, root)?;
        Ok(buf[0])
    }
}

pub(crate) fn check_root(root: usize, size: usize) -> CommResult<()> {
    if root >= size {
        return Err(CommError::InvalidRoot { root, size });
    }
    Ok(())
}
