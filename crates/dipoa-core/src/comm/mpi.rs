//! MPI backend for multi-process runs.
//!
//! The caller must initialise MPI before building the communicator and keep
//! the universe alive for the whole run:
//!
//! ```ignore
//! let universe = mpi::initialize().ok_or_else(|| anyhow!("MPI init failed"))?;
//! let comm = MpiCommunicator::new(universe.world());
//! ```
//!
//! MPI collectives do not exchange payload lengths, so a shape mismatch is
//! undefined behaviour at the MPI level. Callers must keep buffers in
//! lockstep; the solver always does.

use mpi::collective::SystemOperation;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use super::{check_root, Communicator};
use crate::error::CommResult;

/// Wraps an MPI communicator (usually the world).
pub struct MpiCommunicator {
    world: SimpleCommunicator,
}

impl MpiCommunicator {
    pub fn new(world: SimpleCommunicator) -> Self {
        Self { world }
    }
}

impl Communicator for MpiCommunicator {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn reduce_sum(&self, local: &[f64], root: usize) -> CommResult<Option<Vec<f64>>> {
        check_root(root, self.size())?;
        let root_process = self.world.process_at_rank(root as i32);
        if self.rank() == root {
            let mut sum = vec![0.0; local.len()];
            root_process.reduce_into_root(local, &mut sum[..], SystemOperation::sum());
            Ok(Some(sum))
        } else {
            root_process.reduce_into(local, SystemOperation::sum());
            Ok(None)
        }
    }

    fn gather(&self, local: &[f64], root: usize) -> CommResult<Option<Vec<Vec<f64>>>> {
        check_root(root, self.size())?;
        let root_process = self.world.process_at_rank(root as i32);
        if self.rank() == root {
            let width = local.len();
            let mut flat = vec![0.0; width * self.size()];
            root_process.gather_into_root(local, &mut flat[..]);
            if width == 0 {
                return Ok(Some(vec![Vec::new(); self.size()]));
            }
            Ok(Some(flat.chunks(width).map(<[f64]>::to_vec).collect()))
        } else {
            root_process.gather_into(local);
            Ok(None)
        }
    }

    fn broadcast(&self, buf: &mut [f64], root: usize) -> CommResult<()> {
        check_root(root, self.size())?;
        self.world.process_at_rank(root as i32).broadcast_into(buf);
        Ok(())
    }
}
