//! In-process communicator: one handle per worker thread.
//!
//! All collectives go through a single generation-counted exchange. Each
//! worker deposits its payload into its slot; the last one to arrive publishes
//! the full set of slots, bumps the generation and wakes everybody. A new
//! round cannot start until every worker has picked up the previous result.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use tracing::{debug, error};

use super::{check_root, Communicator};
use crate::error::{CommError, CommResult};

#[derive(Default)]
struct Exchange {
    slots: Vec<Option<Vec<f64>>>,
    arrived: usize,
    generation: u64,
    result: Option<Arc<Vec<Vec<f64>>>>,
    /// Workers that still have to read `result`.
    remaining: usize,
    aborted: bool,
    aborted_by: Option<usize>,
}

struct Shared {
    world: usize,
    state: Mutex<Exchange>,
    cv: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Exchange> {
        // A poisoned lock means a peer panicked mid-collective; the abort
        // flag carries that information, so the data is still usable.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Exchange>) -> MutexGuard<'a, Exchange> {
        self.cv.wait(guard).unwrap_or_else(|p| p.into_inner())
    }

    fn abort(&self, rank: usize) {
        let mut guard = self.lock();
        if !guard.aborted {
            guard.aborted = true;
            guard.aborted_by = Some(rank);
        }
        drop(guard);
        self.cv.notify_all();
    }

    /// Deposit `payload` for `rank` and return every rank's payload.
    fn exchange(&self, rank: usize, payload: Vec<f64>) -> CommResult<Arc<Vec<Vec<f64>>>> {
        let mut guard = self.lock();

        while guard.remaining > 0 && !guard.aborted {
            guard = self.wait(guard);
        }
        if guard.aborted {
            return Err(CommError::Aborted);
        }

        guard.slots[rank] = Some(payload);
        guard.arrived += 1;
        let entry_generation = guard.generation;

        if guard.arrived == self.world {
            let payloads = guard
                .slots
                .iter_mut()
                .map(|slot| slot.take().unwrap_or_default())
                .collect();
            guard.result = Some(Arc::new(payloads));
            guard.arrived = 0;
            guard.remaining = self.world;
            guard.generation = guard.generation.wrapping_add(1);
            self.cv.notify_all();
        } else {
            while guard.generation == entry_generation && !guard.aborted {
                guard = self.wait(guard);
            }
            if guard.generation == entry_generation {
                return Err(CommError::Aborted);
            }
        }

        let result = match guard.result.as_ref() {
            Some(result) => Arc::clone(result),
            None => return Err(CommError::Aborted),
        };
        guard.remaining -= 1;
        if guard.remaining == 0 {
            guard.result = None;
            self.cv.notify_all();
        }
        Ok(result)
    }
}

/// One worker's handle on an in-process group.
pub struct LocalCommunicator {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalCommunicator {
    /// Create a group of `world` connected handles, indexed by rank.
    pub fn group(world: usize) -> Vec<LocalCommunicator> {
        let shared = Arc::new(Shared {
            world,
            state: Mutex::new(Exchange {
                slots: vec![None; world],
                ..Exchange::default()
            }),
            cv: Condvar::new(),
        });
        (0..world)
            .map(|rank| LocalCommunicator {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Tear the group down. Every pending and future collective on any
    /// handle of the group fails with [`CommError::Aborted`].
    pub fn abort(&self) {
        self.shared.abort(self.rank);
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.lock().aborted
    }

    fn exchange_checked(&self, local: &[f64], root: usize) -> CommResult<Arc<Vec<Vec<f64>>>> {
        check_root(root, self.shared.world)?;
        let all = self.shared.exchange(self.rank, local.to_vec())?;
        let expected = all[root].len();
        if let Some((rank, found)) = all
            .iter()
            .enumerate()
            .map(|(rank, p)| (rank, p.len()))
            .find(|&(_, len)| len != expected)
        {
            return Err(CommError::ShapeMismatch {
                rank,
                expected,
                found,
            });
        }
        Ok(all)
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.world
    }

    fn reduce_sum(&self, local: &[f64], root: usize) -> CommResult<Option<Vec<f64>>> {
        let all = self.exchange_checked(local, root)?;
        if self.rank != root {
            return Ok(None);
        }
        let mut sum = vec![0.0; local.len()];
        for payload in all.iter() {
            for (acc, v) in sum.iter_mut().zip(payload) {
                *acc += v;
            }
        }
        Ok(Some(sum))
    }

    fn gather(&self, local: &[f64], root: usize) -> CommResult<Option<Vec<Vec<f64>>>> {
        let all = self.exchange_checked(local, root)?;
        if self.rank != root {
            return Ok(None);
        }
        Ok(Some(all.as_ref().clone()))
    }

    fn broadcast(&self, buf: &mut [f64], root: usize) -> CommResult<()> {
        let all = self.exchange_checked(buf, root)?;
        if self.rank != root {
            buf.copy_from_slice(&all[root]);
        }
        Ok(())
    }
}

/// Aborts the group unless disarmed, so a worker that errors out or panics
/// releases peers blocked in a collective.
struct AbortGuard {
    rank: usize,
    shared: Arc<Shared>,
    armed: bool,
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if self.armed {
            self.shared.abort(self.rank);
        }
    }
}

/// Run `f` on `world` scoped threads, one per rank, and collect the results
/// in rank order.
///
/// If any worker fails, the group is aborted and the error of the worker that
/// failed first is returned (peers typically fail with
/// [`CommError::Aborted`] afterwards). A panicking worker is reported as a
/// [`CommError::Backend`] error.
pub fn run_local<T, E, F>(world: usize, f: F) -> Result<Vec<T>, E>
where
    F: Fn(LocalCommunicator) -> Result<T, E> + Sync,
    T: Send,
    E: Send + From<CommError>,
{
    let comms = LocalCommunicator::group(world);
    let shared = match comms.first() {
        Some(c) => Arc::clone(&c.shared),
        None => return Ok(Vec::new()),
    };
    debug!(world, "starting in-process worker group");

    let outcomes: Vec<Result<T, E>> = thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let f = &f;
                scope.spawn(move || {
                    let mut guard = AbortGuard {
                        rank: comm.rank,
                        shared: Arc::clone(&comm.shared),
                        armed: true,
                    };
                    let out = f(comm);
                    if out.is_ok() {
                        guard.armed = false;
                    }
                    out
                })
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle.join().unwrap_or_else(|_| {
                    error!(rank, "worker thread panicked");
                    Err(E::from(CommError::Backend(format!(
                        "worker {rank} panicked"
                    ))))
                })
            })
            .collect()
    });

    let first_failure = shared.lock().aborted_by;
    let mut results = Vec::with_capacity(world);
    let mut primary_err = None;
    let mut lowest_err = None;
    for (rank, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(value) => results.push(value),
            Err(err) if first_failure == Some(rank) => primary_err = Some(err),
            Err(err) => {
                if lowest_err.is_none() {
                    lowest_err = Some(err);
                }
            }
        }
    }

    match primary_err.or(lowest_err) {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ROOT;

    #[test]
    fn test_reduce_sum_delivers_to_root_only() {
        let out = run_local(3, |comm| {
            let local = vec![comm.rank() as f64, 1.0];
            comm.reduce_sum(&local, ROOT)
        })
        .unwrap();

        assert_eq!(out[0], Some(vec![3.0, 3.0]));
        assert_eq!(out[1], None);
        assert_eq!(out[2], None);
    }

    #[test]
    fn test_gather_is_indexed_by_rank() {
        let out = run_local(4, |comm| comm.gather(&[10.0 * comm.rank() as f64], ROOT)).unwrap();
        let gathered = out[0].clone().unwrap();
        assert_eq!(gathered, vec![vec![0.0], vec![10.0], vec![20.0], vec![30.0]]);
    }

    #[test]
    fn test_broadcast_from_nonzero_root() {
        let out = run_local(3, |comm| {
            let mut buf = vec![comm.rank() as f64; 2];
            comm.broadcast(&mut buf, 2)?;
            Ok::<_, CommError>(buf)
        })
        .unwrap();
        for buf in out {
            assert_eq!(buf, vec![2.0, 2.0]);
        }
    }

    #[test]
    fn test_many_rounds_stay_in_lockstep() {
        let out = run_local(4, |comm| {
            let mut total = 0.0;
            for round in 0..200 {
                let t = comm.broadcast_scalar(round as f64 + comm.rank() as f64, ROOT)?;
                total += t;
                comm.reduce_sum_scalar(1.0, ROOT)?;
            }
            Ok::<_, CommError>(total)
        })
        .unwrap();
        let expected: f64 = (0..200).map(|r| r as f64).sum();
        assert!(out.iter().all(|&t| t == expected));
    }

    #[test]
    fn test_shape_mismatch_is_reported_everywhere() {
        let out: Vec<CommResult<Option<Vec<f64>>>> = thread::scope(|scope| {
            let handles: Vec<_> = LocalCommunicator::group(2)
                .into_iter()
                .map(|comm| {
                    scope.spawn(move || {
                        let local = vec![1.0; 2 + comm.rank()];
                        comm.reduce_sum(&local, ROOT)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for res in out {
            assert_eq!(
                res,
                Err(CommError::ShapeMismatch {
                    rank: 1,
                    expected: 2,
                    found: 3
                })
            );
        }
    }

    #[test]
    fn test_invalid_root() {
        let comm = LocalCommunicator::group(1).pop().unwrap();
        assert_eq!(
            comm.reduce_sum(&[1.0], 1),
            Err(CommError::InvalidRoot { root: 1, size: 1 })
        );
    }

    #[test]
    fn test_single_worker_group() {
        let out = run_local(1, |comm| {
            let mut buf = [5.0];
            comm.broadcast(&mut buf, ROOT)?;
            comm.reduce_sum(&buf, ROOT)
        })
        .unwrap();
        assert_eq!(out, vec![Some(vec![5.0])]);
    }

    #[derive(Debug, PartialEq)]
    enum TestError {
        Comm(CommError),
        Boom,
    }

    impl From<CommError> for TestError {
        fn from(e: CommError) -> Self {
            TestError::Comm(e)
        }
    }

    #[test]
    fn test_failed_worker_unblocks_peers() {
        let res: Result<Vec<()>, TestError> = run_local(3, |comm| {
            if comm.rank() == 1 {
                return Err(TestError::Boom);
            }
            // Would block forever without the abort.
            comm.reduce_sum_scalar(1.0, ROOT)?;
            Ok(())
        });
        assert_eq!(res, Err(TestError::Boom));
    }

    #[test]
    fn test_panicking_worker_unblocks_peers() {
        let res: Result<Vec<()>, CommError> = run_local(2, |comm| {
            if comm.rank() == 0 {
                panic!("worker failure");
            }
            comm.broadcast_scalar(0.0, ROOT)?;
            Ok(())
        });
        assert!(matches!(res, Err(CommError::Backend(_))));
    }

    #[test]
    fn test_abort_handle() {
        let mut group = LocalCommunicator::group(2);
        let last = group.pop().unwrap();
        last.abort();
        assert!(group[0].is_aborted());
        assert_eq!(group[0].broadcast_scalar(1.0, ROOT), Err(CommError::Aborted));
    }
}
