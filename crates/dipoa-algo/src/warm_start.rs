//! Cooperative support pump used as the initial support pattern.
//!
//! Every worker minimises its own objective (plus a small proximal term),
//! the root sums the minimisers and keeps the `kappa` coordinates of largest
//! magnitude.

use dipoa_core::{Communicator, ProblemInstance, SupportPattern, ROOT};
use tracing::debug;

use crate::error::DipoaResult;
use crate::local::LocalSolver;

/// Proximal weight of the warm-start subproblem.
pub const WARM_START_PROXIMAL: f64 = 1e-3;

/// Collective: every worker of `comm` must call it, and all receive the
/// same pattern.
pub fn warm_start<C>(
    comm: &C,
    instance: &ProblemInstance,
    local: &LocalSolver<'_>,
) -> DipoaResult<SupportPattern>
where
    C: Communicator + ?Sized,
{
    let n = instance.dimension();
    let zeros = vec![0.0; n];
    let minimiser = local
        .minimize(comm.rank(), &zeros, &zeros, WARM_START_PROXIMAL)?
        .x;

    let mut pattern = vec![0.0; n];
    if let Some(sum) = comm.reduce_sum(&minimiser, ROOT)? {
        let support = top_k_support(&sum, instance.kappa());
        debug!(
            active = ?support.active_indices().collect::<Vec<_>>(),
            "warm start support"
        );
        pattern = support.to_values();
    }
    comm.broadcast(&mut pattern, ROOT)?;
    Ok(SupportPattern::from_values(&pattern))
}

/// Indices of the `k` largest `|v_j|`, lower index first on ties.
pub fn top_k_support(values: &[f64], k: usize) -> SupportPattern {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .abs()
            .total_cmp(&values[a].abs())
            .then(a.cmp(&b))
    });
    order.truncate(k);
    SupportPattern::from_indices(values.len(), order)
}
