//! Best-first branch and bound over the `delta` binaries.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use dipoa_core::SupportPattern;
use tracing::{debug, warn};

use super::model::{MasterModel, NodeFixings, RelaxationOutcome};
use super::{MasterConfig, MasterProblem, MasterSolution, MasterSolver};
use crate::cuts::CutStore;
use crate::error::MasterError;

/// Node in the search tree.
#[derive(Debug, Clone)]
struct SearchNode {
    id: u64,
    depth: usize,
    fixings: NodeFixings,
    /// Relaxation objective of the parent.
    bound: f64,
}

impl SearchNode {
    fn root(dimension: usize) -> Self {
        Self {
            id: 0,
            depth: 0,
            fixings: vec![None; dimension],
            bound: f64::NEG_INFINITY,
        }
    }

    fn child(&self, id: u64, var: usize, value: bool, bound: f64) -> Self {
        let mut fixings = self.fixings.clone();
        fixings[var] = Some(value);
        Self {
            id,
            depth: self.depth + 1,
            fixings,
            bound,
        }
    }

    fn can_prune(&self, incumbent: f64, gap: f64) -> bool {
        within_gap(self.bound, incumbent, gap)
    }

    /// Apply the cardinality row to the fixings. Returns false when the node
    /// fixes more than `kappa` binaries to one.
    fn propagate(&mut self, kappa: usize) -> bool {
        let ones = self.fixings.iter().filter(|f| **f == Some(true)).count();
        if ones > kappa {
            return false;
        }
        if ones == kappa {
            for f in self.fixings.iter_mut().filter(|f| f.is_none()) {
                *f = Some(false);
            }
        }
        true
    }
}

fn within_gap(bound: f64, incumbent: f64, gap: f64) -> bool {
    bound >= incumbent - gap * incumbent.abs().max(1.0)
}

/// Lowest bound first, newest node on ties.
struct QueuedNode(SearchNode);

impl PartialEq for QueuedNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedNode {}

impl PartialOrd for QueuedNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .bound
            .partial_cmp(&self.0.bound)
            .unwrap_or(Ordering::Equal)
            .then(self.0.id.cmp(&other.0.id))
    }
}

struct Incumbent {
    objective: f64,
    x: Vec<f64>,
    support: SupportPattern,
}

/// Branch and bound with a conic relaxation at every node.
#[derive(Debug, Clone, Default)]
pub struct BranchAndBound {
    config: MasterConfig,
}

impl BranchAndBound {
    pub fn new(config: MasterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Most fractional free binary, or `None` when `delta` is integral.
    fn select_most_fractional(&self, delta: &[f64], fixings: &[Option<bool>]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (j, &value) in delta.iter().enumerate() {
            if fixings[j].is_some() {
                continue;
            }
            let frac = value - value.floor();
            let dist = frac.min(1.0 - frac);
            if dist <= self.config.integrality_tol {
                continue;
            }
            if best.map_or(true, |(_, d)| dist > d) {
                best = Some((j, dist));
            }
        }
        best.map(|(j, _)| j)
    }

    /// Round-up heuristic: if the relaxed `x` already has at most `kappa`
    /// nonzeros, setting `delta` to its indicator is feasible at the same
    /// objective.
    fn round_up(&self, x: &[f64], kappa: usize) -> Option<SupportPattern> {
        let active: Vec<usize> = x
            .iter()
            .enumerate()
            .filter(|(_, v)| v.abs() > self.config.support_tol)
            .map(|(j, _)| j)
            .collect();
        (active.len() <= kappa).then(|| SupportPattern::from_indices(x.len(), active))
    }
}

impl MasterSolver for BranchAndBound {
    fn solve(&self, problem: &MasterProblem, cuts: &CutStore) -> Result<MasterSolution, MasterError> {
        // an epigraph slot without a cut leaves its alpha free
        if cuts.num_objective_cuts() < problem.workers {
            return Err(MasterError::Unbounded {
                cuts: cuts.num_objective_cuts(),
                slots: problem.workers,
            });
        }

        let model = MasterModel::new(problem, cuts, self.config.conic_max_iters);
        let mut queue = BinaryHeap::new();
        queue.push(QueuedNode(SearchNode::root(problem.dimension)));

        let mut incumbent: Option<Incumbent> = None;
        let mut next_id = 1;
        let mut nodes = 0;
        let mut limit_hit = false;

        while let Some(QueuedNode(mut node)) = queue.pop() {
            if let Some(inc) = &incumbent {
                if node.can_prune(inc.objective, self.config.mip_gap) {
                    continue;
                }
            }
            if nodes >= self.config.node_limit {
                // put it back so its bound still counts
                queue.push(QueuedNode(node));
                limit_hit = true;
                break;
            }
            if !node.propagate(problem.kappa) {
                continue;
            }
            nodes += 1;

            let (objective, x, delta) = match model.solve_relaxation(&node.fixings) {
                RelaxationOutcome::Optimal {
                    objective,
                    x,
                    delta,
                } => (objective, x, delta),
                RelaxationOutcome::Infeasible => {
                    if node.depth == 0 {
                        return Err(MasterError::Infeasible);
                    }
                    continue;
                }
                RelaxationOutcome::Unbounded => {
                    return Err(MasterError::Unbounded {
                        cuts: cuts.num_objective_cuts(),
                        slots: problem.workers,
                    })
                }
                RelaxationOutcome::Failed(status) => return Err(MasterError::Numerical(status)),
            };

            if let Some(inc) = &incumbent {
                if within_gap(objective, inc.objective, self.config.mip_gap) {
                    continue;
                }
            }

            let branch_var = self.select_most_fractional(&delta, &node.fixings);
            let candidate = match branch_var {
                None => Some(SupportPattern::from_values(&delta)),
                Some(_) => self.round_up(&x, problem.kappa),
            };

            if let Some(support) = candidate {
                debug!(node = node.id, depth = node.depth, objective, "new incumbent");
                incumbent = Some(Incumbent {
                    objective,
                    x,
                    support,
                });
            } else if let Some(var) = branch_var {
                for value in [false, true] {
                    queue.push(QueuedNode(node.child(next_id, var, value, objective)));
                    next_id += 1;
                }
            }
        }

        let Some(best) = incumbent else {
            return Err(if limit_hit {
                MasterError::NodeLimit { nodes }
            } else {
                MasterError::Infeasible
            });
        };

        let lower_bound = if limit_hit {
            let open = queue
                .iter()
                .map(|QueuedNode(n)| n.bound)
                .fold(f64::INFINITY, f64::min);
            warn!(
                nodes,
                incumbent = best.objective,
                open_bound = open,
                "master node limit reached"
            );
            best.objective.min(open)
        } else {
            best.objective
        };

        debug!(nodes, lower_bound, "master solved");
        Ok(MasterSolution {
            lower_bound,
            support: best.support,
            x: best.x,
            nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem(workers: usize, dimension: usize, kappa: usize) -> MasterProblem {
        MasterProblem {
            dimension,
            workers,
            bound: 3.0,
            kappa,
            curvature_cuts: false,
        }
    }

    #[test]
    fn test_queue_order() {
        let mut heap = BinaryHeap::new();
        let root = SearchNode::root(2);
        heap.push(QueuedNode(root.child(1, 0, false, 5.0)));
        heap.push(QueuedNode(root.child(2, 0, true, 1.0)));
        heap.push(QueuedNode(root.child(3, 1, true, 1.0)));
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|q| q.0.id)).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn test_propagation() {
        let mut node = SearchNode::root(3);
        node.fixings[0] = Some(true);
        assert!(node.propagate(1));
        assert_eq!(node.fixings, vec![Some(true), Some(false), Some(false)]);

        let mut over = SearchNode::root(2);
        over.fixings = vec![Some(true), Some(true)];
        assert!(!over.propagate(1));
    }

    #[test]
    fn test_most_fractional() {
        let bnb = BranchAndBound::default();
        let free = vec![None; 3];
        assert_eq!(bnb.select_most_fractional(&[0.1, 0.45, 1.0], &free), Some(1));
        assert_eq!(bnb.select_most_fractional(&[0.0, 1.0, 1.0 - 1e-9], &free), None);
        let fixed = vec![None, Some(true), None];
        assert_eq!(bnb.select_most_fractional(&[0.2, 0.5, 0.0], &fixed), Some(0));
    }

    #[test]
    fn test_unbounded_without_cuts() {
        let mut cuts = CutStore::new();
        cuts.store_cut(0, 0, vec![0.0], 0.0, vec![1.0], None);
        let err = BranchAndBound::default()
            .solve(&problem(2, 1, 1), &cuts)
            .unwrap_err();
        assert!(matches!(err, MasterError::Unbounded { cuts: 1, slots: 2 }));
    }

    #[test]
    fn test_cardinality_is_enforced() {
        // alpha >= −x1 − x2 with kappa = 1: best is one coordinate at M
        let mut cuts = CutStore::new();
        cuts.store_cut(0, 0, vec![0.0, 0.0], 0.0, vec![-1.0, -1.0], None);
        let sol = BranchAndBound::default()
            .solve(&problem(1, 2, 1), &cuts)
            .unwrap();
        assert!((sol.lower_bound + 3.0).abs() < 1e-4);
        assert_eq!(sol.support.count(), 1);
        let nonzero = sol.x.iter().filter(|v| v.abs() > 1e-4).count();
        assert_eq!(nonzero, 1);
    }

    #[test]
    fn test_sum_of_slots() {
        // f1 = (x1 − 1)², f2 = (x2 − 2)² linearised at the origin
        let mut cuts = CutStore::new();
        cuts.store_cut(0, 0, vec![0.0, 0.0], 1.0, vec![-2.0, 0.0], None);
        cuts.store_cut(0, 1, vec![0.0, 0.0], 4.0, vec![0.0, -4.0], None);
        let sol = BranchAndBound::default()
            .solve(&problem(2, 2, 2), &cuts)
            .unwrap();
        // both coordinates at M = 3: (1 − 6) + (4 − 12)
        assert!((sol.lower_bound + 13.0).abs() < 1e-4);
        assert_eq!(sol.support.active_indices().collect::<Vec<_>>(), vec![0, 1]);
    }
}
