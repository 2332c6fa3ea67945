//! Append-only store of outer-approximation cuts.
//!
//! Insertion order is significant: the master assigns the `k`-th objective
//! cut to epigraph slot `k mod N`.

use serde::{Deserialize, Serialize};

/// Linearisation of one worker's objective at a consensus point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveCut {
    pub iteration: usize,
    pub worker: usize,
    pub x: Vec<f64>,
    pub fx: f64,
    pub gx: Vec<f64>,
    /// Smallest Hessian eigenvalue at `x`, for curvature cuts.
    pub eig: Option<f64>,
}

/// Linearisation of the global constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintCut {
    pub x: Vec<f64>,
    /// `g(x)`
    pub gx: f64,
    /// `∇g(x)`
    pub ggx: Vec<f64>,
    pub eig_g: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CutStore {
    objective_cuts: Vec<ObjectiveCut>,
    constraint_cuts: Vec<ConstraintCut>,
}

impl CutStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_cut(
        &mut self,
        iteration: usize,
        worker: usize,
        x: Vec<f64>,
        fx: f64,
        gx: Vec<f64>,
        eig: Option<f64>,
    ) {
        self.objective_cuts.push(ObjectiveCut {
            iteration,
            worker,
            x,
            fx,
            gx,
            eig,
        });
    }

    pub fn store_constraint_cut(&mut self, x: Vec<f64>, gx: f64, ggx: Vec<f64>, eig_g: Option<f64>) {
        self.constraint_cuts.push(ConstraintCut { x, gx, ggx, eig_g });
    }

    pub fn objective_cuts(&self) -> &[ObjectiveCut] {
        &self.objective_cuts
    }

    pub fn constraint_cuts(&self) -> &[ConstraintCut] {
        &self.constraint_cuts
    }

    pub fn num_objective_cuts(&self) -> usize {
        self.objective_cuts.len()
    }

    pub fn num_constraint_cuts(&self) -> usize {
        self.constraint_cuts.len()
    }

    /// Epigraph slot of the `index`-th objective cut among `workers` slots.
    pub fn slot_for(index: usize, workers: usize) -> usize {
        index % workers.max(1)
    }

    /// Objective cuts paired with their slot, in insertion order.
    pub fn slotted_objective_cuts(
        &self,
        workers: usize,
    ) -> impl Iterator<Item = (usize, &ObjectiveCut)> + '_ {
        self.objective_cuts
            .iter()
            .enumerate()
            .map(move |(k, cut)| (Self::slot_for(k, workers), cut))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_only_order() {
        let mut store = CutStore::new();
        for it in 0..3 {
            for w in 0..2 {
                store.store_cut(it, w, vec![0.0], it as f64, vec![1.0], None);
            }
        }
        store.store_constraint_cut(vec![0.0], -1.0, vec![0.0], Some(2.0));

        assert_eq!(store.num_objective_cuts(), 6);
        assert_eq!(store.num_constraint_cuts(), 1);
        let iterations: Vec<usize> = store.objective_cuts().iter().map(|c| c.iteration).collect();
        assert_eq!(iterations, vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn test_round_robin_slots() {
        let mut store = CutStore::new();
        for k in 0..7 {
            store.store_cut(k / 3, k % 3, vec![], 0.0, vec![], None);
        }
        let slots: Vec<usize> = store.slotted_objective_cuts(3).map(|(s, _)| s).collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(CutStore::slot_for(10, 4), 2);
    }
}
