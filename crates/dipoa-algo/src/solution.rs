//! Run record written by the root at the end of a solve.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DipoaResult;

/// Bounds after one outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Final result of a DiPOA run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DipoaSolution {
    /// Master candidate point of the last iteration.
    pub x: Vec<f64>,
    /// Final lower bound.
    pub obj: f64,
    /// Final relative gap.
    pub gap: f64,
    /// Lower bound per iteration.
    pub lb: Vec<f64>,
    /// Upper bound per iteration.
    pub ub: Vec<f64>,
    /// Iteration index of each history entry.
    pub iter: Vec<usize>,
    /// Wall-clock seconds.
    pub elapsed_time: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl DipoaSolution {
    pub fn from_history(
        x: Vec<f64>,
        gap: f64,
        history: &[IterationRecord],
        elapsed_time: f64,
        converged: bool,
    ) -> Self {
        let obj = history
            .last()
            .map(|r| r.lower_bound)
            .unwrap_or(f64::NEG_INFINITY);
        Self {
            x,
            obj,
            gap,
            lb: history.iter().map(|r| r.lower_bound).collect(),
            ub: history.iter().map(|r| r.upper_bound).collect(),
            iter: history.iter().map(|r| r.iteration).collect(),
            elapsed_time,
            iterations: history.len(),
            converged,
        }
    }

    pub fn history(&self) -> Vec<IterationRecord> {
        self.iter
            .iter()
            .zip(self.lb.iter().zip(&self.ub))
            .map(|(&iteration, (&lower_bound, &upper_bound))| IterationRecord {
                iteration,
                lower_bound,
                upper_bound,
            })
            .collect()
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> DipoaResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn read_json(path: impl AsRef<Path>) -> DipoaResult<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DipoaSolution {
        let history = [
            IterationRecord {
                iteration: 0,
                lower_bound: -2.0,
                upper_bound: 5.0,
            },
            IterationRecord {
                iteration: 1,
                lower_bound: 3.99,
                upper_bound: 4.0,
            },
        ];
        DipoaSolution::from_history(vec![1.0, 0.5], 0.0025, &history, 0.75, true)
    }

    #[test]
    fn test_from_history() {
        let sol = sample();
        assert_eq!(sol.obj, 3.99);
        assert_eq!(sol.iter, vec![0, 1]);
        assert_eq!(sol.ub, vec![5.0, 4.0]);
        assert_eq!(sol.iterations, 2);
        assert_eq!(sol.history().len(), 2);
    }

    #[test]
    fn test_json_keys() {
        let value = serde_json::to_value(sample()).unwrap();
        for key in ["x", "obj", "gap", "lb", "ub", "iter", "elapsed_time"] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solution.json");
        let sol = sample();
        sol.write_json(&path).unwrap();
        assert_eq!(DipoaSolution::read_json(&path).unwrap(), sol);
    }
}
