//! Outer-approximation loop.
//!
//! Every outer iteration runs RHADMM on all workers, sends the consensus
//! point with each worker's value, gradient and curvature to the root, adds
//! one cut per worker (plus one constraint cut) and solves the master. The
//! root then broadcasts the relative gap, so every worker leaves the loop in
//! the same iteration.
//!
//! The cut store and the master live in a root-only [`RootState`]; other
//! workers only see broadcast values.

use std::path::Path;

use dipoa_core::{run_local, Communicator, ProblemInstance, SupportPattern, ROOT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use web_time::Instant;

use crate::admm::{ConsensusResult, ConsensusSolver, RhadmmConfig};
use crate::cuts::CutStore;
use crate::error::{DipoaError, DipoaResult};
use crate::master::{BranchAndBound, MasterConfig, MasterProblem, MasterSolver};
use crate::solution::{DipoaSolution, IterationRecord};
use crate::warm_start::warm_start;

/// Hard cap on outer iterations.
pub const MAX_OUTER_ITERATIONS: usize = 200;

pub const INITIAL_UPPER_BOUND: f64 = 1e8;
pub const INITIAL_LOWER_BOUND: f64 = -1e8;

/// Outer loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DipoaConfig {
    /// Maximum outer iterations; at most [`MAX_OUTER_ITERATIONS`].
    pub max_iter: usize,
    /// Relative gap at which the loop stops.
    pub gap_tol: f64,
}

impl Default for DipoaConfig {
    fn default() -> Self {
        Self {
            max_iter: MAX_OUTER_ITERATIONS,
            gap_tol: 0.015,
        }
    }
}

impl DipoaConfig {
    pub fn validate(&self) -> DipoaResult<()> {
        if self.max_iter == 0 || self.max_iter > MAX_OUTER_ITERATIONS {
            return Err(DipoaError::InvalidConfig(format!(
                "outer max_iter must be in 1..={MAX_OUTER_ITERATIONS}, got {}",
                self.max_iter
            )));
        }
        if !(self.gap_tol >= 0.0) {
            return Err(DipoaError::InvalidConfig(format!(
                "gap_tol must be non-negative, got {}",
                self.gap_tol
            )));
        }
        Ok(())
    }
}

/// All solver settings, as read from a TOML file.
///
/// ```toml
/// [dipoa]
/// max_iter = 50
///
/// [rhadmm]
/// eps = 1e-3
///
/// [master]
/// node_limit = 500
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub dipoa: DipoaConfig,
    pub rhadmm: RhadmmConfig,
    pub master: MasterConfig,
}

impl SolverSettings {
    pub fn from_toml_str(text: &str) -> DipoaResult<Self> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> DipoaResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> DipoaResult<()> {
        self.dipoa.validate()?;
        self.rhadmm.validate()?;
        if self.master.node_limit == 0 {
            return Err(DipoaError::InvalidConfig(
                "master node_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// `(ub − lb) / |ub + 1e-8|`
pub fn relative_gap(upper_bound: f64, lower_bound: f64) -> f64 {
    (upper_bound - lower_bound) / (upper_bound + 1e-8).abs()
}

/// What one worker saw during a run.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub rank: usize,
    /// Outer iterations executed.
    pub iterations: usize,
    /// Broadcast gap after every outer iteration.
    pub gaps: Vec<f64>,
    /// Run record; only the root has one.
    pub solution: Option<DipoaSolution>,
    /// Final cut store (root only).
    pub cuts: Option<CutStore>,
    /// Consensus point `z` of every outer iteration, in order.
    pub consensus_points: Vec<Vec<f64>>,
    /// Consensus diagnostics of the last outer iteration.
    pub last_consensus: Option<ConsensusResult>,
}

/// Root-only state: cut store, master and bound history.
struct RootState<'m, M> {
    master: &'m M,
    problem: MasterProblem,
    cuts: CutStore,
    upper_bound: f64,
    lower_bound: f64,
    history: Vec<IterationRecord>,
    candidate: Vec<f64>,
    constraint_curvature: Option<f64>,
}

impl<'m, M: MasterSolver> RootState<'m, M> {
    fn new(master: &'m M, instance: &ProblemInstance) -> Self {
        let soc = instance.options().curvature_cuts;
        let constraint_curvature = instance
            .constraint()
            .filter(|_| soc)
            .map(|g| g.min_curvature());
        Self {
            master,
            problem: MasterProblem::from_instance(instance),
            cuts: CutStore::new(),
            upper_bound: INITIAL_UPPER_BOUND,
            lower_bound: INITIAL_LOWER_BOUND,
            history: Vec::new(),
            candidate: vec![0.0; instance.dimension()],
            constraint_curvature,
        }
    }

    /// Add this iteration's cuts, solve the master and return the new gap
    /// and support.
    fn step(
        &mut self,
        iteration: usize,
        instance: &ProblemInstance,
        upper_candidate: f64,
        rows: &[Vec<f64>],
        started: &Instant,
    ) -> DipoaResult<(f64, SupportPattern)> {
        let n = instance.dimension();
        self.upper_bound = self.upper_bound.min(upper_candidate);

        let mut consensus_point = None;
        for (worker, row) in rows.iter().enumerate() {
            let cut = GatheredCut::parse(row, n, self.problem.curvature_cuts)?;
            self.cuts.store_cut(
                iteration,
                worker,
                cut.x.to_vec(),
                cut.fx,
                cut.gx.to_vec(),
                cut.eig,
            );
            consensus_point.get_or_insert(cut.x);
        }

        if let (Some(g), Some(x)) = (instance.constraint(), consensus_point) {
            self.cuts.store_constraint_cut(
                x.to_vec(),
                g.value(x),
                g.gradient(x),
                self.constraint_curvature,
            );
        }

        let solution = self.master.solve(&self.problem, &self.cuts)?;
        debug!(
            iteration,
            objective_cuts = self.cuts.num_objective_cuts(),
            constraint_cuts = self.cuts.num_constraint_cuts(),
            nodes = solution.nodes,
            "master solved"
        );
        self.lower_bound = solution.lower_bound;
        self.candidate = solution.x;

        let gap = relative_gap(self.upper_bound, self.lower_bound);
        self.history.push(IterationRecord {
            iteration,
            lower_bound: self.lower_bound,
            upper_bound: self.upper_bound,
        });
        info!(
            "k={} lb={:.6} ub={:.6} gap={:.4e} elapsed={:.2}s",
            iteration,
            self.lower_bound,
            self.upper_bound,
            gap,
            started.elapsed().as_secs_f64()
        );
        Ok((gap, solution.support))
    }
}

/// One worker's gathered row: `[fx | x | gx | eig?]`.
struct GatheredCut<'r> {
    fx: f64,
    x: &'r [f64],
    gx: &'r [f64],
    eig: Option<f64>,
}

impl<'r> GatheredCut<'r> {
    fn encode(result: &ConsensusResult) -> Vec<f64> {
        let mut row = Vec::with_capacity(2 * result.z.len() + 2);
        row.push(result.fx);
        row.extend_from_slice(&result.z);
        row.extend_from_slice(&result.gx);
        if let Some(eig) = result.curvature {
            row.push(eig);
        }
        row
    }

    fn parse(row: &'r [f64], n: usize, curvature: bool) -> DipoaResult<Self> {
        let expected = 1 + 2 * n + usize::from(curvature);
        if row.len() != expected {
            return Err(DipoaError::InvalidConfig(format!(
                "gathered cut row has {} entries, expected {expected}",
                row.len()
            )));
        }
        Ok(Self {
            fx: row[0],
            x: &row[1..1 + n],
            gx: &row[1 + n..1 + 2 * n],
            eig: curvature.then(|| row[1 + 2 * n]),
        })
    }
}

/// Distributed primal outer approximation.
pub struct DipoaSolver<'a, M = BranchAndBound> {
    instance: &'a ProblemInstance,
    settings: SolverSettings,
    master: M,
}

impl<'a> DipoaSolver<'a> {
    pub fn new(instance: &'a ProblemInstance, settings: SolverSettings) -> DipoaResult<Self> {
        settings.validate()?;
        let master = BranchAndBound::new(settings.master.clone());
        Ok(Self {
            instance,
            settings,
            master,
        })
    }
}

impl<'a, M: MasterSolver> DipoaSolver<'a, M> {
    /// Replace the master solver.
    pub fn with_master<M2: MasterSolver>(self, master: M2) -> DipoaSolver<'a, M2> {
        DipoaSolver {
            instance: self.instance,
            settings: self.settings,
            master,
        }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn instance(&self) -> &ProblemInstance {
        self.instance
    }

    /// Run the outer loop on this worker. Every rank of `comm` must call it.
    pub fn run<C>(&self, comm: &C) -> DipoaResult<WorkerReport>
    where
        C: Communicator + ?Sized,
    {
        let started = Instant::now();
        let instance = self.instance;
        let config = &self.settings.dipoa;
        let consensus = ConsensusSolver::new(instance, comm.rank(), self.settings.rhadmm.clone())?;

        if comm.is_root() {
            info!(
                family = %instance.family(),
                n = instance.dimension(),
                workers = comm.size(),
                kappa = instance.kappa(),
                bound = instance.bound(),
                soc = instance.options().curvature_cuts,
                sfp = instance.options().warm_start,
                "starting DiPOA"
            );
        }

        let mut support = if instance.options().warm_start {
            warm_start(comm, instance, consensus.local_solver())?
        } else {
            SupportPattern::zeros(instance.dimension())
        };

        let mut root = comm
            .is_root()
            .then(|| RootState::new(&self.master, instance));
        let mut gaps = Vec::new();
        let mut converged = false;
        let mut consensus_points = Vec::new();
        let mut last_consensus = None;

        for iteration in 0..config.max_iter {
            let result = consensus.solve(comm, &support)?;

            let upper_candidate = comm.reduce_sum_scalar(result.fx, ROOT)?;
            let rows = comm.gather(&GatheredCut::encode(&result), ROOT)?;

            let mut gap = 0.0;
            if let (Some(state), Some(rows), Some(ub)) = (root.as_mut(), rows, upper_candidate) {
                let (g, next_support) = state.step(iteration, instance, ub, &rows, &started)?;
                gap = g;
                support = next_support;
            }
            let gap = comm.broadcast_scalar(gap, ROOT)?;
            gaps.push(gap);
            consensus_points.push(result.z.clone());
            last_consensus = Some(result);

            if gap <= config.gap_tol {
                converged = true;
                break;
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        let (solution, cuts) = match root {
            Some(state) => {
                if converged {
                    info!(
                        iterations = state.history.len(),
                        objective = state.lower_bound,
                        "DiPOA converged in {:.2}s",
                        elapsed
                    );
                }
                let gap = relative_gap(state.upper_bound, state.lower_bound);
                let solution = DipoaSolution::from_history(
                    state.candidate,
                    gap,
                    &state.history,
                    elapsed,
                    converged,
                );
                (Some(solution), Some(state.cuts))
            }
            None => (None, None),
        };

        Ok(WorkerReport {
            rank: comm.rank(),
            iterations: gaps.len(),
            gaps,
            solution,
            cuts,
            consensus_points,
            last_consensus,
        })
    }
}

impl<'a, M: MasterSolver + Sync> DipoaSolver<'a, M> {
    /// Run on an in-process group of `instance.workers()` threads and return
    /// every worker's report, ordered by rank.
    pub fn run_in_process(&self) -> DipoaResult<Vec<WorkerReport>> {
        run_local(self.instance.workers(), |comm| self.run(&comm))
    }

    /// Like [`Self::run_in_process`], returning only the root's solution.
    pub fn solve_in_process(&self) -> DipoaResult<DipoaSolution> {
        self.run_in_process()?
            .into_iter()
            .find_map(|report| report.solution)
            .ok_or_else(|| DipoaError::InvalidConfig("root produced no solution".to_string()))
    }
}
