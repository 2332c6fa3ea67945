//! Relaxed consensus ADMM (RHADMM) over a fixed support pattern.
//!
//! # Algorithm
//!
//! Every worker `i` owns `f_i` and a dual vector `y_i`; the root owns the
//! consensus point `z`:
//!
//! ```text
//! x_i   = argmin f_i(x) + y_iᵀ(x − z) + ρ/2·‖x − z‖²   [s.t. g(x) <= 0]
//! x̂_i   = α·x_i + (1 − α)·z_old
//! z_old = z
//! z     = clip(Σ_i (x̂_i + y_i/ρ) / N,  ±M·support)     (root, then broadcast)
//! y_i  += ρ·(x̂_i − z)
//! ```
//!
//! # Convergence
//!
//! - Primal: `t = Σ_i ‖x_i − z‖` (reduced at the root and broadcast)
//! - Dual: `s = ρ²·N·‖z_old − z‖`
//!
//! The loop stops when `t <= eps` and `s <= eps/2`. Hitting `max_iter` is not
//! an error: the root logs a warning and the last iterate is returned.

mod penalty;

pub use penalty::{FixedPenalty, PenaltyRule, ResidualBalancing};

use dipoa_core::linalg::dist2;
use dipoa_core::{Communicator, ProblemInstance, SupportPattern, ROOT};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::{DipoaError, DipoaResult};
use crate::local::{LocalSolver, LocalSolverConfig};

/// Hard cap on inner iterations.
pub const MAX_INNER_ITERATIONS: usize = 200;

/// RHADMM configuration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RhadmmConfig {
    /// Initial penalty parameter (ρ), reset on every call.
    pub rho: f64,

    /// Over-relaxation factor (α), in `(0, 2)`.
    pub alpha: f64,

    /// Maximum inner iterations; at most [`MAX_INNER_ITERATIONS`].
    pub max_iter: usize,

    /// Residual tolerance. Primal must reach `eps`, dual `eps / 2`.
    pub eps: f64,

    /// Adjust ρ with residual balancing. When false ρ stays fixed.
    pub adaptive_penalty: bool,

    /// Residual balancing parameters.
    pub penalty: ResidualBalancing,

    /// Local subproblem solver settings.
    pub local: LocalSolverConfig,
}

impl Default for RhadmmConfig {
    fn default() -> Self {
        Self {
            rho: 1.0,
            alpha: 1.5,
            max_iter: MAX_INNER_ITERATIONS,
            eps: 5e-3,
            adaptive_penalty: true,
            penalty: ResidualBalancing::default(),
            local: LocalSolverConfig::default(),
        }
    }
}

impl RhadmmConfig {
    pub fn validate(&self) -> DipoaResult<()> {
        if self.max_iter == 0 || self.max_iter > MAX_INNER_ITERATIONS {
            return Err(DipoaError::InvalidConfig(format!(
                "inner max_iter must be in 1..={MAX_INNER_ITERATIONS}, got {}",
                self.max_iter
            )));
        }
        if !(self.rho > 0.0 && self.rho.is_finite()) {
            return Err(DipoaError::InvalidConfig(format!(
                "rho must be positive, got {}",
                self.rho
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < 2.0) {
            return Err(DipoaError::InvalidConfig(format!(
                "alpha must be in (0, 2), got {}",
                self.alpha
            )));
        }
        if !(self.eps > 0.0) {
            return Err(DipoaError::InvalidConfig(format!(
                "eps must be positive, got {}",
                self.eps
            )));
        }
        self.penalty.validate()?;
        self.local.validate()
    }

    fn penalty_rule(&self) -> Box<dyn PenaltyRule> {
        if self.adaptive_penalty {
            Box::new(self.penalty)
        } else {
            Box::new(FixedPenalty)
        }
    }
}

/// Outcome of one consensus solve on one worker.
#[derive(Debug, Clone)]
pub struct ConsensusResult {
    /// Consensus point (identical on every worker).
    pub z: Vec<f64>,
    /// `f_i(z)` for this worker.
    pub fx: f64,
    /// `∇f_i(z)` for this worker.
    pub gx: Vec<f64>,
    /// Smallest Hessian eigenvalue of `f_i`, when curvature cuts are on.
    pub curvature: Option<f64>,
    pub iterations: usize,
    pub converged: bool,
    /// Final aggregate primal residual `t`.
    pub primal_residual: f64,
    /// Final dual residual `s`.
    pub dual_residual: f64,
    pub rho: f64,
}

/// Consensus solver for one worker. Build it once per run and call
/// [`ConsensusSolver::solve`] once per outer iteration.
pub struct ConsensusSolver<'a> {
    instance: &'a ProblemInstance,
    config: RhadmmConfig,
    local: LocalSolver<'a>,
    rule: Box<dyn PenaltyRule>,
    /// Curvature of constant-Hessian objectives, computed once.
    constant_curvature: Option<f64>,
}

impl<'a> ConsensusSolver<'a> {
    /// `worker` selects which local objective the constant curvature is
    /// computed for.
    pub fn new(
        instance: &'a ProblemInstance,
        worker: usize,
        config: RhadmmConfig,
    ) -> DipoaResult<Self> {
        config.validate()?;
        let constant_curvature = match instance.objective(worker) {
            Some(obj) if instance.options().curvature_cuts && obj.has_constant_hessian() => {
                let zero = vec![0.0; instance.dimension()];
                Some(obj.min_curvature(&zero))
            }
            _ => None,
        };
        Ok(Self {
            instance,
            local: LocalSolver::new(instance, config.local.clone()),
            rule: config.penalty_rule(),
            config,
            constant_curvature,
        })
    }

    pub fn config(&self) -> &RhadmmConfig {
        &self.config
    }

    pub fn local_solver(&self) -> &LocalSolver<'a> {
        &self.local
    }

    /// Run RHADMM to consensus. Every worker of `comm` must call this in
    /// lockstep. Only the root's `support` is consulted.
    pub fn solve<C>(&self, comm: &C, support: &SupportPattern) -> DipoaResult<ConsensusResult>
    where
        C: Communicator + ?Sized,
    {
        let n = self.instance.dimension();
        let workers = comm.size();
        if workers != self.instance.workers() {
            return Err(DipoaError::InvalidConfig(format!(
                "communicator has {workers} workers but the instance has {} local objectives",
                self.instance.workers()
            )));
        }
        let worker = comm.rank();
        let objective = self
            .instance
            .objective(worker)
            .ok_or_else(|| DipoaError::InvalidConfig(format!("no objective for rank {worker}")))?;

        let alpha = self.config.alpha;
        let eps = self.config.eps;
        let bound = self.instance.bound();
        let nf = workers as f64;

        let mut rho = self.config.rho;
        let mut y = vec![0.0; n];
        let mut z = vec![0.0; n];
        let mut z_old = vec![0.0; n];
        // [z_old | z], filled at the root
        let mut shared = vec![0.0; 2 * n];

        let mut t = f64::INFINITY;
        let mut s = f64::INFINITY;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iter {
            iterations += 1;

            let x = self.local.minimize(worker, &y, &z, rho)?.x;

            let x_hat: Vec<f64> = x
                .iter()
                .zip(&z_old)
                .map(|(xi, zo)| alpha * xi + (1.0 - alpha) * zo)
                .collect();
            let contribution: Vec<f64> = x_hat
                .iter()
                .zip(&y)
                .map(|(xh, yi)| xh + yi / rho)
                .collect();

            let sum = comm.reduce_sum(&contribution, ROOT)?;
            if let Some(sum) = sum {
                shared[..n].copy_from_slice(&z);
                for (j, (zj, total)) in shared[n..].iter_mut().zip(&sum).enumerate() {
                    let limit = if support.is_active(j) { bound } else { 0.0 };
                    *zj = (total / nf).clamp(-limit, limit);
                }
            }
            comm.broadcast(&mut shared, ROOT)?;
            z_old.copy_from_slice(&shared[..n]);
            z.copy_from_slice(&shared[n..]);

            for ((yi, xh), zi) in y.iter_mut().zip(&x_hat).zip(&z) {
                *yi += rho * (xh - zi);
            }

            let r = dist2(&x, &z);
            let total = comm.reduce_sum_scalar(r, ROOT)?.unwrap_or(0.0);
            t = comm.broadcast_scalar(total, ROOT)?;
            s = rho * rho * nf * dist2(&z_old, &z);

            if comm.is_root() {
                trace!(iteration = iterations, primal = t, dual = s, rho, "rhadmm");
            }

            if t <= eps && s <= eps / 2.0 {
                converged = true;
                break;
            }

            rho = self.rule.update(t, s, rho);
        }

        if !converged && comm.is_root() {
            warn!(
                iterations,
                primal = t,
                dual = s,
                "RHADMM did not converge: primal={:.2e}, dual={:.2e}",
                t,
                s
            );
        }

        let curvature = if self.instance.options().curvature_cuts {
            Some(
                self.constant_curvature
                    .unwrap_or_else(|| objective.min_curvature(&z)),
            )
        } else {
            None
        };

        Ok(ConsensusResult {
            fx: objective.value(&z),
            gx: objective.gradient(&z),
            z,
            curvature,
            iterations,
            converged,
            primal_residual: t,
            dual_residual: s,
            rho,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rhadmm_config_default() {
        let config = RhadmmConfig::default();
        assert_eq!(config.rho, 1.0);
        assert_eq!(config.alpha, 1.5);
        assert_eq!(config.max_iter, 200);
        assert_eq!(config.eps, 5e-3);
        assert!(config.adaptive_penalty);
    }

    #[test]
    fn test_rhadmm_config_validation() {
        assert!(RhadmmConfig::default().validate().is_ok());
        for bad in [
            RhadmmConfig {
                max_iter: 0,
                ..Default::default()
            },
            RhadmmConfig {
                max_iter: 201,
                ..Default::default()
            },
            RhadmmConfig {
                alpha: 2.0,
                ..Default::default()
            },
            RhadmmConfig {
                rho: 0.0,
                ..Default::default()
            },
            RhadmmConfig {
                eps: -1.0,
                ..Default::default()
            },
        ] {
            assert!(matches!(bad.validate(), Err(DipoaError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_partial_config_from_toml() {
        let config: RhadmmConfig = toml::from_str("max_iter = 50\n[penalty]\ntau = 3.0\n").unwrap();
        assert_eq!(config.max_iter, 50);
        assert_eq!(config.penalty.tau, 3.0);
        assert_eq!(config.penalty.mu, 10.0);
        assert_eq!(config.alpha, 1.5);
    }
}
