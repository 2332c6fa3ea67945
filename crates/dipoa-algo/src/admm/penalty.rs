//! Penalty (ρ) update rules.
//!
//! Every worker applies the rule to the same broadcast residuals, so the
//! rules must be deterministic functions of their inputs.

use serde::{Deserialize, Serialize};

use crate::error::{DipoaError, DipoaResult};

pub trait PenaltyRule: Send + Sync {
    /// Next ρ from the aggregate primal residual, the dual residual and the
    /// current ρ.
    fn update(&self, primal: f64, dual: f64, rho: f64) -> f64;
}

/// Residual balancing: keep primal and dual residuals within a factor `mu`
/// of each other by scaling ρ by `tau`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidualBalancing {
    pub mu: f64,
    pub tau: f64,
    pub min_penalty: f64,
    pub max_penalty: f64,
}

impl Default for ResidualBalancing {
    fn default() -> Self {
        Self {
            mu: 10.0,
            tau: 2.0,
            min_penalty: 1e-6,
            max_penalty: 1e6,
        }
    }
}

impl ResidualBalancing {
    pub fn validate(&self) -> DipoaResult<()> {
        if !(self.mu > 1.0 && self.mu.is_finite()) {
            return Err(DipoaError::InvalidConfig(format!(
                "penalty mu must be greater than 1, got {}",
                self.mu
            )));
        }
        if !(self.tau > 1.0 && self.tau.is_finite()) {
            return Err(DipoaError::InvalidConfig(format!(
                "penalty tau must be greater than 1, got {}",
                self.tau
            )));
        }
        if !(self.min_penalty > 0.0
            && self.min_penalty <= self.max_penalty
            && self.max_penalty.is_finite())
        {
            return Err(DipoaError::InvalidConfig(format!(
                "penalty bounds must satisfy 0 < min_penalty <= max_penalty, got [{}, {}]",
                self.min_penalty, self.max_penalty
            )));
        }
        Ok(())
    }
}

impl PenaltyRule for ResidualBalancing {
    fn update(&self, primal: f64, dual: f64, rho: f64) -> f64 {
        let ratio = primal / dual.max(1e-10);

        if ratio > self.mu {
            // consensus lags: push harder
            (rho * self.tau).min(self.max_penalty)
        } else if ratio < 1.0 / self.mu {
            (rho / self.tau).max(self.min_penalty)
        } else {
            rho
        }
    }
}

/// Keeps ρ unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPenalty;

impl PenaltyRule for FixedPenalty {
    fn update(&self, _primal: f64, _dual: f64, rho: f64) -> f64 {
        rho
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_residual_balancing_directions() {
        let rule = ResidualBalancing::default();
        assert_eq!(rule.update(1.0, 0.01, 1.0), 2.0);
        assert_eq!(rule.update(0.01, 1.0, 1.0), 0.5);
        assert_eq!(rule.update(1.0, 0.5, 1.0), 1.0);
    }

    #[test]
    fn test_residual_balancing_clamps() {
        let rule = ResidualBalancing::default();
        assert_eq!(rule.update(1.0, 0.0, 1e6), 1e6);
        assert_eq!(rule.update(0.0, 1.0, 1e-6), 1e-6);
    }

    #[test]
    fn test_fixed_penalty() {
        assert_eq!(FixedPenalty.update(100.0, 0.0, 3.0), 3.0);
    }

    #[test]
    fn test_validate_rejects_shrinking_factors() {
        assert!(ResidualBalancing::default().validate().is_ok());
        for rule in [
            ResidualBalancing {
                tau: 0.0,
                ..Default::default()
            },
            ResidualBalancing {
                tau: 1.0,
                ..Default::default()
            },
            ResidualBalancing {
                mu: 0.5,
                ..Default::default()
            },
            ResidualBalancing {
                min_penalty: 0.0,
                ..Default::default()
            },
            ResidualBalancing {
                min_penalty: 10.0,
                max_penalty: 1.0,
                ..Default::default()
            },
        ] {
            assert!(matches!(rule.validate(), Err(DipoaError::InvalidConfig(_))), "{rule:?}");
        }
    }
}
