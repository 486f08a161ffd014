//! Pluggable derivative-free constrained minimization.

use crate::core::error::{CorrectionError, CorrectionResult};
use serde::{Deserialize, Serialize};

/// A minimization problem with inequality constraints `c(x) >= 0`
pub trait ConstrainedProblem: Sync {
    fn dimension(&self) -> usize;

    fn num_constraints(&self) -> usize;

    /// Write the constraint values into `constraints` and return the objective
    fn evaluate(&self, x: &[f64], constraints: &mut [f64]) -> f64;
}

/// Trust-region settings shared by every optimizer run of a job
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Initial trust-region radius
    pub rhobeg: f64,
    /// Final trust-region radius, the convergence tolerance
    pub rhoend: f64,
    /// Maximum number of objective evaluations per run
    pub maxfun: usize,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            rhobeg: 1.0,
            rhoend: 1e-10,
            maxfun: 10_000,
        }
    }
}

impl OptimizerSettings {
    pub fn validate(&self) -> CorrectionResult<()> {
        if !(self.rhobeg.is_finite() && self.rhobeg > 0.0) {
            return Err(CorrectionError::configuration(
                "optimizer.rhobeg",
                format!("must be positive and finite, got {}", self.rhobeg),
            ));
        }
        if !(self.rhoend.is_finite() && self.rhoend > 0.0) {
            return Err(CorrectionError::configuration(
                "optimizer.rhoend",
                format!("must be positive and finite, got {}", self.rhoend),
            ));
        }
        if self.rhoend >= self.rhobeg {
            return Err(CorrectionError::configuration(
                "optimizer.rhoend",
                format!(
                    "must be smaller than rhobeg ({} >= {})",
                    self.rhoend, self.rhobeg
                ),
            ));
        }
        if self.maxfun == 0 {
            return Err(CorrectionError::configuration(
                "optimizer.maxfun",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The trust-region radius reached `rhoend`
    Converged,
    /// The evaluation budget was exhausted first
    MaxEvaluations,
    /// Rounding errors stopped progress before `rhoend` was reached
    RoundingErrors,
    /// The backend rejected the problem or stopped with an internal failure
    Failed,
}

/// Result of one minimizer invocation; neither feasibility nor optimality is implied
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizeOutcome {
    pub x: Vec<f64>,
    pub objective: f64,
    /// Largest constraint violation at `x`
    pub max_violation: f64,
    pub evaluations: usize,
    pub termination: TerminationReason,
}

impl MinimizeOutcome {
    pub fn converged(&self) -> bool {
        self.termination == TerminationReason::Converged
    }
}

/// Local derivative-free constrained solver
pub trait ConstrainedMinimizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Minimize from `x0`, which may be infeasible. Must be a pure function of
    /// its inputs.
    fn minimize(
        &self,
        problem: &dyn ConstrainedProblem,
        x0: &[f64],
        settings: &OptimizerSettings,
    ) -> MinimizeOutcome;
}
