//! COBYLA (Powell's Constrained Optimization BY Linear Approximations) through
//! NLopt, behind the [`ConstrainedMinimizer`] interface.
//!
//! NLopt expects inequality constraints as `fc(x) <= 0`, so every `c_k(x) >= 0`
//! is registered negated. The objective and all constraint callbacks share a
//! single problem evaluation per point.

use crate::correction::optimizer::{
    ConstrainedMinimizer, ConstrainedProblem, MinimizeOutcome, OptimizerSettings,
    TerminationReason,
};
use nlopt::{Algorithm, FailState, Nlopt, ObjFn, SuccessState, Target};
use std::cell::RefCell;
use tracing::trace;

#[derive(Debug, Default, Clone, Copy)]
pub struct Cobyla;

impl Cobyla {
    pub fn new() -> Self {
        Self
    }
}

/// Last evaluated point with its objective and constraint values
struct PointCache<'p> {
    problem: &'p dyn ConstrainedProblem,
    x: Vec<f64>,
    objective: f64,
    constraints: Vec<f64>,
    evaluations: usize,
}

impl<'p> PointCache<'p> {
    fn new(problem: &'p dyn ConstrainedProblem) -> Self {
        Self {
            problem,
            x: Vec::with_capacity(problem.dimension()),
            objective: f64::NAN,
            constraints: vec![0.0; problem.num_constraints()],
            evaluations: 0,
        }
    }

    fn evaluate(&mut self, x: &[f64]) {
        if self.evaluations > 0 && self.x.as_slice() == x {
            return;
        }
        self.x.clear();
        self.x.extend_from_slice(x);
        self.objective = self.problem.evaluate(x, &mut self.constraints);
        self.evaluations += 1;
    }
}

struct ConstraintSlot<'c, 'p> {
    index: usize,
    cache: &'c RefCell<PointCache<'p>>,
}

fn objective_callback(
    x: &[f64],
    _gradient: Option<&mut [f64]>,
    cache: &mut &RefCell<PointCache<'_>>,
) -> f64 {
    let mut point = cache.borrow_mut();
    point.evaluate(x);
    point.objective
}

fn constraint_callback(
    x: &[f64],
    _gradient: Option<&mut [f64]>,
    slot: &mut ConstraintSlot<'_, '_>,
) -> f64 {
    let mut point = slot.cache.borrow_mut();
    point.evaluate(x);
    -point.constraints[slot.index]
}

/// Register the constraints and map the trust-region settings onto NLopt's
/// stopping criteria: `rhobeg` is the initial step, `rhoend` the absolute
/// x tolerance, `maxfun` the evaluation budget.
fn configure<'c, 'p, F>(
    optimizer: &mut Nlopt<F, &'c RefCell<PointCache<'p>>>,
    cache: &'c RefCell<PointCache<'p>>,
    num_constraints: usize,
    settings: &OptimizerSettings,
) -> Result<(), FailState>
where
    F: ObjFn<&'c RefCell<PointCache<'p>>>,
{
    for index in 0..num_constraints {
        optimizer.add_inequality_constraint(
            constraint_callback,
            ConstraintSlot { index, cache },
            0.0,
        )?;
    }
    optimizer.set_initial_step1(settings.rhobeg)?;
    optimizer.set_xtol_abs1(settings.rhoend)?;
    optimizer.set_maxeval(u32::try_from(settings.maxfun).unwrap_or(u32::MAX))?;
    Ok(())
}

impl ConstrainedMinimizer for Cobyla {
    fn name(&self) -> &'static str {
        "cobyla"
    }

    fn minimize(
        &self,
        problem: &dyn ConstrainedProblem,
        x0: &[f64],
        settings: &OptimizerSettings,
    ) -> MinimizeOutcome {
        let n = problem.dimension();
        let m = problem.num_constraints();
        let cache = RefCell::new(PointCache::new(problem));
        let mut x = x0.to_vec();

        let mut optimizer = Nlopt::new(
            Algorithm::Cobyla,
            n,
            objective_callback,
            Target::Minimize,
            &cache,
        );

        let termination = match configure(&mut optimizer, &cache, m, settings) {
            Err(state) => {
                trace!(?state, "NLopt rejected the COBYLA setup");
                TerminationReason::Failed
            }
            Ok(()) => match optimizer.optimize(&mut x) {
                Ok((SuccessState::MaxEvalReached | SuccessState::MaxTimeReached, _)) => {
                    TerminationReason::MaxEvaluations
                }
                Ok(_) => TerminationReason::Converged,
                Err((FailState::RoundoffLimited, _)) => TerminationReason::RoundingErrors,
                Err((state, _)) => {
                    trace!(?state, "NLopt COBYLA failed");
                    TerminationReason::Failed
                }
            },
        };
        drop(optimizer);
        let evaluations = cache.into_inner().evaluations;

        let mut constraints = vec![0.0; m];
        let objective = problem.evaluate(&x, &mut constraints);
        let max_violation = constraints.iter().fold(0.0_f64, |acc, &c| acc.max(-c));

        trace!(evaluations, ?termination, objective, max_violation, "COBYLA finished");
        MinimizeOutcome {
            x,
            objective,
            max_violation,
            evaluations,
            termination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Closure-backed problem for exercising the solver directly
    struct FnProblem<F: Fn(&[f64], &mut [f64]) -> f64 + Sync> {
        n: usize,
        m: usize,
        f: F,
    }

    impl<F: Fn(&[f64], &mut [f64]) -> f64 + Sync> ConstrainedProblem for FnProblem<F> {
        fn dimension(&self) -> usize {
            self.n
        }

        fn num_constraints(&self) -> usize {
            self.m
        }

        fn evaluate(&self, x: &[f64], constraints: &mut [f64]) -> f64 {
            (self.f)(x, constraints)
        }
    }

    fn settings() -> OptimizerSettings {
        OptimizerSettings {
            rhobeg: 0.5,
            rhoend: 1e-8,
            maxfun: 5000,
        }
    }

    #[test]
    fn test_unconstrained_quadratic() {
        let problem = FnProblem {
            n: 2,
            m: 0,
            f: |x: &[f64], _: &mut [f64]| (x[0] - 1.0).powi(2) + 10.0 * (x[1] + 2.0).powi(2),
        };
        let outcome = Cobyla.minimize(&problem, &[0.0, 0.0], &settings());

        assert!(outcome.converged());
        assert!((outcome.x[0] - 1.0).abs() < 1e-5);
        assert!((outcome.x[1] + 2.0).abs() < 1e-5);
        assert!(outcome.objective < 1e-9);
    }

    #[test]
    fn test_active_linear_constraint() {
        // Minimize x² + y² subject to x + y >= 1; optimum (0.5, 0.5)
        let problem = FnProblem {
            n: 2,
            m: 1,
            f: |x: &[f64], c: &mut [f64]| {
                c[0] = x[0] + x[1] - 1.0;
                x[0] * x[0] + x[1] * x[1]
            },
        };
        let outcome = Cobyla.minimize(&problem, &[2.0, 0.0], &settings());

        assert!(outcome.converged());
        assert!((outcome.x[0] - 0.5).abs() < 1e-5);
        assert!((outcome.x[1] - 0.5).abs() < 1e-5);
        assert!(outcome.max_violation < 1e-6);
    }

    #[test]
    fn test_infeasible_start_reaches_simplex() {
        // Minimize distance to (2, 2) inside the probability simplex
        let problem = FnProblem {
            n: 2,
            m: 3,
            f: |x: &[f64], c: &mut [f64]| {
                c[0] = x[0];
                c[1] = x[1];
                c[2] = 1.0 - x[0] - x[1];
                (x[0] - 2.0).powi(2) + (x[1] - 2.0).powi(2)
            },
        };
        let outcome = Cobyla.minimize(&problem, &[-1.0, 3.0], &settings());

        assert!(outcome.max_violation < 1e-6);
        assert!((outcome.x[0] - 0.5).abs() < 1e-4);
        assert!((outcome.x[1] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_evaluation_budget() {
        let problem = FnProblem {
            n: 3,
            m: 0,
            f: |x: &[f64], _: &mut [f64]| x.iter().map(|v| (v - 0.3).powi(2)).sum(),
        };
        let tight = OptimizerSettings {
            maxfun: 6,
            ..settings()
        };
        let outcome = Cobyla.minimize(&problem, &[0.0, 0.0, 0.0], &tight);

        assert_eq!(outcome.termination, TerminationReason::MaxEvaluations);
        assert!(!outcome.converged());
        assert!(outcome.evaluations > 0 && outcome.evaluations <= 6);
    }

    #[test]
    fn test_constraints_share_one_evaluation_per_point() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = AtomicUsize::new(0);
        let problem = FnProblem {
            n: 2,
            m: 3,
            f: |x: &[f64], c: &mut [f64]| {
                calls.fetch_add(1, Ordering::Relaxed);
                c[0] = x[0];
                c[1] = x[1];
                c[2] = 1.0 - x[0] - x[1];
                (x[0] - 0.2).powi(2) + (x[1] - 0.3).powi(2)
            },
        };
        let outcome = Cobyla.minimize(&problem, &[0.5, 0.5], &settings());

        // One call per distinct point plus the final re-evaluation at x
        assert_eq!(calls.load(Ordering::Relaxed), outcome.evaluations + 1);
        assert!((outcome.x[0] - 0.2).abs() < 1e-5);
        assert!((outcome.x[1] - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_deterministic() {
        let problem = FnProblem {
            n: 2,
            m: 1,
            f: |x: &[f64], c: &mut [f64]| {
                c[0] = 1.0 - x[0] * x[0] - x[1] * x[1];
                x[0] * x[1]
            },
        };
        let first = Cobyla.minimize(&problem, &[0.1, 0.2], &settings());
        let second = Cobyla.minimize(&problem, &[0.1, 0.2], &settings());
        assert_eq!(first, second);
    }
}
