//! Multi-start driver: run the local minimizer from a fixed set of diverse
//! starting points on a worker pool and keep the best result.

use crate::core::data_structures::{
    AbundanceVector, OptimizationRun, ReadCountVector, SimilarityMatrix,
};
use crate::core::error::{CorrectionError, CorrectionResult};
use crate::correction::cobyla::Cobyla;
use crate::correction::objective::SimilarityObjective;
use crate::correction::optimizer::{ConstrainedMinimizer, OptimizerSettings};
use crossbeam_channel::bounded;
use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};

/// Upper bound on the default worker count
pub const MAX_DEFAULT_THREADS: usize = 8;

/// Deterministic starting points for `num_genomes` genomes.
///
/// Five families: one dominant genome at 0.9 (rest share 0.1), one dominant
/// genome at 0.8 (rest share 0.2), one dominant genome at 0.9 with a flat 0.01
/// elsewhere (not normalized), flat vectors at `1/N - k·0.1` and a flat 0.5.
pub fn starting_points(num_genomes: usize) -> Vec<Vec<f64>> {
    let n = num_genomes;
    if n == 0 {
        return Vec::new();
    }

    let mut points = Vec::with_capacity(expected_start_count(n));
    let others = (n - 1) as f64;

    for (dominant, rest) in [(0.9, 0.1 / others), (0.8, 0.2 / others), (0.9, 0.01)] {
        for d in 0..n {
            let mut point = vec![rest; n];
            point[d] = dominant;
            points.push(point);
        }
    }

    let uniform = 1.0 / n as f64;
    for k in 0..flat_start_count(n) {
        let fill = uniform - k as f64 * 0.1;
        if fill >= 0.0 {
            points.push(vec![fill; n]);
        }
    }

    points.push(vec![0.5; n]);
    points
}

fn flat_start_count(num_genomes: usize) -> usize {
    ((1.0 / num_genomes as f64) / 0.1).floor() as usize
}

/// `3N + 1 + floor((1/N)/0.1)`
pub fn expected_start_count(num_genomes: usize) -> usize {
    if num_genomes == 0 {
        return 0;
    }
    3 * num_genomes + 1 + flat_start_count(num_genomes)
}

/// Running best over completed runs, fed in arrival order.
///
/// Strictly smaller objectives replace the incumbent, so on ties the first
/// run to arrive wins.
#[derive(Debug, Default)]
pub struct BestRunAccumulator {
    best: Option<OptimizationRun>,
    received: usize,
    non_converged: usize,
}

impl BestRunAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `run` became the new best
    pub fn offer(&mut self, run: OptimizationRun) -> bool {
        self.received += 1;
        if !run.converged {
            self.non_converged += 1;
        }

        let replace = match &self.best {
            None => true,
            Some(best) => {
                run.objective < best.objective
                    || (best.objective.is_nan() && !run.objective.is_nan())
            }
        };
        if replace {
            self.best = Some(run);
        }
        replace
    }

    pub fn best(&self) -> Option<&OptimizationRun> {
        self.best.as_ref()
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn non_converged(&self) -> usize {
        self.non_converged
    }

    pub fn into_best(self) -> Option<OptimizationRun> {
        self.best
    }
}

/// Best solution found by one driver call
#[derive(Debug, Clone, PartialEq)]
pub struct MultiStartOutcome {
    /// Not guaranteed feasible; check with [`AbundanceVector::is_feasible`]
    pub abundances: AbundanceVector,
    pub objective: f64,
    /// Largest constraint violation of the selected solution
    pub max_violation: f64,
    /// Whether the selected run met the radius tolerance
    pub converged: bool,
    /// Index of the winning starting point, `None` when no optimizer ran
    pub best_start: Option<usize>,
    pub runs: usize,
    pub non_converged_runs: usize,
}

pub struct MultiStartDriver {
    pool: rayon::ThreadPool,
    minimizer: Arc<dyn ConstrainedMinimizer>,
    settings: OptimizerSettings,
    num_threads: usize,
}

impl std::fmt::Debug for MultiStartDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiStartDriver")
            .field("minimizer", &self.minimizer.name())
            .field("settings", &self.settings)
            .field("num_threads", &self.num_threads)
            .finish()
    }
}

impl MultiStartDriver {
    pub fn new(settings: OptimizerSettings, num_threads: usize) -> CorrectionResult<Self> {
        Self::with_minimizer(settings, num_threads, Arc::new(Cobyla::new()))
    }

    pub fn with_minimizer(
        settings: OptimizerSettings,
        num_threads: usize,
        minimizer: Arc<dyn ConstrainedMinimizer>,
    ) -> CorrectionResult<Self> {
        settings.validate()?;
        if num_threads == 0 {
            return Err(CorrectionError::configuration(
                "execution.num_threads",
                "at least one worker thread is required",
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("gasic-start-{}", i))
            .build()
            .map_err(|e| CorrectionError::configuration("execution.num_threads", e.to_string()))?;

        Ok(Self {
            pool,
            minimizer,
            settings,
            num_threads,
        })
    }

    /// `min(available CPUs, 8)`
    pub fn default_num_threads() -> usize {
        num_cpus::get().clamp(1, MAX_DEFAULT_THREADS)
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn minimizer_name(&self) -> &'static str {
        self.minimizer.name()
    }

    /// Minimize `||S·x - r||²` over the constraint set from every starting
    /// point and return the best run. Blocks until all runs finished.
    #[instrument(skip(self, similarity, reads), fields(genomes = similarity.num_genomes()))]
    pub fn run(
        &self,
        similarity: &SimilarityMatrix,
        reads: &ReadCountVector,
    ) -> CorrectionResult<MultiStartOutcome> {
        let objective = SimilarityObjective::new(similarity, reads)?;
        let n = objective.num_genomes();

        if n == 1 {
            let solution = vec![1.0];
            return Ok(MultiStartOutcome {
                objective: objective.objective(&solution),
                max_violation: 0.0,
                abundances: AbundanceVector::new(solution),
                converged: true,
                best_start: None,
                runs: 0,
                non_converged_runs: 0,
            });
        }

        let starts = starting_points(n);
        let total = starts.len();
        debug!(
            "🚀 Launching {} {} starts on {} threads",
            total,
            self.minimizer.name(),
            self.num_threads
        );

        let (sender, receiver) = bounded::<OptimizationRun>(total);
        let minimizer = self.minimizer.as_ref();
        let settings = &self.settings;
        let problem = &objective;

        self.pool.scope(|scope| {
            for (start_index, initial) in starts.into_iter().enumerate() {
                let sender = sender.clone();
                scope.spawn(move |_| {
                    let outcome = minimizer.minimize(problem, &initial, settings);
                    let run = OptimizationRun {
                        start_index,
                        objective: problem.objective(&outcome.x),
                        max_violation: outcome.max_violation,
                        converged: outcome.converged(),
                        evaluations: outcome.evaluations,
                        initial,
                        solution: outcome.x,
                    };
                    // Capacity covers every start, so this never blocks
                    let _ = sender.send(run);
                });
            }
        });
        drop(sender);

        let mut accumulator = BestRunAccumulator::new();
        for run in receiver.iter() {
            if accumulator.offer(run) {
                if let Some(best) = accumulator.best() {
                    trace!(
                        start = best.start_index,
                        objective = best.objective,
                        "New incumbent after {} runs",
                        accumulator.received()
                    );
                }
            }
        }
        let runs = accumulator.received();
        let non_converged_runs = accumulator.non_converged();
        let best = accumulator
            .into_best()
            .ok_or_else(|| CorrectionError::degenerate("no optimizer run completed"))?;

        debug!(
            objective = best.objective,
            start = best.start_index,
            evaluations = best.evaluations,
            "Selected best of {} runs ({} did not converge)",
            runs,
            non_converged_runs
        );
        if !best.converged {
            warn!(
                "⚠️  Selected run from start {} stopped before reaching rhoend={} (max constraint violation {:.3e})",
                best.start_index, self.settings.rhoend, best.max_violation
            );
        }

        Ok(MultiStartOutcome {
            abundances: AbundanceVector::new(best.solution),
            objective: best.objective,
            max_violation: best.max_violation,
            converged: best.converged,
            best_start: Some(best.start_index),
            runs,
            non_converged_runs,
        })
    }
}
