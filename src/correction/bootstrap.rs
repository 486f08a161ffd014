//! Bootstrap resampling of the read observations.
//!
//! Every iteration redraws the sample reads and each genome's calibration
//! reads with replacement, rebuilds the model inputs, reruns the multi-start
//! driver and records whether each genome fell below the presence threshold.
//! Iterations run one after another; parallelism lives inside the driver.

use crate::core::data_structures::{
    AbundanceVector, GenomeStatistics, ReadCountVector, SimilarityMatrix,
};
use crate::core::error::{CorrectionError, CorrectionResult};
use crate::core::observations::{CalibrationReads, MappingObservations, ReadMappings};
use crate::correction::multi_start::MultiStartDriver;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    /// Number of resampling iterations (B)
    pub iterations: usize,
    /// Abundance below which a genome counts as absent in an iteration (τ)
    pub presence_threshold: f64,
    /// Share of each calibration read set drawn per iteration
    pub calibration_fraction: f64,
    /// Fixed seed for reproducible resampling; drawn from entropy when unset
    pub seed: Option<u64>,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            iterations: 5,
            presence_threshold: 0.01,
            calibration_fraction: 1.0,
            seed: None,
        }
    }
}

impl BootstrapSettings {
    pub fn validate(&self) -> CorrectionResult<()> {
        if self.iterations < 1 {
            return Err(CorrectionError::configuration(
                "bootstrap.iterations",
                "at least one bootstrap iteration is required",
            ));
        }
        if !(0.0..=1.0).contains(&self.presence_threshold) {
            return Err(CorrectionError::configuration(
                "bootstrap.presence_threshold",
                format!("must lie in [0, 1], got {}", self.presence_threshold),
            ));
        }
        if !(self.calibration_fraction > 0.0 && self.calibration_fraction <= 1.0) {
            return Err(CorrectionError::configuration(
                "bootstrap.calibration_fraction",
                format!("must lie in (0, 1], got {}", self.calibration_fraction),
            ));
        }
        Ok(())
    }
}

/// Shared flag for cooperative cancellation between bootstrap iterations
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Model inputs rebuilt from one resampling draw
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapSample {
    pub reads: ReadCountVector,
    pub similarity: SimilarityMatrix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub statistics: Vec<GenomeStatistics>,
    /// Best abundance vector of every iteration, in order
    pub replicates: Vec<AbundanceVector>,
    pub total_reads: usize,
    /// Iterations whose selected run stopped before reaching `rhoend`
    pub non_converged_iterations: usize,
    /// Seed the resampling stream was started from
    pub seed: u64,
}

/// Draw `draws` indices from `0..population` with replacement
pub fn resample_indices<R: Rng>(rng: &mut R, population: usize, draws: usize) -> Vec<usize> {
    if population == 0 {
        return Vec::new();
    }
    (0..draws).map(|_| rng.gen_range(0..population)).collect()
}

/// Redraw as many sample reads as there are and normalize by that count
pub fn resample_read_counts<R: Rng>(
    sample: &ReadMappings,
    rng: &mut R,
) -> CorrectionResult<ReadCountVector> {
    let total = sample.num_reads();
    if total == 0 {
        return Err(CorrectionError::degenerate("sample read set is empty"));
    }
    let indices = resample_indices(rng, total, total);
    ReadCountVector::from_counts(&sample.sample_counts(&indices), total)
}

/// Redraw `floor(fraction × size)` reads (at least one) from every calibration
/// set and normalize each row by its diagonal count.
pub fn resample_similarity<R: Rng>(
    calibration: &CalibrationReads,
    fraction: f64,
    rng: &mut R,
) -> CorrectionResult<SimilarityMatrix> {
    let n = calibration.num_genomes();
    let mut counts = Array2::<u64>::zeros((n, n));
    for (i, reads) in calibration.iter().enumerate() {
        let size = reads.num_reads();
        let draws = ((fraction * size as f64).floor() as usize).max(1);
        let indices = resample_indices(rng, size, draws);
        for (j, count) in reads.sample_counts(&indices).into_iter().enumerate() {
            counts[[i, j]] = count;
        }
    }
    SimilarityMatrix::from_counts(&counts)
}

/// Per-genome mean, sample variance and absence fraction over the replicates.
///
/// The variance of a single replicate is defined as 0.0.
pub fn aggregate_statistics(
    genome_names: &[String],
    mapped_reads: &[u64],
    total_reads: usize,
    replicates: &[AbundanceVector],
    presence_threshold: f64,
) -> Vec<GenomeStatistics> {
    let iterations = replicates.len();
    let total = total_reads as f64;

    genome_names
        .iter()
        .enumerate()
        .map(|(genome, name)| {
            let values: Vec<f64> = replicates.iter().map(|r| r[genome]).collect();
            let (mean, variance) = mean_and_variance(&values);
            let absent = values.iter().filter(|&&x| x < presence_threshold).count();
            let absence_fraction = if iterations == 0 {
                0.0
            } else {
                absent as f64 / iterations as f64
            };

            GenomeStatistics {
                name: name.clone(),
                mapped_reads: mapped_reads.get(genome).copied().unwrap_or(0),
                mean_abundance: mean,
                abundance_variance: variance,
                absence_fraction,
                corrected_reads: mean * total,
                corrected_variance: variance * total,
            }
        })
        .collect()
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (count - 1.0);
    (mean, variance)
}

/// Drives the resampling loop over a shared multi-start driver
#[derive(Debug)]
pub struct BootstrapResampler<'d> {
    driver: &'d MultiStartDriver,
    settings: BootstrapSettings,
}

impl<'d> BootstrapResampler<'d> {
    pub fn new(driver: &'d MultiStartDriver, settings: BootstrapSettings) -> CorrectionResult<Self> {
        settings.validate()?;
        Ok(Self { driver, settings })
    }

    pub fn settings(&self) -> &BootstrapSettings {
        &self.settings
    }

    pub fn draw_sample<R: Rng>(
        &self,
        observations: &MappingObservations,
        rng: &mut R,
    ) -> CorrectionResult<BootstrapSample> {
        Ok(BootstrapSample {
            reads: resample_read_counts(observations.sample(), rng)?,
            similarity: resample_similarity(
                observations.calibration(),
                self.settings.calibration_fraction,
                rng,
            )?,
        })
    }

    pub fn run(&self, observations: &MappingObservations) -> CorrectionResult<BootstrapReport> {
        self.run_with(observations, &CancellationToken::new(), None)
    }

    /// Run every iteration, checking `cancel` before each one and reporting
    /// `(completed, total)` to `progress` after each one.
    #[instrument(skip_all, fields(genomes = observations.num_genomes(), iterations = self.settings.iterations))]
    pub fn run_with(
        &self,
        observations: &MappingObservations,
        cancel: &CancellationToken,
        progress: Option<&dyn Fn(usize, usize)>,
    ) -> CorrectionResult<BootstrapReport> {
        let total_iterations = self.settings.iterations;
        let total_reads = observations.sample().num_reads();
        let seed = self.settings.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);

        info!(
            "🔁 Bootstrapping {} iterations over {} sample reads and {} genomes (seed {})",
            total_iterations,
            total_reads,
            observations.num_genomes(),
            seed
        );

        let mut replicates = Vec::with_capacity(total_iterations);
        let mut non_converged_iterations = 0;

        for iteration in 0..total_iterations {
            if cancel.is_cancelled() {
                warn!(
                    "🛑 Bootstrap cancelled after {}/{} iterations",
                    iteration, total_iterations
                );
                return Err(CorrectionError::Cancelled {
                    completed: iteration,
                    total: total_iterations,
                });
            }

            let sample = self.draw_sample(observations, &mut rng)?;
            debug!(
                iteration,
                similarity = ?sample.similarity.values(),
                reads = ?sample.reads.as_slice(),
                "Resampled model inputs"
            );

            let outcome = self.driver.run(&sample.similarity, &sample.reads)?;
            if !outcome.converged {
                non_converged_iterations += 1;
            }
            replicates.push(outcome.abundances);

            info!(
                "📊 Bootstrap iteration {}/{} done (objective {:.3e})",
                iteration + 1,
                total_iterations,
                outcome.objective
            );
            if let Some(report) = progress {
                report(iteration + 1, total_iterations);
            }
        }

        let statistics = aggregate_statistics(
            observations.genome_names(),
            &observations.sample().mapped_read_counts(),
            total_reads,
            &replicates,
            self.settings.presence_threshold,
        );

        if non_converged_iterations > 0 {
            warn!(
                "⚠️  {} of {} bootstrap iterations selected a non-converged run",
                non_converged_iterations, total_iterations
            );
        }
        info!("✅ Bootstrap correction complete");

        Ok(BootstrapReport {
            statistics,
            replicates,
            total_reads,
            non_converged_iterations,
            seed,
        })
    }
}
