//! Entry point tying configuration, the multi-start driver and the bootstrap together.

use crate::core::data_structures::{ReadCountVector, SimilarityMatrix};
use crate::core::error::CorrectionResult;
use crate::core::observations::MappingObservations;
use crate::correction::bootstrap::{
    BootstrapReport, BootstrapResampler, BootstrapSettings, CancellationToken,
};
use crate::correction::multi_start::{MultiStartDriver, MultiStartOutcome};
use crate::correction::optimizer::OptimizerSettings;
use crate::utils::configuration::GasicConfiguration;
use tracing::{info, instrument};

/// Similarity correction of observed read counts.
///
/// Owns one worker pool for its lifetime; build it once per job and reuse it
/// for every correction of that job.
#[derive(Debug)]
pub struct SimilarityCorrector {
    driver: MultiStartDriver,
    bootstrap: BootstrapSettings,
}

impl SimilarityCorrector {
    pub fn new(
        optimizer: OptimizerSettings,
        num_threads: usize,
        bootstrap: BootstrapSettings,
    ) -> CorrectionResult<Self> {
        bootstrap.validate()?;
        Ok(Self {
            driver: MultiStartDriver::new(optimizer, num_threads)?,
            bootstrap,
        })
    }

    pub fn from_config(config: &GasicConfiguration) -> CorrectionResult<Self> {
        Self::new(
            config.optimizer,
            config.execution.num_threads,
            config.bootstrap.clone(),
        )
    }

    pub fn driver(&self) -> &MultiStartDriver {
        &self.driver
    }

    pub fn bootstrap_settings(&self) -> &BootstrapSettings {
        &self.bootstrap
    }

    /// Single-shot correction of a precomputed matrix and read vector
    pub fn correct(
        &self,
        similarity: &SimilarityMatrix,
        reads: &ReadCountVector,
    ) -> CorrectionResult<MultiStartOutcome> {
        self.driver.run(similarity, reads)
    }

    /// Single-shot correction on the full, non-resampled observations
    #[instrument(skip_all, fields(genomes = observations.num_genomes()))]
    pub fn correct_observations(
        &self,
        observations: &MappingObservations,
    ) -> CorrectionResult<MultiStartOutcome> {
        let reads = observations.sample().normalized_read_counts()?;
        let similarity = observations.calibration().similarity_matrix()?;
        info!(
            "🧮 Correcting {} genomes from {} sample reads",
            observations.num_genomes(),
            observations.sample().num_reads()
        );
        self.driver.run(&similarity, &reads)
    }

    pub fn bootstrap(&self, observations: &MappingObservations) -> CorrectionResult<BootstrapReport> {
        self.bootstrap_with(observations, &CancellationToken::new(), None)
    }

    pub fn bootstrap_with(
        &self,
        observations: &MappingObservations,
        cancel: &CancellationToken,
        progress: Option<&dyn Fn(usize, usize)>,
    ) -> CorrectionResult<BootstrapReport> {
        BootstrapResampler::new(&self.driver, self.bootstrap.clone())?
            .run_with(observations, cancel, progress)
    }
}
