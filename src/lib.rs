//! # GASiC - Genome Abundance Similarity Correction
//!
//! Corrects observed per-genome read counts of a metagenomic sample for
//! cross-mapping between similar reference genomes. Abundances are estimated
//! by a constrained least-squares fit against a similarity matrix measured on
//! calibration reads, solved from many starting points concurrently, with
//! bootstrap resampling for variance and absence estimates.

pub mod core;
pub mod correction;
pub mod simulation;
pub mod utils;

// Re-export commonly used types at crate level
pub use crate::core::data_structures::*;
pub use crate::core::error::{CorrectionError, CorrectionResult};
pub use crate::core::observations::{CalibrationReads, MappingObservations, ReadMappings};
pub use crate::correction::{
    BootstrapReport, BootstrapSettings, CancellationToken, MultiStartDriver, OptimizerSettings,
    SimilarityCorrector,
};
pub use crate::utils::configuration::{ConfigurationManager, GasicConfiguration};

/// Result type used throughout the crate
pub type Result<T> = anyhow::Result<T>;

/// Error type used throughout the crate
pub type Error = anyhow::Error;
