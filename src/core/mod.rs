pub mod data_structures;
pub mod error;
pub mod observations;

// Re-export the value types shared by the correction engine
pub use data_structures::{
    AbundanceVector, GenomeStatistics, OptimizationRun, ReadCountVector, SimilarityMatrix,
};
pub use error::{CorrectionError, CorrectionResult};
pub use observations::{CalibrationReads, MappingObservations, ReadMappings};
