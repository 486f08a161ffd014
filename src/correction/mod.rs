pub mod bootstrap;
pub mod cobyla;
pub mod corrector;
pub mod multi_start;
pub mod objective;
pub mod optimizer;

pub use bootstrap::{
    aggregate_statistics, BootstrapReport, BootstrapResampler, BootstrapSample,
    BootstrapSettings, CancellationToken,
};
pub use cobyla::Cobyla;
pub use corrector::SimilarityCorrector;
pub use multi_start::{
    expected_start_count, starting_points, BestRunAccumulator, MultiStartDriver,
    MultiStartOutcome,
};
pub use objective::SimilarityObjective;
pub use optimizer::{
    ConstrainedMinimizer, ConstrainedProblem, MinimizeOutcome, OptimizerSettings,
    TerminationReason,
};
