pub mod fit;
pub mod runner;
pub mod stats;

pub use fit::{fit, FitSummary};
pub use runner::{run_training, TrainedArtifact, DEFAULT_LEARNING_RATE};
pub use stats::EpochStats;
