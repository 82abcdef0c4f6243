use serde::{Deserialize, Serialize};

/// Per-epoch training statistics collected by `fit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Mean training loss over all samples that contributed this epoch.
    pub train_loss: f64,
    /// Fraction of samples whose argmax matched the target, in [0, 1].
    pub train_accuracy: f64,
    /// Batches skipped for numerical reasons this epoch.
    pub skipped_batches: usize,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}
