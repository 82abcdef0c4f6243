use std::fs;
use std::path::{Path, PathBuf};

use crate::data::batches::{BatchSource, DEFAULT_BATCH_SIZE};
use crate::data::normalize::TextEncoder;
use crate::error::Result;
use crate::network::builder::build_network;
use crate::network::metadata::ModelMetadata;
use crate::network::spec::ProjectConfig;
use crate::optim::sgd::Sgd;
use crate::train::fit::fit;
use crate::train::stats::EpochStats;

/// Learning rate used by project training runs.
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;

/// What a completed training run leaves behind.
#[derive(Debug, Clone)]
pub struct TrainedArtifact {
    pub project: String,
    pub model_path: PathBuf,
    pub num_classes: usize,
    pub epochs_run: usize,
    pub final_loss: f64,
    /// Per-epoch stats from the run, oldest first.
    pub history: Vec<EpochStats>,
}

/// Runs a full training pass for a configured project and saves the model
/// to `<project_dir>/<name>.json`.
///
/// The input shape comes from the first batch, the class count from the
/// label index. The saved model embeds a snapshot of the labels so
/// prediction can detect drift later.
pub fn run_training(
    config: &ProjectConfig,
    project_dir: &Path,
    encoder: &dyn TextEncoder,
) -> Result<TrainedArtifact> {
    let (input, output, data_path) = config.validate_for_training()?;

    let batches = BatchSource::new(data_path, input.kind, DEFAULT_BATCH_SIZE, encoder)?;
    let (first_batch, _) = batches.get(0)?;
    let input_shape = first_batch.shape[1..].to_vec();
    let num_classes = batches.num_classes();

    log::info!(
        "training '{}': {} samples in {} batches, {} classes, input shape {:?}",
        config.name,
        batches.sample_count(),
        batches.len(),
        num_classes,
        input_shape
    );

    let mut network = build_network(&config.hidden_layers, &input_shape, num_classes)?;
    network.metadata = Some(ModelMetadata {
        input: Some(input.kind),
        output: Some(output.kind),
        class_labels: Some(batches.label_index().labels().to_vec()),
    });

    let optimizer = Sgd::new(DEFAULT_LEARNING_RATE);
    let summary = fit(&mut network, &batches, &optimizer, config.epochs)?;

    fs::create_dir_all(project_dir)?;
    let model_path = project_dir.join(format!("{}.json", config.name));
    network.save_json(&model_path)?;
    log::info!("model saved to {}", model_path.display());

    Ok(TrainedArtifact {
        project: config.name.clone(),
        model_path,
        num_classes,
        epochs_run: summary.epochs_run,
        final_loss: summary.final_loss,
        history: summary.history,
    })
}
