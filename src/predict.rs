use std::fmt;
use std::path::Path;

use crate::data::labels::LabelIndex;
use crate::data::normalize::{SampleNormalizer, TextEncoder};
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::network::network::Network;
use crate::network::spec::ProjectConfig;

/// Outcome of a single prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// The winning class label, for projects with a categorical output.
    Label(String),
    /// The raw softmax distribution, for every other output kind.
    Vector(Vec<f64>),
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Label(label) => f.write_str(label),
            Prediction::Vector(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Runs one sample through a project's trained model.
///
/// The sample is normalized exactly like a training sample, pushed through
/// the network as a batch of one, and the output row interpreted per the
/// project's output kind. For categorical outputs the label mapping is
/// rebuilt from the current label-index file; the snapshot stored in the
/// model only serves to warn when the live file has drifted since training.
pub fn predict(
    config: &ProjectConfig,
    project_dir: &Path,
    sample_ref: &str,
    encoder: &dyn TextEncoder,
) -> Result<Prediction> {
    let (input, output, data_path) = config.validate_for_training()?;

    let model_path = project_dir.join(format!("{}.json", config.name));
    if !model_path.exists() {
        return Err(Error::Configuration(format!(
            "project '{}' has no trained model; train it first",
            config.name
        )));
    }
    let network = Network::load_json(&model_path)?;

    // Categorical inputs encode against the live label index.
    let live_labels = if input.kind.is_categorical() || output.kind.is_categorical() {
        Some(LabelIndex::from_file(data_path)?)
    } else {
        None
    };

    let mut normalizer = SampleNormalizer::new(encoder);
    if let Some(labels) = &live_labels {
        normalizer = normalizer.with_labels(labels);
    }
    let sample = normalizer.normalize(input.kind, sample_ref)?;
    if sample.shape != network.input_shape {
        return Err(Error::Configuration(format!(
            "sample shape {:?} does not match the trained input shape {:?}",
            sample.shape, network.input_shape
        )));
    }

    let batch = Tensor::stack(&[sample]);
    let probs = network.forward_batch(&batch).subtensor(0);

    if !output.kind.is_categorical() {
        return Ok(Prediction::Vector(probs.data));
    }

    let labels = match live_labels {
        Some(labels) => labels,
        None => LabelIndex::from_file(data_path)?,
    };
    if labels.is_empty() {
        return Err(Error::Configuration(format!(
            "label-index file '{}' contains no labels",
            data_path.display()
        )));
    }
    if let Some(meta) = &network.metadata {
        if let Some(snapshot) = &meta.class_labels {
            if snapshot.as_slice() != labels.labels() {
                log::warn!(
                    "label index for '{}' changed since training ({} labels then, {} now); \
                     predictions map onto the current labels",
                    config.name,
                    snapshot.len(),
                    labels.len()
                );
            }
        }
    }

    let winner = probs.argmax();
    let label = labels.label_for(winner).ok_or_else(|| {
        Error::Configuration(format!(
            "class index {} is outside the current label index ({} labels); \
             the dataset shrank since training",
            winner,
            labels.len()
        ))
    })?;
    Ok(Prediction::Label(label.to_string()))
}
