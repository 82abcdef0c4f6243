use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layers::Stage;
use crate::math::tensor::Tensor;
use crate::network::metadata::ModelMetadata;

/// A built, runnable network: the lowered stage list plus the bookkeeping
/// needed to check inputs and interpret outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    /// Shape a single sample must have.
    pub input_shape: Vec<usize>,
    /// Width of the softmax output.
    pub num_classes: usize,
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

impl Network {
    /// Inference pass over one sample. Touches no training state, so the
    /// same input always produces the same output.
    pub fn forward(&self, input: &Tensor) -> Tensor {
        let mut current = input.clone();
        for stage in &self.stages {
            current = stage.forward(&current);
        }
        current
    }

    /// Forward pass that caches per-stage intermediates for `backward`.
    pub fn forward_train(&mut self, input: &Tensor) -> Tensor {
        let mut current = input.clone();
        for stage in &mut self.stages {
            current = stage.forward_train(&current);
        }
        current
    }

    /// Backpropagates ∂L/∂output through every stage, accumulating
    /// parameter gradients. The delta reaching the input is discarded.
    pub fn backward(&mut self, delta: &Tensor) {
        let mut current = delta.clone();
        for stage in self.stages.iter_mut().rev() {
            current = stage.backward(&current);
        }
    }

    /// Discards any accumulated gradients, e.g. after a skipped batch.
    pub fn zero_gradients(&mut self) {
        for stage in &mut self.stages {
            stage.zero_gradients();
        }
    }

    /// Runs a `(rows, sample shape...)` batch row by row and stacks the
    /// outputs to `(rows, num_classes)`.
    pub fn forward_batch(&self, batch: &Tensor) -> Tensor {
        let outputs: Vec<Tensor> = (0..batch.shape[0])
            .map(|row| self.forward(&batch.subtensor(row)))
            .collect();
        Tensor::stack(&outputs)
    }

    /// Serializes the network, weights and metadata included, to a
    /// pretty-printed JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a network from a JSON file previously written by
    /// `save_json`.
    pub fn load_json(path: &Path) -> Result<Network> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
