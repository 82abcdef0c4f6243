use std::path::{Path, PathBuf};

use crate::data::kind::DataKind;
use crate::data::labels::{read_label_entries, LabelIndex};
use crate::data::normalize::{SampleNormalizer, TextEncoder};
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Batch width used when training; matches the fit defaults of the project
/// API.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// A randomly-indexable view of a labeled dataset, sliced into batches.
///
/// Samples stay in the on-disk order of the label-index file; no shuffling
/// happens here or anywhere downstream, so batch `i` always holds the same
/// samples. Each batch is normalized on demand and nothing is cached.
pub struct BatchSource<'a> {
    entries: Vec<(String, String)>,
    labels: LabelIndex,
    kind: DataKind,
    batch_size: usize,
    context: PathBuf,
    encoder: &'a dyn TextEncoder,
}

impl<'a> BatchSource<'a> {
    /// Reads the label-index file at `index_path`. Sample references inside
    /// batches resolve against that file's directory.
    pub fn new(
        index_path: &Path,
        kind: DataKind,
        batch_size: usize,
        encoder: &'a dyn TextEncoder,
    ) -> Result<BatchSource<'a>> {
        if batch_size == 0 {
            return Err(Error::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }
        let entries = read_label_entries(index_path)?;
        if entries.is_empty() {
            return Err(Error::Configuration(format!(
                "label-index file '{}' contains no samples",
                index_path.display()
            )));
        }
        let labels = LabelIndex::from_entries(&entries);
        let context = index_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(BatchSource {
            entries,
            labels,
            kind,
            batch_size,
            context,
            encoder,
        })
    }

    /// Number of batches: `ceil(samples / batch_size)`. The final batch is
    /// short when the sample count is not a multiple of the batch size.
    pub fn len(&self) -> usize {
        (self.entries.len() + self.batch_size - 1) / self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.entries.len()
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn label_index(&self) -> &LabelIndex {
        &self.labels
    }

    /// Builds batch `batch`: inputs stacked to `(rows, sample shape...)` and
    /// one-hot targets stacked to `(rows, num_classes)`.
    ///
    /// A sample that fails to decode, or whose shape disagrees with the rest
    /// of the batch, fails the whole batch.
    pub fn get(&self, batch: usize) -> Result<(Tensor, Tensor)> {
        if batch >= self.len() {
            return Err(Error::Configuration(format!(
                "batch {} out of range ({} batches)",
                batch,
                self.len()
            )));
        }
        let start = batch * self.batch_size;
        let end = (start + self.batch_size).min(self.entries.len());

        let normalizer = SampleNormalizer::new(self.encoder)
            .with_context(&self.context)
            .with_labels(&self.labels);

        let mut inputs: Vec<Tensor> = Vec::with_capacity(end - start);
        let mut targets: Vec<Tensor> = Vec::with_capacity(end - start);
        for (reference, label) in &self.entries[start..end] {
            let sample = normalizer.normalize(self.kind, reference)?;
            if let Some(first) = inputs.first() {
                if sample.shape != first.shape {
                    return Err(Error::MalformedArray {
                        reference: reference.clone(),
                        reason: format!(
                            "shape {:?} differs from the batch's first sample {:?}",
                            sample.shape, first.shape
                        ),
                    });
                }
            }
            inputs.push(sample);
            targets.push(self.labels.encode(label)?);
        }

        Ok((Tensor::stack(&inputs), Tensor::stack(&targets)))
    }
}
