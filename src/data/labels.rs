use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Reads a label-index file: a JSON object mapping sample references (file
/// names, or raw label strings for categorical data) to labels.
///
/// Entries come back in on-disk key order, which is what batching slices
/// over. Label values may be strings or numbers; numbers are canonicalized
/// to their decimal string form.
pub fn read_label_entries(path: &Path) -> Result<Vec<(String, String)>> {
    let text = fs::read_to_string(path)?;
    let map: serde_json::Map<String, Value> = serde_json::from_str(&text)?;

    let mut entries = Vec::with_capacity(map.len());
    for (reference, value) in map {
        let label = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(Error::Configuration(format!(
                    "label for '{}' must be a string or number, got {}",
                    reference, other
                )))
            }
        };
        entries.push((reference, label));
    }
    Ok(entries)
}

/// A bijection between label strings and dense class indices.
///
/// Indices are assigned by sorting the distinct labels lexicographically, so
/// the same set of labels always produces the same mapping regardless of the
/// order samples appear in.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelIndex {
    labels: Vec<String>,
    positions: HashMap<String, usize>,
}

impl LabelIndex {
    pub fn from_entries(entries: &[(String, String)]) -> LabelIndex {
        let mut labels: Vec<String> = entries.iter().map(|(_, l)| l.clone()).collect();
        labels.sort();
        labels.dedup();

        let positions = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect();

        LabelIndex { labels, positions }
    }

    pub fn from_file(path: &Path) -> Result<LabelIndex> {
        Ok(LabelIndex::from_entries(&read_label_entries(path)?))
    }

    /// Number of distinct labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in index order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.positions.get(label).copied()
    }

    /// One-hot encodes a label over the full class count.
    pub fn encode(&self, label: &str) -> Result<Tensor> {
        let position = self
            .position(label)
            .ok_or_else(|| Error::UnknownLabel(label.to_string()))?;
        let mut one_hot = Tensor::zeros(&[self.labels.len()]);
        one_hot.data[position] = 1.0;
        Ok(one_hot)
    }

    /// The label behind a class index, if the index is in range.
    pub fn label_for(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(|s| s.as_str())
    }
}
