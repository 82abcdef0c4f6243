use serde::{Deserialize, Serialize};

use crate::data::kind::DataKind;

/// Optional annotations attached to a saved model.
/// All fields are Option<> so models written before a field existed
/// deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    /// Data kind the model was trained to consume.
    pub input: Option<DataKind>,
    /// Data kind the project declared for its output.
    pub output: Option<DataKind>,
    /// Class labels in index order at the time the model was trained.
    /// Prediction re-derives the live mapping from the label-index file and
    /// uses this snapshot only to warn when the two drift apart.
    pub class_labels: Option<Vec<String>>,
}
