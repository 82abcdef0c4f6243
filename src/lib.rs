pub mod math;
pub mod activation;
pub mod data;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod train;
pub mod predict;
pub mod error;

// Convenience re-exports
pub use activation::activation::ActivationFunction;
pub use data::batches::BatchSource;
pub use data::kind::DataKind;
pub use data::labels::LabelIndex;
pub use data::normalize::{HashingTextEncoder, SampleNormalizer, TextEncoder};
pub use error::{Error, Result};
pub use loss::cross_entropy::CrossEntropyLoss;
pub use math::tensor::Tensor;
pub use network::builder::build_network;
pub use network::metadata::ModelMetadata;
pub use network::network::Network;
pub use network::spec::{IoSpec, LayerKind, LayerParams, LayerSpec, ProjectConfig};
pub use optim::sgd::Sgd;
pub use predict::{predict, Prediction};
pub use train::fit::{fit, FitSummary};
pub use train::runner::{run_training, TrainedArtifact};
