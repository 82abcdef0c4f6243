pub mod builder;
pub mod metadata;
pub mod network;
pub mod spec;

pub use builder::build_network;
pub use metadata::ModelMetadata;
pub use network::Network;
pub use spec::{IoSpec, LayerKind, LayerParams, LayerSpec, ProjectConfig};
