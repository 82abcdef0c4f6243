pub mod conv;
pub mod dense;
pub mod pool;
pub mod reshape;

pub use conv::ConvStage;
pub use dense::DenseStage;
pub use pool::PoolStage;
pub use reshape::{FlattenStage, ReshapeStage};

use serde::{Deserialize, Serialize};

use crate::math::tensor::Tensor;

/// One executable step of a built network.
///
/// The set is closed: a declared architecture lowers to exactly these
/// stages, with `Flatten` and `Reshape` inserted where declared layers
/// disagree about rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Dense(DenseStage),
    Conv(ConvStage),
    Pool(PoolStage),
    Flatten(FlattenStage),
    Reshape(ReshapeStage),
}

impl Stage {
    /// Inference pass; touches no training state.
    pub fn forward(&self, input: &Tensor) -> Tensor {
        match self {
            Stage::Dense(s) => s.forward(input),
            Stage::Conv(s) => s.forward(input),
            Stage::Pool(s) => s.forward(input),
            Stage::Flatten(s) => s.forward(input),
            Stage::Reshape(s) => s.forward(input),
        }
    }

    /// Forward pass that caches intermediates for `backward`.
    pub fn forward_train(&mut self, input: &Tensor) -> Tensor {
        match self {
            Stage::Dense(s) => s.forward_train(input),
            Stage::Conv(s) => s.forward_train(input),
            Stage::Pool(s) => s.forward_train(input),
            Stage::Flatten(s) => s.forward(input),
            Stage::Reshape(s) => s.forward(input),
        }
    }

    /// Takes ∂L/∂output, accumulates parameter gradients where the stage
    /// has any, and returns ∂L/∂input.
    pub fn backward(&mut self, delta: &Tensor) -> Tensor {
        match self {
            Stage::Dense(s) => s.backward(delta),
            Stage::Conv(s) => s.backward(delta),
            Stage::Pool(s) => s.backward(delta),
            Stage::Flatten(s) => s.backward(delta),
            Stage::Reshape(s) => s.backward(delta),
        }
    }

    /// Applies and clears accumulated gradients. No-op for stages without
    /// parameters.
    pub fn apply_gradients(&mut self, scaled_lr: f64) {
        match self {
            Stage::Dense(s) => s.apply_gradients(scaled_lr),
            Stage::Conv(s) => s.apply_gradients(scaled_lr),
            _ => {}
        }
    }

    /// Discards accumulated gradients, e.g. after a skipped batch.
    pub fn zero_gradients(&mut self) {
        match self {
            Stage::Dense(s) => s.zero_gradients(),
            Stage::Conv(s) => s.zero_gradients(),
            _ => {}
        }
    }

    /// Short human-readable form for logs.
    pub fn describe(&self) -> String {
        match self {
            Stage::Dense(s) => format!("Dense({})", s.units),
            Stage::Conv(s) => format!(
                "Conv({} x{}, stride {})",
                join_extents(&s.kernel),
                s.filters,
                s.stride
            ),
            Stage::Pool(s) => format!("Pool({})", join_extents(&s.window)),
            Stage::Flatten(_) => "Flatten".to_string(),
            Stage::Reshape(s) => format!("Reshape({})", join_extents(&s.output_shape)),
        }
    }
}

fn join_extents(extents: &[usize]) -> String {
    extents
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("x")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;

    #[test]
    fn describe_is_compact() {
        let dense = Stage::Dense(DenseStage::new(4, 10, ActivationFunction::ReLU));
        assert_eq!(dense.describe(), "Dense(10)");

        let pool = Stage::Pool(PoolStage::new(&[4, 4, 1], &[2, 2]));
        assert_eq!(pool.describe(), "Pool(2x2)");
    }

    #[test]
    fn stage_serde_round_trip() {
        let stage = Stage::Flatten(FlattenStage::new(&[2, 2, 1]));
        let json = serde_json::to_string(&stage).unwrap();
        assert!(json.contains("\"stage\":\"flatten\""));
        let back: Stage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.forward(&Tensor::zeros(&[2, 2, 1])).shape, vec![4]);
    }
}
