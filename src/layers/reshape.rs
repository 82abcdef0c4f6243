use serde::{Deserialize, Serialize};

use crate::math::tensor::{element_count, Tensor};

/// Collapses any shape to rank 1. Inserted automatically where a spatial
/// output meets a flat consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlattenStage {
    pub input_shape: Vec<usize>,
}

impl FlattenStage {
    pub fn new(input_shape: &[usize]) -> FlattenStage {
        FlattenStage {
            input_shape: input_shape.to_vec(),
        }
    }

    pub fn output_len(&self) -> usize {
        element_count(&self.input_shape)
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        input.reshape(&[self.output_len()])
    }

    pub fn backward(&self, delta: &Tensor) -> Tensor {
        delta.reshape(&self.input_shape)
    }
}

/// Reinterprets a flat vector as a spatial block. Inserted automatically
/// where a flat output meets a spatial consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReshapeStage {
    pub input_shape: Vec<usize>,
    pub output_shape: Vec<usize>,
}

impl ReshapeStage {
    pub fn new(input_shape: &[usize], output_shape: &[usize]) -> ReshapeStage {
        ReshapeStage {
            input_shape: input_shape.to_vec(),
            output_shape: output_shape.to_vec(),
        }
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        input.reshape(&self.output_shape)
    }

    pub fn backward(&self, delta: &Tensor) -> Tensor {
        delta.reshape(&self.input_shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_collapses_and_restores() {
        let stage = FlattenStage::new(&[2, 3, 1]);
        let input = Tensor::zeros(&[2, 3, 1]);
        let flat = stage.forward(&input);
        assert_eq!(flat.shape, vec![6]);
        assert_eq!(stage.backward(&flat).shape, vec![2, 3, 1]);
    }

    #[test]
    fn reshape_round_trips() {
        let stage = ReshapeStage::new(&[9], &[3, 3, 1]);
        let input = Tensor::from_vec((0..9).map(f64::from).collect());
        let block = stage.forward(&input);
        assert_eq!(block.shape, vec![3, 3, 1]);
        assert_eq!(stage.backward(&block).data, input.data);
    }
}
