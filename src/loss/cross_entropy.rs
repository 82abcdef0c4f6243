use crate::math::tensor::Tensor;

/// Categorical cross-entropy, paired with the softmax classification head.
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f64 = 1e-12;

impl CrossEntropyLoss {
    /// Scalar loss for one sample:
    ///   L = -sum(expected[i] * log(predicted[i] + eps))
    ///
    /// `predicted` — softmax probabilities, shape [num_classes]
    /// `expected`  — one-hot target distribution, shape [num_classes]
    pub fn loss(predicted: &[f64], expected: &[f64]) -> f64 {
        predicted
            .iter()
            .zip(expected.iter())
            .map(|(p, e)| -e * (p + EPS).ln())
            .sum()
    }

    /// Gradient of the combined softmax + cross-entropy w.r.t. the
    /// pre-softmax logits:
    ///   ∂L/∂z_i = predicted[i] - expected[i]   (element-wise)
    ///
    /// This is the initial delta fed into the backward pass. The softmax
    /// stage reports an activation derivative of 1.0 so the combined
    /// gradient is not double-applied.
    pub fn derivative(predicted: &Tensor, expected: &Tensor) -> Tensor {
        Tensor {
            shape: predicted.shape.clone(),
            data: predicted
                .data
                .iter()
                .zip(&expected.data)
                .map(|(p, e)| p - e)
                .collect(),
        }
    }
}
