use serde::{Deserialize, Serialize};

use crate::activation::activation::{softmax, ActivationFunction};
use crate::math::tensor::Tensor;

/// Fully-connected stage: `a = σ(x·W + b)` over a flat input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseStage {
    pub input_size: usize,
    pub units: usize,
    /// Shape `(input_size, units)`.
    pub weights: Tensor,
    /// Shape `(units,)`.
    pub biases: Tensor,
    pub activation: ActivationFunction,
    #[serde(skip)]
    cache: TrainCache,
    #[serde(skip)]
    grads: GradBuffers,
}

#[derive(Debug, Clone, Default)]
struct TrainCache {
    input: Vec<f64>,
    // pre-activation values (z = x·W + b) needed for correct derivative
    pre_activation: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
struct GradBuffers {
    weights: Vec<f64>,
    biases: Vec<f64>,
}

impl DenseStage {
    pub fn new(input_size: usize, units: usize, activation: ActivationFunction) -> DenseStage {
        // He next to ReLU, Xavier otherwise.
        let weights = match activation {
            ActivationFunction::ReLU => Tensor::he(&[input_size, units], input_size),
            _ => Tensor::xavier(&[input_size, units], input_size),
        };
        DenseStage {
            input_size,
            units,
            weights,
            biases: Tensor::zeros(&[units]),
            activation,
            cache: TrainCache::default(),
            grads: GradBuffers::default(),
        }
    }

    fn affine(&self, input: &[f64]) -> Vec<f64> {
        let mut z = self.biases.data.clone();
        for (i, &x) in input.iter().enumerate() {
            let row = &self.weights.data[i * self.units..(i + 1) * self.units];
            for (o, &w) in row.iter().enumerate() {
                z[o] += x * w;
            }
        }
        z
    }

    fn activate(&self, z: Vec<f64>) -> Vec<f64> {
        match self.activation {
            // Softmax is vector-valued and applied over the whole stage output.
            ActivationFunction::Softmax => softmax(&z),
            other => z.into_iter().map(|v| other.function(v)).collect(),
        }
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        Tensor::from_vec(self.activate(self.affine(&input.data)))
    }

    /// Forward pass that caches what `backward` needs.
    pub fn forward_train(&mut self, input: &Tensor) -> Tensor {
        let z = self.affine(&input.data);
        self.cache.input = input.data.clone();
        self.cache.pre_activation = z.clone();
        Tensor::from_vec(self.activate(z))
    }

    /// Consumes ∂L/∂a for this stage, accumulates weight and bias gradients,
    /// and returns ∂L/∂x for the stage below. Must follow `forward_train`.
    pub fn backward(&mut self, delta: &Tensor) -> Tensor {
        let out = self.units;
        // δ = error ⊙ σ'(z). Softmax reports σ'(z) = 1 because the combined
        // softmax/cross-entropy gradient already arrives in z-space.
        let dz: Vec<f64> = delta
            .data
            .iter()
            .zip(&self.cache.pre_activation)
            .map(|(&d, &z)| d * self.activation.derivative(z))
            .collect();

        if self.grads.weights.is_empty() {
            self.grads.weights = vec![0.0; self.input_size * out];
            self.grads.biases = vec![0.0; out];
        }
        for (i, &x) in self.cache.input.iter().enumerate() {
            let row = &mut self.grads.weights[i * out..(i + 1) * out];
            for (o, slot) in row.iter_mut().enumerate() {
                *slot += x * dz[o];
            }
        }
        for (o, slot) in self.grads.biases.iter_mut().enumerate() {
            *slot += dz[o];
        }

        let mut dx = vec![0.0; self.input_size];
        for (i, slot) in dx.iter_mut().enumerate() {
            let row = &self.weights.data[i * out..(i + 1) * out];
            *slot = row.iter().zip(&dz).map(|(&w, &d)| w * d).sum();
        }
        Tensor::from_vec(dx)
    }

    /// Applies the accumulated gradients scaled by `scaled_lr` and clears
    /// them for the next batch.
    pub fn apply_gradients(&mut self, scaled_lr: f64) {
        if self.grads.weights.is_empty() {
            return;
        }
        for (w, g) in self.weights.data.iter_mut().zip(&self.grads.weights) {
            *w -= scaled_lr * g;
        }
        for (b, g) in self.biases.data.iter_mut().zip(&self.grads.biases) {
            *b -= scaled_lr * g;
        }
        self.grads.weights.iter_mut().for_each(|g| *g = 0.0);
        self.grads.biases.iter_mut().for_each(|g| *g = 0.0);
    }

    pub fn zero_gradients(&mut self) {
        self.grads.weights.iter_mut().for_each(|g| *g = 0.0);
        self.grads.biases.iter_mut().for_each(|g| *g = 0.0);
    }
}
