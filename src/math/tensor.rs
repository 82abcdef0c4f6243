use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A dense rank-N array of `f64` values.
///
/// `data` is stored flat in row-major order; `shape` gives the extent of each
/// axis. Rank 1 covers flat feature vectors, rank 3 covers channel-last
/// images, and a leading axis is used for batches.
///
/// Shape mismatches in the arithmetic helpers are programmer errors and
/// panic. Validation of user-supplied data happens before a `Tensor` is
/// constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![0.0; element_count(shape)],
        }
    }

    pub fn filled(shape: &[usize], value: f64) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![value; element_count(shape)],
        }
    }

    pub fn from_shape_vec(shape: &[usize], data: Vec<f64>) -> Tensor {
        if element_count(shape) != data.len() {
            panic!(
                "{} elements cannot take shape {:?}",
                data.len(),
                shape
            );
        }
        Tensor {
            shape: shape.to_vec(),
            data,
        }
    }

    pub fn from_vec(data: Vec<f64>) -> Tensor {
        Tensor {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a view of the same data under a new shape.
    /// The element count must not change.
    pub fn reshape(&self, shape: &[usize]) -> Tensor {
        if element_count(shape) != self.data.len() {
            panic!(
                "cannot reshape {:?} ({} elements) to {:?}",
                self.shape,
                self.data.len(),
                shape
            );
        }
        Tensor {
            shape: shape.to_vec(),
            data: self.data.clone(),
        }
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    /// Stacks equally-shaped tensors along a new leading axis.
    pub fn stack(parts: &[Tensor]) -> Tensor {
        let first = match parts.first() {
            Some(t) => t,
            None => panic!("cannot stack zero tensors"),
        };
        let mut shape = Vec::with_capacity(first.rank() + 1);
        shape.push(parts.len());
        shape.extend_from_slice(&first.shape);

        let mut data = Vec::with_capacity(parts.len() * first.len());
        for part in parts {
            if part.shape != first.shape {
                panic!(
                    "cannot stack shapes {:?} and {:?}",
                    first.shape, part.shape
                );
            }
            data.extend_from_slice(&part.data);
        }
        Tensor { shape, data }
    }

    /// Copies out the `index`-th slice along the leading axis.
    pub fn subtensor(&self, index: usize) -> Tensor {
        if self.rank() == 0 || index >= self.shape[0] {
            panic!("subtensor {} out of range for shape {:?}", index, self.shape);
        }
        let inner = &self.shape[1..];
        let stride = element_count(inner);
        Tensor {
            shape: inner.to_vec(),
            data: self.data[index * stride..(index + 1) * stride].to_vec(),
        }
    }

    /// Index of the largest element. Ties resolve to the lowest index.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &v) in self.data.iter().enumerate() {
            if v > self.data[best] {
                best = i;
            }
        }
        best
    }

    /// He initialization: samples from N(0, sqrt(2 / fan_in)).
    ///
    /// Recommended before ReLU layers. The variance 2/fan_in accounts for
    /// the fact that ReLU zeroes half of its inputs on average.
    pub fn he(shape: &[usize], fan_in: usize) -> Tensor {
        let mut rng = rand::thread_rng();
        let std_dev = (2.0 / fan_in as f64).sqrt();
        Tensor {
            shape: shape.to_vec(),
            data: (0..element_count(shape))
                .map(|_| sample_standard_normal(&mut rng) * std_dev)
                .collect(),
        }
    }

    /// Xavier (Glorot) initialization: samples from N(0, sqrt(1 / fan_in)).
    ///
    /// Recommended before Sigmoid/Tanh/Identity layers. Keeps the variance of
    /// activations and gradients roughly equal across layers.
    pub fn xavier(shape: &[usize], fan_in: usize) -> Tensor {
        let mut rng = rand::thread_rng();
        let std_dev = (1.0 / fan_in as f64).sqrt();
        Tensor {
            shape: shape.to_vec(),
            data: (0..element_count(shape))
                .map(|_| sample_standard_normal(&mut rng) * std_dev)
                .collect(),
        }
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor {
            shape: vec![0],
            data: vec![],
        }
    }
}

/// Product of all extents; the number of elements a shape holds.
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Row-major strides for a shape.
pub fn strides_for(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Decodes a flat row-major index into per-axis coordinates.
pub fn unravel(mut flat: usize, shape: &[usize], coords: &mut [usize]) {
    for i in (0..shape.len()).rev() {
        coords[i] = flat % shape[i];
        flat /= shape[i];
    }
}

/// Samples a single value from N(0, 1) using the Box-Muller transform.
/// Both u1 and u2 must be uniform on (0, 1].
pub fn sample_standard_normal<R: Rng>(rng: &mut R) -> f64 {
    // Draw two independent uniform samples in (0, 1] to avoid log(0).
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
