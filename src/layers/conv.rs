use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::math::tensor::{element_count, strides_for, unravel, Tensor};

/// Output extent along one spatial axis, or `None` when the window cannot
/// fit: `(input + 2·padding - kernel) / stride + 1`.
pub fn conv_output_extent(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> Option<usize> {
    let padded = input + 2 * padding;
    if stride == 0 || kernel == 0 || kernel > padded {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}

/// Convolution over a channel-last input of any spatial rank from 1 to 3.
///
/// Weights have shape `kernel extents + (in_channels, filters)`; the output
/// keeps the spatial rank with `filters` channels. Stride and padding apply
/// uniformly to every spatial axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvStage {
    pub kernel: Vec<usize>,
    pub filters: usize,
    pub stride: usize,
    pub padding: usize,
    /// Spatial extents plus a trailing channel axis.
    pub input_shape: Vec<usize>,
    pub output_shape: Vec<usize>,
    pub weights: Tensor,
    pub biases: Tensor,
    pub activation: ActivationFunction,
    #[serde(skip)]
    cache: ConvCache,
    #[serde(skip)]
    grads: GradBuffers,
}

#[derive(Debug, Clone, Default)]
struct ConvCache {
    input: Vec<f64>,
    pre_activation: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
struct GradBuffers {
    weights: Vec<f64>,
    biases: Vec<f64>,
}

impl ConvStage {
    /// `input_shape` must be spatial extents plus channels, with the window
    /// fitting everywhere. The caller validates that before construction.
    pub fn new(
        input_shape: &[usize],
        kernel: &[usize],
        filters: usize,
        stride: usize,
        padding: usize,
        activation: ActivationFunction,
    ) -> ConvStage {
        let rank = kernel.len();
        let in_channels = input_shape[rank];
        let mut output_shape: Vec<usize> = input_shape[..rank]
            .iter()
            .zip(kernel)
            .map(|(&i, &k)| match conv_output_extent(i, k, stride, padding) {
                Some(extent) => extent,
                None => panic!("kernel {:?} does not fit input {:?}", kernel, input_shape),
            })
            .collect();
        output_shape.push(filters);

        let mut weight_shape = kernel.to_vec();
        weight_shape.extend([in_channels, filters]);
        let fan_in = element_count(kernel) * in_channels;
        let weights = match activation {
            ActivationFunction::ReLU => Tensor::he(&weight_shape, fan_in),
            _ => Tensor::xavier(&weight_shape, fan_in),
        };

        ConvStage {
            kernel: kernel.to_vec(),
            filters,
            stride,
            padding,
            input_shape: input_shape.to_vec(),
            output_shape,
            weights,
            biases: Tensor::zeros(&[filters]),
            activation,
            cache: ConvCache::default(),
            grads: GradBuffers::default(),
        }
    }

    fn convolve(&self, input: &[f64]) -> Vec<f64> {
        let rank = self.kernel.len();
        let in_spatial = &self.input_shape[..rank];
        let out_spatial = &self.output_shape[..rank];
        let in_channels = self.input_shape[rank];
        let in_strides = strides_for(&self.input_shape);
        let out_strides = strides_for(&self.output_shape);
        let weight_strides = strides_for(&self.weights.shape);

        let out_cells = element_count(out_spatial);
        let kernel_cells = element_count(&self.kernel);
        let mut z = vec![0.0; element_count(&self.output_shape)];
        let mut opos = vec![0usize; rank];
        let mut kpos = vec![0usize; rank];

        for cell in 0..out_cells {
            unravel(cell, out_spatial, &mut opos);
            let out_base: usize = opos.iter().zip(&out_strides).map(|(c, s)| c * s).sum();
            z[out_base..out_base + self.filters].copy_from_slice(&self.biases.data);

            for k in 0..kernel_cells {
                unravel(k, &self.kernel, &mut kpos);
                let Some(in_base) = self.input_offset(&opos, &kpos, in_spatial, &in_strides)
                else {
                    continue; // window cell lands in the zero padding
                };
                let weight_base: usize =
                    kpos.iter().zip(&weight_strides).map(|(c, s)| c * s).sum();

                for ci in 0..in_channels {
                    let x = input[in_base + ci];
                    let weight_row = weight_base + ci * self.filters;
                    for f in 0..self.filters {
                        z[out_base + f] += x * self.weights.data[weight_row + f];
                    }
                }
            }
        }
        z
    }

    /// Flat offset of the input cell a window position reads, or `None`
    /// when padding pushes it outside the input.
    fn input_offset(
        &self,
        opos: &[usize],
        kpos: &[usize],
        in_spatial: &[usize],
        in_strides: &[usize],
    ) -> Option<usize> {
        let mut base = 0usize;
        for d in 0..opos.len() {
            let c = opos[d] * self.stride + kpos[d];
            if c < self.padding || c - self.padding >= in_spatial[d] {
                return None;
            }
            base += (c - self.padding) * in_strides[d];
        }
        Some(base)
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        let z = self.convolve(&input.data);
        Tensor::from_shape_vec(
            &self.output_shape,
            z.into_iter().map(|v| self.activation.function(v)).collect(),
        )
    }

    pub fn forward_train(&mut self, input: &Tensor) -> Tensor {
        let z = self.convolve(&input.data);
        self.cache.input = input.data.clone();
        self.cache.pre_activation = z.clone();
        Tensor::from_shape_vec(
            &self.output_shape,
            z.into_iter().map(|v| self.activation.function(v)).collect(),
        )
    }

    /// Accumulates gradients and returns ∂L/∂x. Must follow `forward_train`.
    pub fn backward(&mut self, delta: &Tensor) -> Tensor {
        let rank = self.kernel.len();
        let in_spatial = &self.input_shape[..rank];
        let out_spatial = &self.output_shape[..rank];
        let in_channels = self.input_shape[rank];
        let in_strides = strides_for(&self.input_shape);
        let out_strides = strides_for(&self.output_shape);
        let weight_strides = strides_for(&self.weights.shape);

        let dz: Vec<f64> = delta
            .data
            .iter()
            .zip(&self.cache.pre_activation)
            .map(|(&d, &z)| d * self.activation.derivative(z))
            .collect();

        if self.grads.weights.is_empty() {
            self.grads.weights = vec![0.0; self.weights.data.len()];
            self.grads.biases = vec![0.0; self.filters];
        }

        let out_cells = element_count(out_spatial);
        let kernel_cells = element_count(&self.kernel);
        let mut dx = vec![0.0; element_count(&self.input_shape)];
        let mut opos = vec![0usize; rank];
        let mut kpos = vec![0usize; rank];

        for cell in 0..out_cells {
            unravel(cell, out_spatial, &mut opos);
            let out_base: usize = opos.iter().zip(&out_strides).map(|(c, s)| c * s).sum();
            for f in 0..self.filters {
                self.grads.biases[f] += dz[out_base + f];
            }

            for k in 0..kernel_cells {
                unravel(k, &self.kernel, &mut kpos);
                let Some(in_base) = self.input_offset(&opos, &kpos, in_spatial, &in_strides)
                else {
                    continue;
                };
                let weight_base: usize =
                    kpos.iter().zip(&weight_strides).map(|(c, s)| c * s).sum();

                for ci in 0..in_channels {
                    let x = self.cache.input[in_base + ci];
                    let weight_row = weight_base + ci * self.filters;
                    for f in 0..self.filters {
                        let d = dz[out_base + f];
                        self.grads.weights[weight_row + f] += x * d;
                        dx[in_base + ci] += self.weights.data[weight_row + f] * d;
                    }
                }
            }
        }
        Tensor::from_shape_vec(&self.input_shape, dx)
    }

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

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_conv(
        input_shape: &[usize],
        kernel: &[usize],
        filters: usize,
        stride: usize,
        padding: usize,
        weights: Vec<f64>,
    ) -> ConvStage {
        let mut stage = ConvStage::new(
            input_shape,
            kernel,
            filters,
            stride,
            padding,
            ActivationFunction::Identity,
        );
        stage.weights = Tensor::from_shape_vec(&stage.weights.shape.clone(), weights);
        stage
    }

    #[test]
    fn output_extent_formula() {
        assert_eq!(conv_output_extent(28, 3, 1, 0), Some(26));
        assert_eq!(conv_output_extent(28, 3, 1, 1), Some(28));
        assert_eq!(conv_output_extent(4, 2, 2, 0), Some(2));
        assert_eq!(conv_output_extent(2, 3, 1, 0), None);
        assert_eq!(conv_output_extent(2, 3, 1, 1), Some(2));
        assert_eq!(conv_output_extent(4, 2, 0, 0), None);
    }

    #[test]
    fn one_dimensional_difference_kernel() {
        let stage = identity_conv(&[4, 1], &[2], 1, 1, 0, vec![1.0, -1.0]);
        let input = Tensor::from_shape_vec(&[4, 1], vec![1.0, 2.0, 3.0, 4.0]);
        let out = stage.forward(&input);
        assert_eq!(out.shape, vec![3, 1]);
        assert_eq!(out.data, vec![-1.0, -1.0, -1.0]);
    }

    #[test]
    fn two_dimensional_box_sum() {
        let stage = identity_conv(&[3, 3, 1], &[2, 2], 1, 1, 0, vec![1.0; 4]);
        let input = Tensor::from_shape_vec(
            &[3, 3, 1],
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
        );
        let out = stage.forward(&input);
        assert_eq!(out.shape, vec![2, 2, 1]);
        assert_eq!(out.data, vec![12.0, 16.0, 24.0, 28.0]);
    }

    #[test]
    fn padding_reads_zeros_outside() {
        let stage = identity_conv(&[3, 1], &[3], 1, 1, 1, vec![1.0, 1.0, 1.0]);
        let input = Tensor::from_shape_vec(&[3, 1], vec![1.0, 2.0, 3.0]);
        let out = stage.forward(&input);
        assert_eq!(out.shape, vec![3, 1]);
        assert_eq!(out.data, vec![3.0, 6.0, 5.0]);
    }

    #[test]
    fn stride_skips_positions() {
        let stage = identity_conv(&[4, 1], &[2], 1, 2, 0, vec![1.0, 1.0]);
        let input = Tensor::from_shape_vec(&[4, 1], vec![1.0, 2.0, 3.0, 4.0]);
        let out = stage.forward(&input);
        assert_eq!(out.shape, vec![2, 1]);
        assert_eq!(out.data, vec![3.0, 7.0]);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut stage = ConvStage::new(
            &[3, 3, 2],
            &[2, 2],
            2,
            1,
            0,
            ActivationFunction::Sigmoid,
        );
        let input = Tensor::from_shape_vec(
            &[3, 3, 2],
            (0..18).map(|i| (i as f64) / 10.0 - 0.9).collect(),
        );

        stage.forward_train(&input);
        let ones = Tensor::filled(&stage.output_shape.clone(), 1.0);
        let dx = stage.backward(&ones);

        let eps = 1e-6;
        let loss = |s: &ConvStage, x: &Tensor| -> f64 { s.forward(x).data.iter().sum() };

        for wi in 0..stage.weights.data.len() {
            let mut plus = stage.clone();
            plus.weights.data[wi] += eps;
            let mut minus = stage.clone();
            minus.weights.data[wi] -= eps;
            let numeric = (loss(&plus, &input) - loss(&minus, &input)) / (2.0 * eps);
            assert!(
                (stage.grads.weights[wi] - numeric).abs() < 1e-6,
                "weight {}: {} vs {}",
                wi,
                stage.grads.weights[wi],
                numeric
            );
        }
        for xi in 0..input.data.len() {
            let mut plus = input.clone();
            plus.data[xi] += eps;
            let mut minus = input.clone();
            minus.data[xi] -= eps;
            let numeric = (loss(&stage, &plus) - loss(&stage, &minus)) / (2.0 * eps);
            assert!(
                (dx.data[xi] - numeric).abs() < 1e-6,
                "input {}: {} vs {}",
                xi,
                dx.data[xi],
                numeric
            );
        }
    }
}
