use serde::{Deserialize, Serialize};

use crate::math::tensor::{element_count, strides_for, unravel, Tensor};

/// Output extent along one spatial axis for a non-overlapping window, or
/// `None` when the window does not fit. The stride equals the window, so
/// trailing cells that do not fill a window are dropped.
pub fn pool_output_extent(input: usize, window: usize) -> Option<usize> {
    if window == 0 || window > input {
        return None;
    }
    Some((input - window) / window + 1)
}

/// Max pooling over a channel-last input. Windows tile the spatial axes
/// without overlap; channels pool independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStage {
    pub window: Vec<usize>,
    pub input_shape: Vec<usize>,
    pub output_shape: Vec<usize>,
    /// Winning input index per output element, recorded by `forward_train`
    /// so `backward` can route deltas.
    #[serde(skip)]
    argmax: Vec<usize>,
}

impl PoolStage {
    pub fn new(input_shape: &[usize], window: &[usize]) -> PoolStage {
        let rank = window.len();
        let mut output_shape: Vec<usize> = input_shape[..rank]
            .iter()
            .zip(window)
            .map(|(&i, &w)| match pool_output_extent(i, w) {
                Some(extent) => extent,
                None => panic!("window {:?} does not fit input {:?}", window, input_shape),
            })
            .collect();
        output_shape.push(input_shape[rank]);

        PoolStage {
            window: window.to_vec(),
            input_shape: input_shape.to_vec(),
            output_shape,
            argmax: Vec::new(),
        }
    }

    fn scan(&self, input: &[f64]) -> (Vec<f64>, Vec<usize>) {
        let rank = self.window.len();
        let channels = self.input_shape[rank];
        let out_spatial = &self.output_shape[..rank];
        let in_strides = strides_for(&self.input_shape);
        let out_strides = strides_for(&self.output_shape);

        let out_cells = element_count(out_spatial);
        let window_cells = element_count(&self.window);
        let mut out = vec![f64::NEG_INFINITY; element_count(&self.output_shape)];
        let mut winners = vec![0usize; out.len()];
        let mut opos = vec![0usize; rank];
        let mut wpos = vec![0usize; rank];

        for cell in 0..out_cells {
            unravel(cell, out_spatial, &mut opos);
            let out_base: usize = opos.iter().zip(&out_strides).map(|(c, s)| c * s).sum();

            for w in 0..window_cells {
                unravel(w, &self.window, &mut wpos);
                let in_base: usize = opos
                    .iter()
                    .zip(&wpos)
                    .zip(&self.window)
                    .zip(&in_strides)
                    .map(|(((&o, &k), &win), &s)| (o * win + k) * s)
                    .sum();

                for c in 0..channels {
                    let v = input[in_base + c];
                    if v > out[out_base + c] {
                        out[out_base + c] = v;
                        winners[out_base + c] = in_base + c;
                    }
                }
            }
        }
        (out, winners)
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        let (out, _) = self.scan(&input.data);
        Tensor::from_shape_vec(&self.output_shape, out)
    }

    pub fn forward_train(&mut self, input: &Tensor) -> Tensor {
        let (out, winners) = self.scan(&input.data);
        self.argmax = winners;
        Tensor::from_shape_vec(&self.output_shape, out)
    }

    /// Routes each delta to the input cell that won its window.
    pub fn backward(&mut self, delta: &Tensor) -> Tensor {
        let mut dx = vec![0.0; element_count(&self.input_shape)];
        for (j, &winner) in self.argmax.iter().enumerate() {
            dx[winner] += delta.data[j];
        }
        Tensor::from_shape_vec(&self.input_shape, dx)
    }
}
