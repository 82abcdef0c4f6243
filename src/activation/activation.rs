use serde::{Deserialize, Serialize};
use std::f64::consts::E;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    ReLU,
    Identity,
    /// Softmax is a vector-valued activation; it is applied at the stage level
    /// (not element-wise) in `DenseStage::forward()`.  The element-wise
    /// `function()` and `derivative()` methods are therefore not used for
    /// this variant.
    Softmax,
    Tanh,
}

impl ActivationFunction {
    /// Parses the activation names accepted in project configurations.
    pub fn parse(name: &str) -> Result<ActivationFunction> {
        match name.to_ascii_lowercase().as_str() {
            "sig" | "sigmoid" => Ok(ActivationFunction::Sigmoid),
            "relu" => Ok(ActivationFunction::ReLU),
            "linear" | "identity" => Ok(ActivationFunction::Identity),
            "softmax" => Ok(ActivationFunction::Softmax),
            "tanh" => Ok(ActivationFunction::Tanh),
            other => Err(Error::Configuration(format!(
                "unknown activation '{}' (expected sig, ReLU, linear, Softmax or tanh)",
                other
            ))),
        }
    }

    /// Element-wise activation.  For `Softmax`, call `DenseStage::forward()`
    /// which applies the full-vector softmax; this path should not be reached.
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + E.powf(-x)),
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Identity => x,
            ActivationFunction::Softmax => {
                // Softmax cannot be applied element-wise; the stage handles it.
                panic!("ActivationFunction::Softmax::function() must not be called directly; \
                        use DenseStage::forward() which applies the full-vector softmax.")
            }
            ActivationFunction::Tanh => x.tanh(),
        }
    }

    /// Element-wise derivative of the activation.
    ///
    /// For `Softmax`, the classification stage pairs it with cross-entropy and
    /// the combined gradient is `predicted - expected` (already computed by
    /// `CrossEntropyLoss::derivative()`).  Returning `1.0` here lets
    /// `backward()` pass that delta through unchanged without double-applying
    /// the Jacobian.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            },
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Identity => 1.0,
            ActivationFunction::Softmax => 1.0,
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
        }
    }
}

/// Full-vector softmax with max subtraction for numerical stability.
pub fn softmax(z: &[f64]) -> Vec<f64> {
    let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = z.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|&e| e / sum).collect()
}
