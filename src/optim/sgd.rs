use crate::network::network::Network;

/// Plain stochastic gradient descent over a network's stages.
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate }
    }

    /// Applies the gradients every stage accumulated over a batch, scaled by
    /// `scale` (typically 1 / batch rows), then clears them.
    pub fn step(&self, network: &mut Network, scale: f64) {
        let scaled = self.learning_rate * scale;
        for stage in &mut network.stages {
            stage.apply_gradients(scaled);
        }
    }
}
