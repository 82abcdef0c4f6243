use std::time::Instant;

use crate::data::batches::BatchSource;
use crate::error::{Error, Result};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::math::tensor::Tensor;
use crate::network::network::Network;
use crate::optim::sgd::Sgd;
use crate::train::stats::EpochStats;

/// Summary of a completed fit.
#[derive(Debug, Clone)]
pub struct FitSummary {
    pub epochs_run: usize,
    /// Mean training loss of the last epoch.
    pub final_loss: f64,
    pub history: Vec<EpochStats>,
}

/// Trains `network` on `batches` for `epochs` full passes.
///
/// Batches are visited in index order every epoch; nothing is shuffled, so
/// a run is reproducible given the same initial weights. A batch that fails
/// to decode fails the whole fit. A batch whose loss turns non-finite is
/// skipped with its gradients discarded and training continues; an epoch
/// where every batch is skipped aborts the fit.
pub fn fit(
    network: &mut Network,
    batches: &BatchSource,
    optimizer: &Sgd,
    epochs: usize,
) -> Result<FitSummary> {
    if epochs == 0 {
        return Err(Error::Configuration(
            "epochs must be at least 1".to_string(),
        ));
    }
    let mut history = Vec::with_capacity(epochs);

    for epoch in 1..=epochs {
        let t_start = Instant::now();
        let mut epoch_loss = 0.0;
        let mut samples = 0usize;
        let mut correct = 0usize;
        let mut skipped = 0usize;

        for index in 0..batches.len() {
            let (x, y) = batches.get(index)?;
            if x.shape[1..] != network.input_shape[..] {
                return Err(Error::FitFailure(format!(
                    "batch {} has sample shape {:?}, the network expects {:?}",
                    index,
                    &x.shape[1..],
                    network.input_shape
                )));
            }
            match train_one_batch(network, &x, &y, optimizer) {
                Some(outcome) => {
                    epoch_loss += outcome.loss_sum;
                    correct += outcome.correct;
                    samples += x.shape[0];
                }
                None => {
                    skipped += 1;
                    log::warn!(
                        "epoch {}/{}: skipping batch {} (non-finite loss)",
                        epoch,
                        epochs,
                        index
                    );
                }
            }
        }

        if samples == 0 {
            return Err(Error::FitFailure(format!(
                "all {} batches diverged in epoch {}",
                batches.len(),
                epoch
            )));
        }

        let stats = EpochStats {
            epoch,
            total_epochs: epochs,
            train_loss: epoch_loss / samples as f64,
            train_accuracy: correct as f64 / samples as f64,
            skipped_batches: skipped,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        log::info!(
            "epoch {}/{}: loss {:.6}, accuracy {:.1}%",
            epoch,
            epochs,
            stats.train_loss,
            100.0 * stats.train_accuracy
        );
        history.push(stats);
    }

    let final_loss = history.last().map(|s| s.train_loss).unwrap_or(0.0);
    Ok(FitSummary {
        epochs_run: history.len(),
        final_loss,
        history,
    })
}

struct BatchOutcome {
    loss_sum: f64,
    correct: usize,
}

/// Accumulates gradients over one batch and applies the averaged step.
/// Returns `None`, with gradients discarded, if the loss turns non-finite.
fn train_one_batch(
    network: &mut Network,
    x: &Tensor,
    y: &Tensor,
    optimizer: &Sgd,
) -> Option<BatchOutcome> {
    let rows = x.shape[0];
    let mut loss_sum = 0.0;
    let mut correct = 0usize;

    for row in 0..rows {
        let input = x.subtensor(row);
        let target = y.subtensor(row);
        let output = network.forward_train(&input);

        let loss = CrossEntropyLoss::loss(&output.data, &target.data);
        if !loss.is_finite() {
            network.zero_gradients();
            return None;
        }
        loss_sum += loss;
        if output.argmax() == target.argmax() {
            correct += 1;
        }
        network.backward(&CrossEntropyLoss::derivative(&output, &target));
    }

    optimizer.step(network, 1.0 / rows as f64);
    Some(BatchOutcome { loss_sum, correct })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::kind::DataKind;
    use crate::data::normalize::HashingTextEncoder;
    use crate::network::builder::build_network;
    use crate::network::spec::{LayerKind, LayerSpec};
    use std::fs;

    #[test]
    fn loss_decreases_on_identity_task() {
        // References double as labels: each one-hot input maps to itself.
        let path = std::env::temp_dir().join(format!(
            "trellis-fit-{}-identity.json",
            std::process::id()
        ));
        fs::write(&path, r#"{"left": "left", "right": "right"}"#).unwrap();

        let enc = HashingTextEncoder::new(8);
        let batches = BatchSource::new(&path, DataKind::Categorical, 32, &enc).unwrap();
        let layers = vec![LayerSpec {
            size: vec![8],
            kind: LayerKind::Dense,
            config: None,
        }];
        let mut net = build_network(&layers, &[2], batches.num_classes()).unwrap();

        let summary = fit(&mut net, &batches, &Sgd::new(0.5), 60).unwrap();
        assert_eq!(summary.epochs_run, 60);
        assert!(
            summary.final_loss < summary.history[0].train_loss,
            "loss went {} -> {}",
            summary.history[0].train_loss,
            summary.final_loss
        );
        assert!(summary.history.last().unwrap().train_accuracy > 0.9);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn zero_epochs_is_rejected() {
        let path = std::env::temp_dir().join(format!(
            "trellis-fit-{}-zero.json",
            std::process::id()
        ));
        fs::write(&path, r#"{"a": "a"}"#).unwrap();

        let enc = HashingTextEncoder::new(8);
        let batches = BatchSource::new(&path, DataKind::Categorical, 32, &enc).unwrap();
        let layers = vec![LayerSpec {
            size: vec![4],
            kind: LayerKind::Dense,
            config: None,
        }];
        let mut net = build_network(&layers, &[1], 1).unwrap();
        assert!(matches!(
            fit(&mut net, &batches, &Sgd::new(0.1), 0),
            Err(Error::Configuration(_))
        ));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn wrong_input_shape_fails_the_fit() {
        let path = std::env::temp_dir().join(format!(
            "trellis-fit-{}-shape.json",
            std::process::id()
        ));
        fs::write(&path, r#"{"a": "a", "b": "b"}"#).unwrap();

        let enc = HashingTextEncoder::new(8);
        let batches = BatchSource::new(&path, DataKind::Categorical, 32, &enc).unwrap();
        // Network built over the wrong width.
        let layers = vec![LayerSpec {
            size: vec![4],
            kind: LayerKind::Dense,
            config: None,
        }];
        let mut net = build_network(&layers, &[5], 2).unwrap();
        assert!(matches!(
            fit(&mut net, &batches, &Sgd::new(0.1), 1),
            Err(Error::FitFailure(_))
        ));
        fs::remove_file(&path).ok();
    }
}
