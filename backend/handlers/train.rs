use std::io::Cursor;

use serde_json::json;
use tiny_http::{Request, Response};

use trellis_nn::network::spec::LayerKind;
use trellis_nn::train::run_training;
use trellis_nn::ProjectConfig;

use crate::routes::{data_response, error_response, read_name_body};
use crate::storage;
use crate::SharedState;

/// Assumed dataset size for the pre-training time estimate.
const ESTIMATE_SAMPLES: usize = 1000;
/// Assumed seconds of work per unit, sample and epoch.
const ESTIMATE_SECONDS_PER_UNIT: f64 = 1e-4;

/// `POST /train_project` — body `{"data": <name>}`
///
/// Loads and validates the project config, then trains synchronously under
/// the project lock. The response is `{"data":"completed"}` on success or
/// `{"error": ...}` with status 500 on any failure.
pub fn handle(request: &mut Request, state: &SharedState) -> Response<Cursor<Vec<u8>>> {
    let name = match read_name_body(request) {
        Ok(name) => name,
        Err(e) => return error_response(400, &e),
    };
    if !storage::is_safe_project_name(&name) {
        return error_response(400, "invalid project name");
    }

    let config = match ProjectConfig::load_json(&storage::config_path(&state.root, &name)) {
        Ok(config) => config,
        Err(e) => return error_response(500, &format!("cannot load config for '{}': {}", name, e)),
    };
    if let Err(e) = config.validate() {
        return error_response(500, &e.to_string());
    }

    let estimate = estimate_training_time(
        total_declared_units(&config),
        config.epochs,
        ESTIMATE_SAMPLES,
        ESTIMATE_SECONDS_PER_UNIT,
    );
    log::info!(
        "training project '{}' ({} epochs, estimated {:.1}s)",
        name,
        config.epochs,
        estimate
    );

    let lock = state.project_lock(&name);
    let _guard = lock.lock().unwrap();

    let project_dir = storage::project_dir(&state.root, &name);
    match run_training(&config, &project_dir, &state.encoder) {
        Ok(artifact) => {
            log::info!(
                "project '{}' trained: {} epochs, final loss {:.6}, saved to {}",
                name,
                artifact.epochs_run,
                artifact.final_loss,
                artifact.model_path.display()
            );
            data_response(json!("completed"))
        }
        Err(e) => {
            log::error!("training project '{}' failed: {}", name, e);
            error_response(500, &e.to_string())
        }
    }
}

/// Declared unit count across the hidden layers. Dense layers contribute
/// their width, convolutions their kernel cells times filter count.
fn total_declared_units(config: &ProjectConfig) -> usize {
    let mut total = 0;
    for layer in &config.hidden_layers {
        match layer.kind {
            LayerKind::Dense => total += layer.size.first().copied().unwrap_or(0),
            LayerKind::Convolution => {
                let cells: usize = layer.size.iter().product();
                let filters = layer
                    .config
                    .as_ref()
                    .and_then(|params| params.filters)
                    .unwrap_or(0);
                total += cells * filters;
            }
            LayerKind::Pooling => {}
        }
    }
    total
}

/// Back-of-envelope training-time estimate in seconds.
fn estimate_training_time(
    total_units: usize,
    epochs: usize,
    samples: usize,
    seconds_per_unit: f64,
) -> f64 {
    (total_units * samples * epochs) as f64 * seconds_per_unit
}
