use std::io::Cursor;

use serde_json::{json, Value};
use tiny_http::{Request, Response};

use trellis_nn::predict;
use trellis_nn::ProjectConfig;

use crate::routes::{data_response, envelope_data, error_response, read_json_body};
use crate::storage;
use crate::SharedState;

/// `POST /predict` — body `{"data": {"project": <name>, "path": <sample>}}`
///
/// `path` is whatever the project's input kind expects: an image or array
/// file path, a literal text snippet, or a label. The answer is the label
/// text for categorical outputs and the probability vector otherwise.
pub fn handle(request: &mut Request, state: &SharedState) -> Response<Cursor<Vec<u8>>> {
    let body = match read_json_body(request) {
        Ok(body) => body,
        Err(e) => return error_response(400, &e),
    };
    let data = match envelope_data(&body) {
        Ok(data) => data,
        Err(e) => return error_response(400, &e),
    };
    let project = match data.get("project").and_then(Value::as_str) {
        Some(project) => project.to_string(),
        None => return error_response(400, "'data' must carry a 'project' name"),
    };
    let sample_ref = match data.get("path").and_then(Value::as_str) {
        Some(path) => path.to_string(),
        None => return error_response(400, "'data' must carry a sample 'path'"),
    };
    if !storage::is_safe_project_name(&project) {
        return error_response(400, "invalid project name");
    }

    let config = match ProjectConfig::load_json(&storage::config_path(&state.root, &project)) {
        Ok(config) => config,
        Err(e) => {
            return error_response(500, &format!("cannot load config for '{}': {}", project, e))
        }
    };

    // Shares the project lock with training, so inference never reads a
    // half-written artifact.
    let lock = state.project_lock(&project);
    let _guard = lock.lock().unwrap();

    let project_dir = storage::project_dir(&state.root, &project);
    match predict(&config, &project_dir, &sample_ref, &state.encoder) {
        Ok(prediction) => data_response(json!(prediction.to_string())),
        Err(e) => {
            log::error!("prediction for '{}' failed: {}", project, e);
            error_response(500, &e.to_string())
        }
    }
}
