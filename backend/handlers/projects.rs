use std::fs;
use std::io::Cursor;

use serde_json::json;
use tiny_http::{Request, Response};

use trellis_nn::ProjectConfig;

use crate::routes::{data_response, error_response, read_json_body, read_name_body};
use crate::storage;
use crate::SharedState;

/// `GET /get_projects`
///
/// Lists every project directory under the storage root, sorted so the
/// answer is stable across calls.
pub fn handle_list(state: &SharedState) -> Response<Cursor<Vec<u8>>> {
    let dir = storage::project_files_dir(&state.root);
    let mut names = Vec::new();
    if let Ok(entries) = fs::read_dir(&dir) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
    }
    names.sort();
    data_response(json!(names))
}

/// `POST /new_project` — body `{"data": <name>}`
///
/// Creates the project directory with a fresh default config. Creating a
/// project that already exists is an error.
pub fn handle_new(request: &mut Request, state: &SharedState) -> Response<Cursor<Vec<u8>>> {
    let name = match read_name_body(request) {
        Ok(name) => name,
        Err(e) => return error_response(400, &e),
    };
    if !storage::is_safe_project_name(&name) {
        return error_response(400, "invalid project name");
    }

    if let Err(e) = fs::create_dir_all(storage::project_files_dir(&state.root)) {
        return error_response(500, &format!("cannot create storage root: {}", e));
    }
    if let Err(e) = fs::create_dir(storage::project_dir(&state.root, &name)) {
        return error_response(500, &format!("cannot create project '{}': {}", name, e));
    }

    let config = ProjectConfig::default_for(&name);
    match config.save_json(&storage::config_path(&state.root, &name)) {
        Ok(()) => data_response(json!("completed")),
        Err(e) => error_response(500, &format!("cannot write config for '{}': {}", name, e)),
    }
}

/// `POST /delete_project` — body `{"data": <name>}`
pub fn handle_delete(request: &mut Request, state: &SharedState) -> Response<Cursor<Vec<u8>>> {
    let name = match read_name_body(request) {
        Ok(name) => name,
        Err(e) => return error_response(400, &e),
    };
    if !storage::is_safe_project_name(&name) {
        return error_response(400, "invalid project name");
    }

    // Hold the project lock so the directory is not pulled out from under
    // a training run.
    let lock = state.project_lock(&name);
    let _guard = lock.lock().unwrap();

    match fs::remove_dir_all(storage::project_dir(&state.root, &name)) {
        Ok(()) => data_response(json!("completed")),
        Err(e) => error_response(500, &format!("cannot delete project '{}': {}", name, e)),
    }
}

/// `POST /get_project_config` — body `{"data": <name>}`
///
/// Answers the stored config after typed validation, so a hand-edited
/// file that no longer parses is reported instead of echoed.
pub fn handle_get_config(request: &mut Request, state: &SharedState) -> Response<Cursor<Vec<u8>>> {
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
    match serde_json::to_value(&config) {
        Ok(value) => data_response(value),
        Err(e) => error_response(500, &e.to_string()),
    }
}

/// `POST /set_project_config` — body `{"data": <config object>}`
///
/// The config names its own project. It must deserialize and validate
/// before anything is written, and the project must already exist.
pub fn handle_set_config(request: &mut Request, state: &SharedState) -> Response<Cursor<Vec<u8>>> {
    let body = match read_json_body(request) {
        Ok(body) => body,
        Err(e) => return error_response(400, &e),
    };
    let data = match body.get("data") {
        Some(data) => data.clone(),
        None => return error_response(400, "request body has no 'data' field"),
    };
    let config: ProjectConfig = match serde_json::from_value(data) {
        Ok(config) => config,
        Err(e) => return error_response(400, &format!("malformed project config: {}", e)),
    };
    if !storage::is_safe_project_name(&config.name) {
        return error_response(400, "invalid project name");
    }
    if let Err(e) = config.validate() {
        return error_response(400, &e.to_string());
    }
    if !storage::project_dir(&state.root, &config.name).is_dir() {
        return error_response(404, &format!("no such project: '{}'", config.name));
    }

    match config.save_json(&storage::config_path(&state.root, &config.name)) {
        Ok(()) => data_response(json!("completed")),
        Err(e) => error_response(
            500,
            &format!("cannot write config for '{}': {}", config.name, e),
        ),
    }
}

/// `POST /has_associated_model` — body `{"data": <name>}`
pub fn handle_has_model(request: &mut Request, state: &SharedState) -> Response<Cursor<Vec<u8>>> {
    let name = match read_name_body(request) {
        Ok(name) => name,
        Err(e) => return error_response(400, &e),
    };
    if !storage::is_safe_project_name(&name) {
        return error_response(400, "invalid project name");
    }
    data_response(json!(storage::model_path(&state.root, &name).exists()))
}
