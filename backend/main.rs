/// trellis-nn backend
///
/// A JSON API over project storage, training and prediction, served by a
/// synchronous tiny_http server with one thread per request.
///
/// Run with:
///   cargo run --bin backend
///
/// Routes:
///   GET  /get_projects          list project names
///   POST /new_project           create a project with a default config
///   POST /delete_project        remove a project directory
///   POST /get_project_config    read the stored config
///   POST /set_project_config    validate and store a config
///   POST /train_project         train synchronously, save the artifact
///   POST /predict               run one sample through the saved model
///   POST /has_associated_model  whether a trained artifact exists

mod handlers;
mod routes;
mod storage;

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tiny_http::Server;
use trellis_nn::HashingTextEncoder;

const DEFAULT_ADDR: &str = "127.0.0.1:5000";

/// State shared by every request handler.
pub struct AppState {
    /// Application storage root; project directories live beneath it.
    pub root: PathBuf,
    /// Process-wide text encoder, so identical text always embeds identically.
    pub encoder: HashingTextEncoder,
    /// One lock per project; training and prediction serialize on it.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(root: PathBuf) -> AppState {
        AppState {
            root,
            encoder: HashingTextEncoder::default(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the named project's lock, creating it on first use.
    pub fn project_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(name.to_string()).or_default().clone()
    }
}

/// Shared state type passed to every handler.
pub type SharedState = Arc<AppState>;

fn main() {
    env_logger::init();

    let root = storage::data_root();
    std::fs::create_dir_all(storage::project_files_dir(&root))
        .expect("Failed to create the application storage root");

    let addr = env::var("TRELLIS_NN_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let server = Server::http(addr.as_str()).expect("Failed to bind HTTP server");

    println!("trellis-nn backend listening on http://{}", addr);
    println!("storage root: {}", root.display());

    let state: SharedState = Arc::new(AppState::new(root));

    // Each request runs on its own thread so a long synchronous training
    // run does not stall project CRUD or predictions on other projects.
    for request in server.incoming_requests() {
        let state = state.clone();
        std::thread::spawn(move || {
            routes::dispatch(request, state);
        });
    }
}
