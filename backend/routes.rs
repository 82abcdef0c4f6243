use std::io::Cursor;

use serde_json::{json, Value};
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::handlers;
use crate::SharedState;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Success envelope: `{"data": ...}` with status 200.
pub fn data_response(data: Value) -> Response<Cursor<Vec<u8>>> {
    json_response(StatusCode(200), json!({ "data": data }))
}

/// Failure envelope: `{"error": ...}` with the given status.
pub fn error_response(status: u16, message: &str) -> Response<Cursor<Vec<u8>>> {
    json_response(StatusCode(status), json!({ "error": message }))
}

fn json_response(status: StatusCode, body: Value) -> Response<Cursor<Vec<u8>>> {
    let bytes = body.to_string().into_bytes();
    let len = bytes.len();
    Response::new(
        status,
        vec![Header::from_bytes(b"Content-Type", b"application/json").unwrap()],
        Cursor::new(bytes),
        Some(len),
        None,
    )
}

pub fn not_found() -> Response<Cursor<Vec<u8>>> {
    error_response(404, "no such route")
}

/// Reads the request body and parses it as JSON.
pub fn read_json_body(request: &mut Request) -> Result<Value, String> {
    let mut body = String::new();
    if let Err(e) = request.as_reader().read_to_string(&mut body) {
        return Err(format!("unreadable request body: {}", e));
    }
    serde_json::from_str(&body).map_err(|e| format!("malformed JSON body: {}", e))
}

/// Pulls the `data` field out of a request envelope.
pub fn envelope_data(body: &Value) -> Result<&Value, String> {
    body.get("data")
        .ok_or_else(|| "request body has no 'data' field".to_string())
}

/// Reads an envelope whose `data` field is a bare project name.
pub fn read_name_body(request: &mut Request) -> Result<String, String> {
    let body = read_json_body(request)?;
    let data = envelope_data(&body)?;
    match data.as_str() {
        Some(name) => Ok(name.to_string()),
        None => Err("'data' must be a project name".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Dispatches incoming requests to the appropriate handler.
///
/// Handlers receive a `&mut Request` so the dispatcher retains ownership
/// and answers with `request.respond(response)` at the end.
pub fn dispatch(mut request: Request, state: SharedState) {
    let method = request.method().clone();
    let url = request.url().to_owned();

    let path = match url.find('?') {
        Some(pos) => url[..pos].to_owned(),
        None => url,
    };

    let response = match (method, path.as_str()) {
        (Method::Get, "/get_projects") => handlers::projects::handle_list(&state),

        (Method::Post, "/new_project") => handlers::projects::handle_new(&mut request, &state),
        (Method::Post, "/delete_project") => handlers::projects::handle_delete(&mut request, &state),
        (Method::Post, "/get_project_config") => {
            handlers::projects::handle_get_config(&mut request, &state)
        }
        (Method::Post, "/set_project_config") => {
            handlers::projects::handle_set_config(&mut request, &state)
        }
        (Method::Post, "/has_associated_model") => {
            handlers::projects::handle_has_model(&mut request, &state)
        }

        (Method::Post, "/train_project") => handlers::train::handle(&mut request, &state),
        (Method::Post, "/predict") => handlers::predict::handle(&mut request, &state),

        _ => not_found(),
    };

    if let Err(e) = request.respond(response) {
        log::warn!("failed to send response: {}", e);
    }
}
