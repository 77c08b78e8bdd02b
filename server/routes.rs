use std::io::Cursor;

use serde_json::{json, Value};
use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::debug;

use crate::handlers;
use crate::state::SharedState;

pub type HttpResponse = Response<Cursor<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

fn headers(content_type: Option<&str>) -> Vec<Header> {
    content_type
        .map(|ct| ("Content-Type", ct))
        .into_iter()
        .chain(CORS_HEADERS)
        .filter_map(|(name, value)| Header::from_bytes(name.as_bytes(), value.as_bytes()).ok())
        .collect()
}

pub fn bytes_response(status: u16, content_type: &str, body: Vec<u8>) -> HttpResponse {
    let len = body.len();
    Response::new(StatusCode(status), headers(Some(content_type)), Cursor::new(body), Some(len), None)
}

pub fn json_response(status: u16, body: &Value) -> HttpResponse {
    bytes_response(status, "application/json", body.to_string().into_bytes())
}

pub fn json_error(status: u16, message: impl Into<String>) -> HttpResponse {
    json_response(status, &json!({ "error": message.into() }))
}

pub fn no_content() -> HttpResponse {
    Response::new(StatusCode(204), headers(None), Cursor::new(Vec::new()), Some(0), None)
}

pub fn not_found() -> HttpResponse {
    json_error(404, "Not Found")
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

pub fn dispatch(mut request: Request, state: SharedState) {
    let method = request.method().clone();
    let url = request.url().to_owned();
    let path = url.split('?').next().unwrap_or("").to_owned();
    debug!(%method, path = %path, "request");

    let response = match (&method, path.as_str()) {
        (Method::Options, _) => no_content(),
        (Method::Get, "/") => json_response(200, &json!({ "message": "Backend Running - Eye Disease Detection API" })),
        (Method::Post, "/predict") => handlers::predict::handle(&mut request, &state),
        (Method::Get, p) if p.starts_with("/gradcam/") => {
            handlers::gradcam::handle(&p["/gradcam/".len()..], state.explainer.store())
        }
        _ => not_found(),
    };

    if let Err(e) = request.respond(response) {
        debug!(error = %e, path = %path, "failed to send response");
    }
}
