use std::io::Read;

use serde_json::{json, Value};
use tiny_http::Request;
use tracing::{error, warn};

use fundus_cam::pipeline::Explanation;
use fundus_cam::{InputImage, ServiceConfig};

use crate::routes::{json_error, json_response, HttpResponse};
use crate::state::SharedState;
use crate::util::multipart::{extract_boundary, file_field, parse_parts, text_field};

/// Largest request body accepted by `/predict`.
pub const MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// A request turned away before it reaches the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub status: u16,
    pub message: String,
}

impl Rejection {
    fn bad_request(message: impl Into<String>) -> Rejection {
        Rejection { status: 400, message: message.into() }
    }
}

/// Fields of a `/predict` form.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub image: Vec<u8>,
    pub target_class: Option<usize>,
}

/// Reads at most `limit` bytes; anything longer is rejected with 413.
pub fn read_body(reader: impl Read, limit: u64) -> Result<Vec<u8>, Rejection> {
    let mut body = Vec::new();
    reader.take(limit + 1).read_to_end(&mut body).map_err(|e| {
        warn!(error = %e, "failed to read request body");
        Rejection::bad_request("Could not read request body")
    })?;
    if body.len() as u64 > limit {
        return Err(Rejection { status: 413, message: format!("Upload exceeds {} bytes", limit) });
    }
    Ok(body)
}

/// Extracts the `image` file and optional `target_class` from a multipart
/// body.
pub fn parse_upload(content_type: &str, body: &[u8]) -> Result<Upload, Rejection> {
    let boundary = content_type
        .starts_with("multipart/form-data")
        .then(|| extract_boundary(content_type))
        .flatten()
        .ok_or_else(|| Rejection::bad_request("No image uploaded"))?;

    let parts = parse_parts(body, &boundary);
    let image = match file_field(&parts, "image") {
        Some(bytes) if !bytes.is_empty() => bytes.to_vec(),
        _ => return Err(Rejection::bad_request("No image uploaded")),
    };

    let target_class = match text_field(&parts, "target_class").map(|s| s.trim().to_owned()) {
        None => None,
        Some(s) if s.is_empty() => None,
        Some(s) => Some(
            s.parse::<usize>()
                .map_err(|_| Rejection::bad_request(format!("target_class must be a class index, got {:?}", s)))?,
        ),
    };

    Ok(Upload { image, target_class })
}

/// Success body: label, percent confidence, overlay link and the raw score
/// batch.
pub fn prediction_body(explanation: &Explanation, config: &ServiceConfig) -> Value {
    let prediction = &explanation.prediction;
    json!({
        "diagnosis": prediction.predicted_label(),
        "confidence": prediction.confidence_percent(),
        "gradcam_url": config.artifact_url(explanation.artifact_id.as_str()),
        "raw_prediction": [prediction.raw_scores()],
    })
}

// ---------------------------------------------------------------------------
// POST /predict
// ---------------------------------------------------------------------------

pub fn handle(request: &mut Request, state: &SharedState) -> HttpResponse {
    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_owned())
        .unwrap_or_default();

    if request.body_length().map_or(false, |len| len as u64 > MAX_UPLOAD_BYTES) {
        return json_error(413, format!("Upload exceeds {} bytes", MAX_UPLOAD_BYTES));
    }

    let upload = match read_body(request.as_reader(), MAX_UPLOAD_BYTES)
        .and_then(|body| parse_upload(&content_type, &body))
    {
        Ok(upload) => upload,
        Err(rejection) => return json_error(rejection.status, rejection.message),
    };

    match state.explainer.explain(&InputImage::Encoded(upload.image), upload.target_class) {
        Ok(explanation) => json_response(200, &prediction_body(&explanation, &state.config)),
        Err(e) if e.is_client_error() => json_error(400, e.to_string()),
        Err(e) => {
            error!(error = %e, "Grad-CAM generation failed");
            json_error(500, e.to_string())
        }
    }
}
