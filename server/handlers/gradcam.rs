use tracing::{error, warn};

use fundus_cam::{ArtifactId, ArtifactStore, StoreError};

use crate::routes::{bytes_response, json_error, not_found, HttpResponse};

// ---------------------------------------------------------------------------
// GET /gradcam/<artifact_id>
// ---------------------------------------------------------------------------

pub fn handle(raw_id: &str, store: &impl ArtifactStore) -> HttpResponse {
    let id = match ArtifactId::parse(raw_id) {
        Ok(id) => id,
        Err(_) => {
            warn!(id = raw_id, "rejected artifact identifier");
            return not_found();
        }
    };

    match store.get(&id) {
        Ok(bytes) => bytes_response(200, "image/jpeg", bytes),
        Err(StoreError::NotFound(_)) => not_found(),
        Err(e) => {
            error!(artifact = %id, error = %e, "failed to read artifact");
            json_error(500, e.to_string())
        }
    }
}
