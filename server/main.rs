/// fundus-server
///
/// JSON API over the Grad-CAM pipeline, served by a synchronous tiny_http
/// server with one thread per request.
///
/// Run with:
///   cargo run --bin fundus-server --release
///
/// Routes:
///   GET  /                  health message
///   POST /predict           multipart `image` (+ optional `target_class`)
///   GET  /gradcam/<id>      stored overlay JPEG
///
/// Settings come from `FUNDUS_*` environment variables; see
/// `ServiceConfig::from_env`.

mod handlers;
mod routes;
mod state;
mod util;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tiny_http::Server;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fundus_cam::{Explainer, FsArtifactStore, Network, ServiceConfig};

use state::AppState;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "fundus_cam=info,fundus_server=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;

    let network = Network::load_json(&config.model_path)
        .with_context(|| format!("failed to load model from {}", config.model_path.display()))?;
    let store = FsArtifactStore::new(&config.artifact_dir)
        .with_context(|| format!("failed to open artifact directory {}", config.artifact_dir.display()))?;
    let explainer = Explainer::new(Arc::new(network), store, config.explainer.clone())
        .context("model does not fit the configured pipeline")?;

    let server = Server::http(&config.bind_addr)
        .map_err(|e| anyhow!("failed to bind {}: {}", config.bind_addr, e))?;
    info!(addr = %config.bind_addr, public_url = %config.public_url, "fundus-server listening");

    let shared_state = Arc::new(AppState { explainer, config });

    for request in server.incoming_requests() {
        let state_clone = shared_state.clone();
        std::thread::spawn(move || {
            routes::dispatch(request, state_clone);
        });
    }
    Ok(())
}
