use std::sync::Arc;

use fundus_cam::{Explainer, FsArtifactStore, Network, ServiceConfig};

/// Everything a request handler needs. Immutable after startup, so it is
/// shared without a lock.
pub struct AppState {
    pub explainer: Explainer<Network, FsArtifactStore>,
    pub config: ServiceConfig,
}

pub type SharedState = Arc<AppState>;
