pub mod activation;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gradcam;
pub mod layers;
pub mod math;
pub mod network;
pub mod overlay;
pub mod pipeline;
pub mod store;

// Convenience re-exports
pub use activation::ActivationFunction;
pub use classifier::{Classifier, Diagnosis, GradientTape, ImageBatch, PredictionResult};
pub use config::{ExplainerConfig, ServiceConfig};
pub use error::{ExplainError, ModelError, StoreError};
pub use gradcam::{compute_channel_weights, find_last_conv_layer, synthesize, Heatmap};
pub use network::{Network, NetworkSpec, CLASS_NAMES};
pub use pipeline::{Explainer, Explanation, InputImage};
pub use store::{ArtifactId, ArtifactStore, FsArtifactStore, MemoryArtifactStore};
