use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};

/// Tuning knobs for one explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainerConfig {
    /// Heatmap weight in the overlay blend, in `[0, 1]`.
    pub alpha: f32,
    /// `(width, height)` the upload is resized to for inference and display.
    pub input_size: (u32, u32),
    /// JPEG quality of the stored overlay.
    pub jpeg_quality: u8,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.4,
            input_size: (224, 224),
            jpeg_quality: 95,
        }
    }
}

impl ExplainerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ExplainError::Configuration(format!("alpha {} outside [0, 1]", self.alpha)));
        }
        if self.input_size.0 == 0 || self.input_size.1 == 0 {
            return Err(ExplainError::Configuration("input size must be non-zero".into()));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ExplainError::Configuration(format!("JPEG quality {} outside 1..=100", self.jpeg_quality)));
        }
        Ok(())
    }
}

/// Deployment settings for the prediction server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// JSON model file loaded once at startup.
    pub model_path: PathBuf,
    /// Directory backing the artifact store.
    pub artifact_dir: PathBuf,
    pub bind_addr: String,
    /// Base URL used to build overlay links, without trailing slash.
    pub public_url: String,
    pub explainer: ExplainerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/fundus_cnn.json"),
            artifact_dir: PathBuf::from("gradcam"),
            bind_addr: "127.0.0.1:5000".to_string(),
            public_url: "http://127.0.0.1:5000".to_string(),
            explainer: ExplainerConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Reads `FUNDUS_*` variables from the process environment.
    pub fn from_env() -> Result<ServiceConfig> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<ServiceConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServiceConfig::default();
        if let Some(path) = lookup("FUNDUS_MODEL_PATH") {
            config.model_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("FUNDUS_ARTIFACT_DIR") {
            config.artifact_dir = PathBuf::from(dir);
        }
        if let Some(addr) = lookup("FUNDUS_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(url) = lookup("FUNDUS_PUBLIC_URL") {
            config.public_url = url.trim_end_matches('/').to_string();
        }
        if let Some(alpha) = lookup("FUNDUS_OVERLAY_ALPHA") {
            config.explainer.alpha = alpha.trim().parse().map_err(|_| {
                ExplainError::Configuration(format!("FUNDUS_OVERLAY_ALPHA is not a number: {:?}", alpha))
            })?;
        }
        config.explainer.validate()?;
        Ok(config)
    }

    /// Public link for a stored overlay.
    pub fn artifact_url(&self, artifact_id: &str) -> String {
        format!("{}/gradcam/{}", self.public_url, artifact_id)
    }
}
