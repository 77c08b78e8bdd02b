use serde::{Deserialize, Serialize};

/// Label set of the fundus classifier, in output-index order.
pub const CLASS_NAMES: [&str; 2] = ["Normal", "Diseased"];

/// Optional annotations attached to a saved Network.
/// All fields are Option<> so bare model files deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    pub description: Option<String>,
    /// Human-readable class labels for the output layer.
    pub output_labels: Option<Vec<String>>,
}

impl ModelMetadata {
    /// Declared labels, or the fundus label set when none are declared.
    pub fn labels(&self) -> Vec<String> {
        match &self.output_labels {
            Some(labels) => labels.clone(),
            None => CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
