use serde::Serialize;

use crate::error::{ExplainError, Result};
use crate::math::argmax;

/// Outcome of one inference call. Fields are read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    predicted_class_index: usize,
    predicted_label: String,
    confidence: f32,
    raw_scores: Vec<f32>,
}

/// The two fields handed to the conversational explainer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub predicted_label: String,
    pub confidence: f32,
}

impl PredictionResult {
    /// Picks the arg-max class; confidence is that class's score.
    pub fn from_scores(raw_scores: Vec<f32>, labels: &[String]) -> Result<PredictionResult> {
        if raw_scores.len() != labels.len() {
            return Err(ExplainError::Configuration(format!(
                "model produced {} scores for {} labels",
                raw_scores.len(),
                labels.len()
            )));
        }
        let predicted_class_index = argmax(&raw_scores)
            .ok_or_else(|| ExplainError::Configuration("model produced no scores".into()))?;
        Ok(PredictionResult {
            predicted_class_index,
            predicted_label: labels[predicted_class_index].clone(),
            confidence: raw_scores[predicted_class_index],
            raw_scores,
        })
    }

    pub fn predicted_class_index(&self) -> usize {
        self.predicted_class_index
    }

    pub fn predicted_label(&self) -> &str {
        &self.predicted_label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn raw_scores(&self) -> &[f32] {
        &self.raw_scores
    }

    /// Confidence as a percentage rounded to two decimals.
    pub fn confidence_percent(&self) -> f64 {
        (self.confidence as f64 * 10_000.0).round() / 100.0
    }

    pub fn diagnosis(&self) -> Diagnosis {
        Diagnosis {
            predicted_label: self.predicted_label.clone(),
            confidence: self.confidence,
        }
    }
}
