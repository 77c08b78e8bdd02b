//! End-to-end request pipeline: decode and resize an upload, classify it,
//! explain the decision and persist the overlay.

pub mod explainer;
pub mod preprocess;

pub use explainer::{Explainer, Explanation, ExplanationSummary};
pub use preprocess::{preprocess, InputImage, Preprocessed};
