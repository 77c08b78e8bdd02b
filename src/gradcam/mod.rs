//! Gradient-weighted class activation mapping.
//!
//! [`find_last_conv_layer`] chooses the feature map, [`compute_channel_weights`]
//! differentiates the target class score with respect to it, and
//! [`synthesize`] collapses the weighted channels into a normalized
//! [`Heatmap`].

pub mod engine;
pub mod heatmap;
pub mod selector;

pub use engine::{compute_channel_weights, ChannelWeights};
pub use heatmap::{synthesize, Heatmap};
pub use selector::find_last_conv_layer;
