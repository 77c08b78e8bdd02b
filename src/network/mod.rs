pub mod metadata;
pub mod network;
pub mod spec;

pub use metadata::{ModelMetadata, CLASS_NAMES};
pub use network::{ForwardTrace, Network};
pub use spec::{LayerSpec, NetworkSpec};
