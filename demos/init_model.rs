/// Writes a randomly initialised fundus classifier to
/// `models/fundus_cnn.json` (or the path given as the first argument) and
/// explains one synthetic image with it, so `fundus-server` has a model to
/// load.
///
/// Run with:
///   cargo run --example init_model --release -- models/fundus_cnn.json
use std::sync::Arc;

use fundus_cam::{Explainer, ExplainerConfig, InputImage, MemoryArtifactStore, Network, NetworkSpec};
use ndarray::Array3;

fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "models/fundus_cnn.json".to_string());
    if let Some(parent) = std::path::Path::new(&path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let network = Network::from_spec(&NetworkSpec::fundus_default(), 42)?;
    network.save_json(&path)?;
    println!("Saved '{}' ({} layers) to {}", network.name, network.layers.len(), path);

    let explainer = Explainer::new(Arc::new(network), MemoryArtifactStore::default(), ExplainerConfig::default())?;
    let image = Array3::from_shape_fn((224, 224, 3), |(y, x, c)| ((x + 2 * y + 60 * c) % 256) as u8);
    let out = explainer.explain(&InputImage::Pixels(image), None)?;
    println!(
        "Sample: {} ({:.2}%), heatmap {:?}, overlay {}",
        out.prediction.predicted_label(),
        out.prediction.confidence_percent(),
        out.heatmap.dim(),
        out.artifact_id
    );
    Ok(())
}
