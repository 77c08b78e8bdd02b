pub mod gradcam;
pub mod predict;
