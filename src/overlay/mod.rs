pub mod colormap;
pub mod compositor;

pub use colormap::jet;
pub use compositor::{blend, colorize, composite, encode_jpeg, render_overlay};
