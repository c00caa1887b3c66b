pub mod clahe;
pub mod colormap;
mod compositor;
pub mod image_ops;
mod loader;
mod preprocess;
pub mod saliency;

pub use clahe::Clahe;
pub use compositor::Compositor;
pub use loader::ImageLoader;
pub use preprocess::{to_gray, Preprocessor};
pub use saliency::{ExactName, LastConvolution, Saliency, SaliencyMapper, SaliencyTier, TargetLayerResolver};
