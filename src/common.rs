mod diagnosis;
mod error;
mod inference_device;
mod input_tensor;
mod model_config;
mod xray_image;

pub use diagnosis::*;
pub use error::Error;
pub use inference_device::*;
pub use input_tensor::InputTensor;
pub use model_config::*;
pub use xray_image::*;
