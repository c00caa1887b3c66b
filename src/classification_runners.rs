pub mod engine;
pub mod inference_process;
pub mod network;
pub mod ort_classifier;

pub use engine::*;
pub use network::*;
