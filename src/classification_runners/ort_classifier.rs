pub mod onnx;
mod ort_engine;
mod ort_network;

pub use ort_engine::*;
pub use ort_network::*;
