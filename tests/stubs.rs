#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{GrayImage, Luma, RgbImage};
use ndarray::{Array, Array3};
use parking_lot::Mutex;
use rand::Rng;

use pneumo_detect::classification_runners::{GradientCapture, InferenceEngine, LayerInfo, LayerKind, Network};
use pneumo_detect::common::{InputTensor, ModelConfig, XrayImage};
use pneumo_detect::{Error, Result};

/// Spatial side of every stub activation.
pub const MAP_SIDE: usize = 8;

pub type CallLog = Arc<Mutex<Vec<String>>>;

/// In-memory classifier with fixed outputs.
///
/// Every 4-D layer produces `(x - 3.5) * (c + 1)` at column `x`, channel `c`: negative on the
/// left half and positive on the right, independent of the input.
pub struct StubNetwork {
    pub layers: Vec<LayerInfo>,
    pub probabilities: Vec<f32>,
    pub with_gradients: bool,
    pub fail_predict: bool,
    pub calls: CallLog,
}

impl StubNetwork {
    pub fn new(probabilities: &[f32]) -> Self {
        Self {
            layers: default_layers(),
            probabilities: probabilities.to_vec(),
            with_gradients: true,
            fail_predict: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_layers(mut self, layers: Vec<LayerInfo>) -> Self {
        self.layers = layers;
        self
    }

    pub fn without_gradients(mut self) -> Self {
        self.with_gradients = false;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_predict = true;
        self
    }

    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }

    fn layer_map(&self, layer: &str) -> Result<Array3<f32>> {
        let info = match self.layer(layer) {
            Some(info) => info,
            None => return Err(Error::TargetLayerNotFound(layer.to_string())),
        };
        match (info.output_rank, info.channels) {
            (Some(4), Some(c)) => Ok(Array::from_shape_fn((MAP_SIDE, MAP_SIDE, c), |(_, x, ch)| {
                (x as f32 - 3.5) * (ch as f32 + 1.0)
            })),
            _ => Err(Error::LayerMismatch(format!("layer `{layer}` is not spatial"))),
        }
    }
}

impl Network for StubNetwork {
    fn layers(&self) -> &[LayerInfo] {
        &self.layers
    }

    fn predict(&self, _input: &InputTensor) -> Result<Vec<f32>> {
        self.calls.lock().push("predict".to_string());
        if self.fail_predict {
            return Err(Error::Inference("stub failure".to_string()));
        }
        Ok(self.probabilities.clone())
    }

    fn activation(&self, _input: &InputTensor, layer: &str) -> Result<Array3<f32>> {
        self.calls.lock().push(format!("activation:{layer}"));
        self.layer_map(layer)
    }

    fn capture(&self, _input: &InputTensor, layer: &str, class_index: usize) -> Result<GradientCapture> {
        self.calls.lock().push(format!("capture:{layer}:{class_index}"));
        let activation = self.layer_map(layer)?;
        let gradient = self.with_gradients.then(|| Array3::ones(activation.dim()));
        Ok(GradientCapture {
            activation,
            probabilities: self.probabilities.clone(),
            gradient,
        })
    }
}

pub fn default_layers() -> Vec<LayerInfo> {
    vec![
        LayerInfo::new("block1_conv", LayerKind::Convolution).with_output(4, 8),
        LayerInfo::new("conv10_thisone", LayerKind::Convolution).with_output(4, 16),
        LayerInfo::new("flatten", LayerKind::Other).with_output(2, 1024),
        LayerInfo::new("dense", LayerKind::Other).with_output(2, 3),
    ]
}

pub fn engine_with(network: StubNetwork) -> InferenceEngine {
    InferenceEngine::with_network(ModelConfig::default(), Box::new(network))
}

/// Engine whose loader always fails, counting how often it is asked.
pub fn missing_model_engine(attempts: Arc<AtomicUsize>) -> InferenceEngine {
    InferenceEngine::with_loader(
        ModelConfig::default(),
        Box::new(move |config: &ModelConfig| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::ModelUnavailable(format!("{} not found", config.weights_path)))
        }),
    )
}

pub fn gray_image(width: u32, height: u32, value: u8) -> XrayImage {
    XrayImage::from(GrayImage::from_pixel(width, height, Luma([value])))
}

pub fn random_image(width: u32, height: u32) -> XrayImage {
    let mut rng = rand::thread_rng();
    let img = RgbImage::from_fn(width, height, |_, _| image::Rgb([rng.gen(), rng.gen(), rng.gen()]));
    XrayImage::from(img)
}

pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("pneumo_detect_{}_{}", std::process::id(), name))
}
