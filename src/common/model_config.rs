use crate::common::inference_device::InferenceDevice;

pub const DEFAULT_WEIGHTS_FILE: &str = "conv_MLP_84.onnx";
pub const DEFAULT_TARGET_LAYER: &str = "conv10_thisone";

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub weights_path: String,
    /// Empty means "let ONNX Runtime find its shared library".
    pub ort_lib_path: String,
    pub inference_device: InferenceDevice,
    /// Convolutional layer explained by Grad-CAM when present.
    pub target_layer: String,
    /// Side of the square classifier input and of the overlay.
    pub input_size: u32,
    pub clahe_clip_limit: f32,
    pub clahe_tile_grid: u32,
    /// Heatmap weight in the overlay blend; the source gets `1 - blend_alpha`.
    pub blend_alpha: f32,
    /// How many leading layers the activation fallback searches.
    pub activation_search_depth: usize,
    /// Distance in pixels over which the synthetic heatmap decays by `1/e`.
    pub synthetic_decay: f32,
    /// ONNX Runtime intra-op threads; `None` keeps the runtime default.
    pub intra_threads: Option<usize>,
    pub profile: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights_path: DEFAULT_WEIGHTS_FILE.to_string(),
            ort_lib_path: String::new(),
            inference_device: InferenceDevice::CPU,
            target_layer: DEFAULT_TARGET_LAYER.to_string(),
            input_size: 512,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 4,
            blend_alpha: 0.4,
            activation_search_depth: 40,
            synthetic_decay: 100.0,
            intra_threads: None,
            profile: false,
        }
    }
}

impl ModelConfig {
    pub fn new(weights_path: String, ort_lib_path: String, inference_device: InferenceDevice) -> Self {
        Self {
            weights_path,
            ort_lib_path,
            inference_device,
            ..Default::default()
        }
    }

    pub fn with_blend_alpha(mut self, alpha: f32) -> Self {
        self.blend_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn with_target_layer(mut self, name: &str) -> Self {
        self.target_layer = name.to_string();
        self
    }
}

impl std::fmt::Display for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Weights File Path: {}\n\
        OnnxRuntime Lib Path: {}\n\
        Inference Device: {}\n\
        Target Layer: {}\n\
        Model Input Resolution: {}x{}\n\
        CLAHE: clip {} / {}x{} tiles\n\
        Blend Alpha: {}",
               self.weights_path, self.ort_lib_path, self.inference_device,
               self.target_layer, self.input_size, self.input_size,
               self.clahe_clip_limit, self.clahe_tile_grid, self.clahe_tile_grid,
               self.blend_alpha)
    }
}
