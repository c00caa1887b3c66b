//! Options for building the ONNX Runtime classifier backend.

use crate::common::{InferenceDevice, ModelConfig};

#[derive(Debug, Clone)]
pub struct ConfigOrt {
    pub onnx_path: String,
    pub ort_lib_path: String,
    pub device: InferenceDevice,
    pub intra_threads: Option<usize>,
    pub profile: bool,

    // trt related
    pub trt_engine_cache_enable: bool,
    pub trt_fp16_enable: bool,

    /// Name of the optional int64 input selecting the class for gradient taps.
    pub class_input: String,
    /// Suffix marking a graph output as the gradient of an activation output.
    pub gradient_suffix: String,
}

impl Default for ConfigOrt {
    fn default() -> Self {
        Self {
            onnx_path: String::new(),
            ort_lib_path: String::new(),
            device: InferenceDevice::CPU,
            intra_threads: None,
            profile: false,

            trt_engine_cache_enable: true,
            trt_fp16_enable: false,

            class_input: "class_index".to_string(),
            gradient_suffix: "_grad".to_string(),
        }
    }
}

impl From<&ModelConfig> for ConfigOrt {
    fn from(config: &ModelConfig) -> Self {
        let ort = ConfigOrt::new()
            .with_model(&config.weights_path)
            .with_ort_lib_path(&config.ort_lib_path)
            .with_device(config.inference_device)
            .with_profile(config.profile);
        match config.intra_threads {
            Some(n) => ort.with_intra_threads(n),
            None => ort,
        }
    }
}

impl ConfigOrt {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_model(mut self, onnx_path: &str) -> Self {
        self.onnx_path = onnx_path.to_string();
        self
    }

    pub fn with_ort_lib_path(mut self, ort_lib_path: &str) -> Self {
        self.ort_lib_path = ort_lib_path.to_string();
        self
    }

    pub fn with_device(mut self, device_type: InferenceDevice) -> Self {
        self.device = device_type;
        self
    }

    pub fn with_intra_threads(mut self, n: usize) -> Self {
        self.intra_threads = Some(n);
        self
    }


    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

}
