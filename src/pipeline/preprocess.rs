//! Canonical image -> classifier input tensor.

use image::{GrayImage, RgbImage};
use ndarray::Array;

use crate::common::{InputTensor, ModelConfig, XrayImage};
use crate::pipeline::clahe::Clahe;
use crate::pipeline::image_ops::resize_exact;
use crate::Result;

/// Deterministic transform into the `[1, size, size, 1]` tensor the classifier expects.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    pub size: u32,
    pub clahe: Clahe,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            size: 512,
            clahe: Clahe::default(),
        }
    }
}

impl From<&ModelConfig> for Preprocessor {
    fn from(config: &ModelConfig) -> Self {
        Self {
            size: config.input_size,
            clahe: Clahe::new(config.clahe_clip_limit, config.clahe_tile_grid),
        }
    }
}

impl Preprocessor {
    /// Resize (stretching non-square inputs), grayscale, CLAHE, scale to [0, 1], add axes.
    pub fn preprocess(&self, image: &XrayImage) -> Result<InputTensor> {
        self.preprocess_rgb(&image.image)
    }

    pub fn preprocess_rgb(&self, image: &RgbImage) -> Result<InputTensor> {
        let resized = resize_exact(image, self.size, self.size)?;
        let gray = to_gray(&resized);
        let equalized = self.clahe.apply(&gray);

        let side = self.size as usize;
        let values: Vec<f32> = equalized.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        let tensor = Array::from_shape_vec((1, side, side, 1), values)?;

        Ok(InputTensor::from(tensor))
    }
}

/// ITU-R BT.601 luma, rounded to nearest.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let pixels = image
        .as_raw()
        .chunks_exact(3)
        .map(|c| (0.299 * c[0] as f32 + 0.587 * c[1] as f32 + 0.114 * c[2] as f32).round() as u8)
        .collect();
    GrayImage::from_raw(width, height, pixels).unwrap_or_else(|| GrayImage::new(width, height))
}
