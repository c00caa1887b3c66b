//! Heatmap + source -> RGB overlay.

use image::RgbImage;
use ndarray::Array2;
use rayon::prelude::*;

use crate::common::{ModelConfig, XrayImage};
use crate::pipeline::colormap::jet_lut;
use crate::pipeline::image_ops::{resize_exact, resize_map};
use crate::Result;

#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    pub size: u32,
    /// Heatmap weight; the source image gets `1 - alpha`.
    pub alpha: f32,
}

impl Default for Compositor {
    fn default() -> Self {
        Self { size: 512, alpha: 0.4 }
    }
}

impl From<&ModelConfig> for Compositor {
    fn from(config: &ModelConfig) -> Self {
        Self {
            size: config.input_size,
            alpha: config.blend_alpha.clamp(0.0, 1.0),
        }
    }
}

impl Compositor {
    /// Output is always `size` x `size`, 8-bit, channels in RGB order.
    pub fn composite(&self, heatmap: &Array2<f32>, source: &XrayImage) -> Result<RgbImage> {
        let heat = self.colorize(heatmap)?;
        let base = resize_exact(&source.image, self.size, self.size)?;

        let alpha = self.alpha;
        let mut out = base.into_raw();
        out.par_chunks_mut(3)
            .zip(heat.as_raw().par_chunks(3))
            .for_each(|(dst, h)| {
                for c in 0..3 {
                    let v = dst[c] as f32 * (1.0 - alpha) + h[c] as f32 * alpha;
                    dst[c] = v.round().clamp(0.0, 255.0) as u8;
                }
            });

        Ok(RgbImage::from_raw(self.size, self.size, out)
            .unwrap_or_else(|| RgbImage::new(self.size, self.size)))
    }

    /// Resizes a [0, 1] heatmap to the overlay size and maps it through the jet palette.
    pub fn colorize(&self, heatmap: &Array2<f32>) -> Result<RgbImage> {
        let resized = resize_map(heatmap, self.size, self.size)?;
        let lut = jet_lut();

        let pixels: Vec<u8> = resized
            .iter()
            .flat_map(|&v| {
                let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
                lut[(v * 255.0) as u8 as usize].0
            })
            .collect();

        Ok(RgbImage::from_raw(self.size, self.size, pixels)
            .unwrap_or_else(|| RgbImage::new(self.size, self.size)))
    }
}
