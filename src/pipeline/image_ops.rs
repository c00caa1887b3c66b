//! Resizing helpers shared by the preprocessor and the compositor.

use fast_image_resize::{images::Image as FirImage, FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::imageops::FilterType as ImageFilter;
use image::{ImageBuffer, Luma, RgbImage};
use ndarray::Array2;

use crate::{Error, Result};

/// Stretches an RGB image to exactly `target_w` x `target_h`; aspect ratio is not kept.
pub fn resize_exact(img: &RgbImage, target_w: u32, target_h: u32) -> Result<RgbImage> {
    let (w0, h0) = img.dimensions();
    if w0 == 0 || h0 == 0 {
        return Err(Error::CorruptOrEmptyImage(format!("cannot resize a {}x{} image", w0, h0)));
    }
    if (w0, h0) == (target_w, target_h) {
        return Ok(img.clone());
    }

    let src = FirImage::from_vec_u8(w0, h0, img.as_raw().clone(), PixelType::U8x3)
        .map_err(|e| Error::CorruptOrEmptyImage(e.to_string()))?;
    let mut dst = FirImage::new(target_w, target_h, PixelType::U8x3);

    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    let mut resizer = Resizer::new();
    if let Err(err) = resizer.resize(&src, &mut dst, &options) {
        log::warn!("Failed to use `fast_image_resize` ({err}). Falling back.");
        return Ok(image::imageops::resize(img, target_w, target_h, ImageFilter::Triangle));
    }

    RgbImage::from_raw(target_w, target_h, dst.into_vec())
        .ok_or_else(|| Error::CorruptOrEmptyImage("resized buffer has unexpected size".to_string()))
}

/// Bilinear resize of a floating-point map such as a heatmap.
pub fn resize_map(map: &Array2<f32>, target_w: u32, target_h: u32) -> Result<Array2<f32>> {
    let (h0, w0) = map.dim();
    if (w0 as u32, h0 as u32) == (target_w, target_h) {
        return Ok(map.clone());
    }
    if w0 == 0 || h0 == 0 {
        return Ok(Array2::zeros((target_h as usize, target_w as usize)));
    }

    let data: Vec<f32> = map.iter().copied().collect();
    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(w0 as u32, h0 as u32, data)
        .ok_or_else(|| Error::LayerMismatch(format!("map buffer does not match {}x{}", w0, h0)))?;
    let resized = image::imageops::resize(&buffer, target_w, target_h, ImageFilter::Triangle);

    Ok(Array2::from_shape_vec(
        (target_h as usize, target_w as usize),
        resized.into_raw(),
    )?)
}
