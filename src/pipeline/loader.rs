//! Reads raster files and medical-imaging slices into [`XrayImage`]s.

use std::path::Path;

use dicom_pixeldata::PixelDecoder;
use image::{DynamicImage, GrayImage, ImageReader};
use std::io::Cursor;

use crate::common::{Modality, XrayImage};
use crate::{Error, Result};

const DICOM_PREAMBLE_LEN: usize = 128;
const DICOM_MAGIC: &[u8; 4] = b"DICM";
const DICOM_EXTENSIONS: [&str; 2] = ["dcm", "dicom"];

pub struct ImageLoader;

impl ImageLoader {
    /// Loads a file, picking the decoder from the extension and, failing that, the content.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<XrayImage> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;

        let by_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| DICOM_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);

        if by_extension || Self::is_dicom(&bytes) {
            log::debug!("Reading {} as a medical-imaging slice", path.display());
            Self::dicom_from_bytes(&bytes)
        } else {
            Self::raster_from_bytes(&bytes)
        }
    }

    /// Loads an in-memory file of either modality.
    pub fn from_bytes(bytes: &[u8]) -> Result<XrayImage> {
        if Self::is_dicom(bytes) {
            Self::dicom_from_bytes(bytes)
        } else {
            Self::raster_from_bytes(bytes)
        }
    }

    /// `DICM` magic after the 128-byte preamble.
    pub fn is_dicom(bytes: &[u8]) -> bool {
        bytes.len() >= DICOM_PREAMBLE_LEN + DICOM_MAGIC.len()
            && &bytes[DICOM_PREAMBLE_LEN..DICOM_PREAMBLE_LEN + DICOM_MAGIC.len()] == DICOM_MAGIC
    }

    fn raster_from_bytes(bytes: &[u8]) -> Result<XrayImage> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| Error::UnsupportedImageFormat(e.to_string()))?;

        if reader.format().is_none() {
            return Err(Error::UnsupportedImageFormat(
                "unrecognised raster signature".to_string(),
            ));
        }

        let decoded = reader
            .decode()
            .map_err(|e| Error::UnsupportedImageFormat(e.to_string()))?;
        Self::from_dynamic(decoded)
    }

    /// Wraps an already decoded raster, normalising it to 8-bit RGB.
    pub fn from_dynamic(image: DynamicImage) -> Result<XrayImage> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::UnsupportedImageFormat("decoding yielded no pixels".to_string()));
        }
        if let DynamicImage::ImageRgb32F(ref buf) = image {
            if buf.iter().any(|v| !v.is_finite()) {
                return Err(Error::CorruptOrEmptyImage("non-finite pixel values".to_string()));
            }
        }
        if let DynamicImage::ImageRgba32F(ref buf) = image {
            if buf.iter().any(|v| !v.is_finite()) {
                return Err(Error::CorruptOrEmptyImage("non-finite pixel values".to_string()));
            }
        }

        let rgb = image.to_rgb8();
        Ok(XrayImage::new(rgb, image, Modality::Standard))
    }

    fn dicom_from_bytes(bytes: &[u8]) -> Result<XrayImage> {
        // The object reader starts at the magic code, after the preamble.
        let body = if Self::is_dicom(bytes) { &bytes[DICOM_PREAMBLE_LEN..] } else { bytes };

        let object = dicom_object::from_reader(body)
            .map_err(|e| Error::UnsupportedImageFormat(format!("DICOM: {}", e)))?;
        let pixel_data = object
            .decode_pixel_data()
            .map_err(|e| Error::UnsupportedImageFormat(format!("DICOM pixel data: {}", e)))?;

        let rows = pixel_data.rows() as usize;
        let columns = pixel_data.columns() as usize;
        let samples = pixel_data.samples_per_pixel() as usize;
        let values: Vec<f32> = pixel_data
            .to_vec_frame::<f32>(0)
            .map_err(|e| Error::CorruptOrEmptyImage(format!("DICOM pixel conversion: {}", e)))?;

        let gray = Self::rescale_slice(&values, columns, rows, samples)?;
        let rgb = DynamicImage::ImageLuma8(gray).to_rgb8();
        let display = DynamicImage::ImageRgb8(rgb.clone());

        Ok(XrayImage::new(rgb, display, Modality::MedicalVolume))
    }

    /// Clips negatives, then stretches linearly so the slice maximum maps to 255.
    /// Multi-sample pixels are reduced to their first sample.
    pub fn rescale_slice(values: &[f32], width: usize, height: usize, samples: usize) -> Result<GrayImage> {
        let samples = samples.max(1);
        let count = width * height;
        if count == 0 {
            return Err(Error::CorruptOrEmptyImage(format!("{}x{} pixel array", width, height)));
        }
        if values.len() < count * samples {
            return Err(Error::CorruptOrEmptyImage(format!(
                "pixel array holds {} values, expected {}",
                values.len(),
                count * samples
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::CorruptOrEmptyImage("non-finite pixel values".to_string()));
        }

        let plane: Vec<f32> = values
            .iter()
            .step_by(samples)
            .take(count)
            .map(|v| v.max(0.0))
            .collect();
        let max = plane.iter().copied().fold(0.0f32, f32::max);

        let pixels: Vec<u8> = if max > 0.0 {
            plane.iter().map(|v| (v / max * 255.0) as u8).collect()
        } else {
            vec![0; count]
        };

        GrayImage::from_raw(width as u32, height as u32, pixels)
            .ok_or_else(|| Error::CorruptOrEmptyImage("pixel buffer size mismatch".to_string()))
    }
}
