use image::{DynamicImage, GrayImage, RgbImage};

/// Where the pixels came from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    /// Consumer raster formats (PNG, JPEG, BMP, TIFF, ...).
    #[default]
    Standard,
    /// A medical-imaging slice whose intensities were rescaled to 8 bits on load.
    MedicalVolume,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Standard => "standard",
            Modality::MedicalVolume => "medical-volume",
        }
    }
}

/// A source radiograph as produced by the loader.
///
/// `image` is the canonical 8-bit, 3-channel array the rest of the pipeline consumes;
/// `display` keeps the full-resolution picture for previews.
#[derive(Debug, Clone)]
pub struct XrayImage {
    pub image: RgbImage,
    pub display: DynamicImage,
    pub modality: Modality,
    pub img_width: u32,
    pub img_height: u32,
}

impl std::ops::Deref for XrayImage {
    type Target = RgbImage;

    fn deref(&self) -> &Self::Target {
        &self.image
    }
}

impl From<DynamicImage> for XrayImage {
    fn from(image: DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        Self::new(rgb, image, Modality::Standard)
    }
}

impl From<GrayImage> for XrayImage {
    fn from(image: GrayImage) -> Self {
        DynamicImage::from(image).into()
    }
}

impl From<RgbImage> for XrayImage {
    fn from(image: RgbImage) -> Self {
        let display = DynamicImage::from(image.clone());
        Self::new(image, display, Modality::Standard)
    }
}

impl XrayImage {
    pub fn new(image: RgbImage, display: DynamicImage, modality: Modality) -> Self {
        let (img_width, img_height) = image.dimensions();
        Self {
            image,
            display,
            modality,
            img_width,
            img_height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.img_width == 0 || self.img_height == 0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn display(&self) -> &DynamicImage {
        &self.display
    }
}
