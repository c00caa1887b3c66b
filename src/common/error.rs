use thiserror::Error;

/// Failures raised anywhere between reading an image and producing the overlay.
///
/// Only the image-acquisition variants ever reach a caller of
/// [`Screener::screen`](crate::screening::Screener::screen); the others are absorbed by the
/// inference engine and the saliency chain and turned into degraded results.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("Corrupt or empty image: {0}")]
    CorruptOrEmptyImage(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Target layer not found: {0}")]
    TargetLayerNotFound(String),

    #[error("Gradient computation failed: {0}")]
    GradientComputationFailure(String),

    #[error("Layer mismatch: {0}")]
    LayerMismatch(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl Error {
    /// Errors the pipeline cannot recover from. Everything else degrades.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedImageFormat(_)
                | Error::CorruptOrEmptyImage(_)
                | Error::Io(_)
                | Error::Image(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Error::UnsupportedImageFormat(_) => "UNSUPPORTED_IMAGE_FORMAT",
            Error::CorruptOrEmptyImage(_) => "CORRUPT_OR_EMPTY_IMAGE",
            Error::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            Error::TargetLayerNotFound(_) => "TARGET_LAYER_NOT_FOUND",
            Error::GradientComputationFailure(_) => "GRADIENT_COMPUTATION_FAILURE",
            Error::LayerMismatch(_) => "LAYER_MISMATCH",
            Error::Inference(_) => "INFERENCE_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Image(_) => "IMAGE_DECODE_ERROR",
            Error::Shape(_) => "TENSOR_SHAPE_ERROR",
        }
    }
}
