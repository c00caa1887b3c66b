//! Image in, diagnosis and explanation overlay out.

use std::path::Path;
use std::time::{Duration, Instant};

use image::RgbImage;
use serde::Serialize;

use crate::classification_runners::InferenceEngine;
use crate::common::{Inference, ModelConfig, XrayImage};
use crate::pipeline::{Compositor, ImageLoader, Preprocessor, SaliencyMapper, SaliencyTier};
use crate::{utils, Error, Result};

/// Label reported when no classification could be made.
pub const UNAVAILABLE_LABEL: &str = "unavailable";

pub struct Screener {
    engine: InferenceEngine,
    preprocessor: Preprocessor,
    mapper: SaliencyMapper,
    compositor: Compositor,
}

impl Screener {
    /// ONNX Runtime backed screener. The model is loaded on the first screening.
    pub fn new(config: ModelConfig) -> Self {
        Self::with_engine(InferenceEngine::new(config))
    }

    /// Builds the remaining stages from the engine's configuration.
    pub fn with_engine(engine: InferenceEngine) -> Self {
        let config = engine.config();
        Self {
            preprocessor: Preprocessor::from(config),
            mapper: SaliencyMapper::from(config),
            compositor: Compositor::from(config),
            engine,
        }
    }

    pub fn with_mapper(mut self, mapper: SaliencyMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Only an empty image is an error; every model-side failure degrades.
    pub fn screen(&self, image: &XrayImage) -> Result<ScreeningReport> {
        if image.is_empty() {
            return Err(Error::CorruptOrEmptyImage("image has no pixels".to_string()));
        }

        let start = Instant::now();
        let mut elapsed = Duration::ZERO;

        let tensor = self.preprocessor.preprocess(image)?;
        elapsed = utils::trace("SCREEN", "Preprocess", start, elapsed);

        let inference = self.engine.classify(&tensor);
        elapsed = utils::trace("SCREEN", "Classify", start, elapsed);

        // A degraded result has no class to explain.
        let saliency = match inference.class_index() {
            Some(class_index) => self.mapper.explain(self.engine.network(), &tensor, class_index),
            None => self.mapper.explain(None, &tensor, 0),
        };
        elapsed = utils::trace("SCREEN", "Explain", start, elapsed);

        let overlay = self.compositor.composite(&saliency.heatmap, image)?;
        utils::trace("SCREEN", "Composite", start, elapsed);

        log::debug!(
            "Screened {}x{} {} image in {:?}: {} via {}",
            image.width(),
            image.height(),
            image.modality().as_str(),
            start.elapsed(),
            inference.classification().map(|c| c.label.as_str()).unwrap_or(UNAVAILABLE_LABEL),
            saliency.tier,
        );

        Ok(ScreeningReport {
            inference,
            overlay,
            tier: saliency.tier,
        })
    }

    pub fn screen_path<P: AsRef<Path>>(&self, path: P) -> Result<ScreeningReport> {
        self.screen(&ImageLoader::from_path(path)?)
    }

    pub fn screen_bytes(&self, bytes: &[u8]) -> Result<ScreeningReport> {
        self.screen(&ImageLoader::from_bytes(bytes)?)
    }
}

#[derive(Debug, Clone)]
pub struct ScreeningReport {
    pub inference: Inference,
    /// Square RGB overlay of the input size.
    pub overlay: RgbImage,
    /// Which saliency tier produced the overlay.
    pub tier: SaliencyTier,
}

impl ScreeningReport {
    pub fn label(&self) -> &'static str {
        match &self.inference {
            Inference::Classified(c) => c.label.as_str(),
            Inference::Degraded { .. } => UNAVAILABLE_LABEL,
        }
    }

    /// Percent in `(0, 100]`, or `0.0` when degraded.
    pub fn confidence(&self) -> f32 {
        self.inference.classification().map_or(0.0, |c| c.confidence)
    }

    pub fn is_degraded(&self) -> bool {
        self.inference.is_degraded()
    }

    pub fn summary(&self) -> ScreeningSummary {
        ScreeningSummary {
            label: self.label(),
            confidence: self.confidence(),
            tier: self.tier,
            probabilities: self
                .inference
                .classification()
                .map(|c| c.probabilities.clone())
                .unwrap_or_default(),
            degraded_reason: match &self.inference {
                Inference::Degraded { reason } => Some(reason.clone()),
                Inference::Classified(_) => None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreeningSummary {
    pub label: &'static str,
    pub confidence: f32,
    pub tier: SaliencyTier,
    pub probabilities: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}
