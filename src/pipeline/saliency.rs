//! Class-activation heatmaps with a three-tier fallback.
//!
//! 1. Grad-CAM on the target convolutional layer.
//! 2. Mean channel activation of a multi-channel 4-D layer near the input.
//! 3. A synthetic radial map, which cannot fail.
//!
//! Every tier returns a map in `[0, 1]`. Failures are logged and fall through.

use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::classification_runners::{LayerInfo, Network};
use crate::common::{InputTensor, ModelConfig};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaliencyTier {
    #[serde(rename = "gradcam")]
    GradCam,
    #[serde(rename = "activation")]
    ActivationMean,
    #[serde(rename = "synthetic")]
    Synthetic,
}

impl SaliencyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaliencyTier::GradCam => "gradcam",
            SaliencyTier::ActivationMean => "activation",
            SaliencyTier::Synthetic => "synthetic",
        }
    }
}

impl std::fmt::Display for SaliencyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Saliency {
    /// `[H, W]`, values in `[0, 1]`.
    pub heatmap: Array2<f32>,
    pub tier: SaliencyTier,
}

/// Picks the layer Grad-CAM explains. Only observable layers are returned.
pub trait TargetLayerResolver: Send + Sync {
    fn describe(&self) -> String;

    fn resolve<'a>(&self, layers: &'a [LayerInfo]) -> Option<&'a LayerInfo>;
}

/// Layer with the given name, or with a scoped name containing it as a segment.
#[derive(Debug, Clone)]
pub struct ExactName(pub String);

impl TargetLayerResolver for ExactName {
    fn describe(&self) -> String {
        format!("layer named `{}`", self.0)
    }

    fn resolve<'a>(&self, layers: &'a [LayerInfo]) -> Option<&'a LayerInfo> {
        layers.iter().find(|l| l.observable && l.matches(&self.0))
    }
}

/// The convolutional layer closest to the output.
#[derive(Debug, Clone, Copy)]
pub struct LastConvolution;

impl TargetLayerResolver for LastConvolution {
    fn describe(&self) -> String {
        "last convolutional layer".to_string()
    }

    fn resolve<'a>(&self, layers: &'a [LayerInfo]) -> Option<&'a LayerInfo> {
        layers.iter().rev().find(|l| l.observable && l.is_convolution())
    }
}

pub struct SaliencyMapper {
    resolvers: Vec<Box<dyn TargetLayerResolver>>,
    search_depth: usize,
    decay: f32,
}

impl Default for SaliencyMapper {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for SaliencyMapper {
    fn from(config: &ModelConfig) -> Self {
        Self {
            resolvers: vec![Box::new(ExactName(config.target_layer.clone())), Box::new(LastConvolution)],
            search_depth: config.activation_search_depth,
            decay: config.synthetic_decay,
        }
    }
}

impl SaliencyMapper {
    /// Replaces the target-layer strategies; they are tried in order.
    pub fn with_resolvers(mut self, resolvers: Vec<Box<dyn TargetLayerResolver>>) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn with_search_depth(mut self, depth: usize) -> Self {
        self.search_depth = depth;
        self
    }

    pub fn resolve_target<'a>(&self, network: &'a dyn Network) -> Option<&'a LayerInfo> {
        self.resolvers.iter().find_map(|r| {
            let found = r.resolve(network.layers());
            match found {
                Some(layer) => log::debug!("Grad-CAM target: `{}` ({})", layer.name, r.describe()),
                None => log::debug!("No {} in the classifier", r.describe()),
            }
            found
        })
    }

    /// Heatmap for `class_index`. `network` is `None` when no classifier is loaded.
    pub fn explain(&self, network: Option<&dyn Network>, input: &InputTensor, class_index: usize) -> Saliency {
        if let Some(network) = network {
            match self.grad_cam(network, input, class_index) {
                Ok(heatmap) => return Saliency { heatmap, tier: SaliencyTier::GradCam },
                Err(e) => log::warn!("Grad-CAM unavailable [{}]: {e}", e.error_code()),
            }
            match self.activation_mean(network, input) {
                Ok(heatmap) => return Saliency { heatmap, tier: SaliencyTier::ActivationMean },
                Err(e) => log::warn!("Activation fallback unavailable [{}]: {e}", e.error_code()),
            }
        } else {
            log::warn!("No classifier loaded, using the synthetic heatmap");
        }

        Saliency {
            heatmap: synthetic(input.height(), input.width(), self.decay),
            tier: SaliencyTier::Synthetic,
        }
    }

    /// Tier 1.
    pub fn grad_cam(&self, network: &dyn Network, input: &InputTensor, class_index: usize) -> Result<Array2<f32>> {
        let layer = self.resolve_target(network).ok_or_else(|| {
            let tried: Vec<String> = self.resolvers.iter().map(|r| r.describe()).collect();
            Error::TargetLayerNotFound(tried.join(", "))
        })?;

        let capture = network.capture(input, &layer.name, class_index)?;
        if class_index >= capture.probabilities.len() {
            return Err(Error::GradientComputationFailure(format!(
                "class {class_index} outside a {}-way output",
                capture.probabilities.len()
            )));
        }
        let gradient = capture.gradient.ok_or_else(|| {
            Error::GradientComputationFailure(format!("no gradient available for `{}`", layer.name))
        })?;

        grad_cam_map(&capture.activation, &gradient)
    }

    /// Tier 2.
    pub fn activation_mean(&self, network: &dyn Network, input: &InputTensor) -> Result<Array2<f32>> {
        let layers = network.layers();
        let head = &layers[..layers.len().min(self.search_depth)];
        let layer = head
            .iter()
            .rev()
            .find(|l| l.observable && l.output_rank == Some(4) && l.channels.is_some_and(|c| c > 1))
            .ok_or_else(|| {
                Error::LayerMismatch(format!(
                    "no observable multi-channel 4-D layer among the first {}",
                    head.len()
                ))
            })?;

        let activation = network.activation(input, &layer.name)?;
        let mean = activation
            .mean_axis(Axis(2))
            .ok_or_else(|| Error::LayerMismatch(format!("layer `{}` has no channels", layer.name)))?;
        if mean.iter().any(|v| !v.is_finite()) {
            return Err(Error::LayerMismatch(format!("layer `{}` produced non-finite values", layer.name)));
        }

        Ok(normalize(mean))
    }
}

/// ReLU of the gradient-weighted channel sum, one weight per channel from the spatially
/// averaged gradient.
pub fn grad_cam_map(activation: &Array3<f32>, gradient: &Array3<f32>) -> Result<Array2<f32>> {
    if activation.dim() != gradient.dim() {
        return Err(Error::LayerMismatch(format!(
            "activation {:?} and gradient {:?} differ",
            activation.dim(),
            gradient.dim()
        )));
    }

    let weights = gradient
        .mean_axis(Axis(0))
        .and_then(|g| g.mean_axis(Axis(0)))
        .ok_or_else(|| Error::GradientComputationFailure("empty gradient".to_string()))?;
    let cam = activation.map_axis(Axis(2), |channels| channels.dot(&weights));

    if cam.iter().any(|v| !v.is_finite()) {
        return Err(Error::GradientComputationFailure("non-finite class activation map".to_string()));
    }

    Ok(normalize(cam))
}

/// Clips negatives, then divides by the maximum when it is positive. An all-zero map stays zero.
pub fn normalize(mut map: Array2<f32>) -> Array2<f32> {
    map.mapv_inplace(|v| if v.is_finite() { v.max(0.0) } else { 0.0 });
    let max = map.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        map.mapv_inplace(|v| v / max);
    }
    map
}

/// `exp(-d / decay)` of the distance from the center, normalized.
pub fn synthetic(height: usize, width: usize, decay: f32) -> Array2<f32> {
    let decay = if decay.is_finite() && decay > 0.0 { decay } else { 100.0 };
    let cy = (height as f32 - 1.0) / 2.0;
    let cx = (width as f32 - 1.0) / 2.0;

    let map = Array2::from_shape_fn((height, width), |(y, x)| {
        let d = ((y as f32 - cy).powi(2) + (x as f32 - cx).powi(2)).sqrt();
        (-d / decay).exp()
    });
    normalize(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[test]
    fn grad_cam_weights_channels_by_mean_gradient() {
        // Channel 0 is hot on the left, channel 1 on the right.
        let activation = Array::from_shape_fn((2, 2, 2), |(_, x, c)| if x == c { 1.0 } else { 0.0 });
        let mut gradient = Array3::zeros((2, 2, 2));
        gradient.index_axis_mut(Axis(2), 0).fill(1.0);
        gradient.index_axis_mut(Axis(2), 1).fill(-1.0);

        let cam = grad_cam_map(&activation, &gradient).unwrap();
        assert_eq!(cam, ndarray::arr2(&[[1.0, 0.0], [1.0, 0.0]]));
    }

    #[test]
    fn negative_only_map_stays_zero() {
        let map = normalize(Array2::from_elem((4, 4), -3.0));
        assert!(map.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn mismatched_gradient_is_rejected() {
        let a = Array3::zeros((4, 4, 2));
        let g = Array3::zeros((2, 2, 2));
        assert!(matches!(grad_cam_map(&a, &g), Err(Error::LayerMismatch(_))));
    }

    #[test]
    fn synthetic_peaks_at_center() {
        let map = synthetic(9, 9, 100.0);
        assert_eq!(map[[4, 4]], 1.0);
        assert!(map[[0, 0]] < map[[2, 2]]);
        assert_eq!(map[[0, 4]], map[[8, 4]]);
    }
}
