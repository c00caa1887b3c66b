use ndarray::{Array3, ArrayD, Axis};

use crate::common::InputTensor;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Convolution,
    Other,
}

/// A named node of the loaded network.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub name: String,
    pub kind: LayerKind,
    /// Rank of the layer output including the batch axis, when declared.
    pub output_rank: Option<usize>,
    pub channels: Option<usize>,
    /// Memory order of the layer output when the backend knows it.
    pub layout: Option<ActivationLayout>,
    /// Whether a forward pass can return this layer's output.
    pub observable: bool,
}

impl LayerInfo {
    pub fn new(name: &str, kind: LayerKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            output_rank: None,
            channels: None,
            layout: None,
            observable: true,
        }
    }

    pub fn with_output(mut self, rank: usize, channels: usize) -> Self {
        self.output_rank = Some(rank);
        self.channels = Some(channels);
        self
    }

    pub fn with_layout(mut self, layout: ActivationLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// The declared layout, or a guess from `shape` when none was declared.
    pub fn layout_for(&self, shape: &[usize]) -> ActivationLayout {
        self.layout.unwrap_or_else(|| ActivationLayout::detect(shape))
    }

    pub fn with_observable(mut self, observable: bool) -> Self {
        self.observable = observable;
        self
    }

    pub fn is_convolution(&self) -> bool {
        self.kind == LayerKind::Convolution
    }

    /// Matches the full name or one `/`-separated segment of it, so exported graphs
    /// that prefix layer names with a scope (`model/conv10/Conv2D`) still resolve.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.name.split('/').any(|segment| segment == name)
    }
}

/// One forward pass that returned the target layer's activations alongside the class
/// probabilities and, when the backend can provide it, the gradient of the selected class
/// score with respect to those activations.
#[derive(Debug, Clone)]
pub struct GradientCapture {
    /// `[H, W, C]`.
    pub activation: Array3<f32>,
    pub probabilities: Vec<f32>,
    /// `[H, W, C]`; `None` when the backend cannot differentiate.
    pub gradient: Option<Array3<f32>>,
}

/// The classifier capability used by the inference engine and the saliency chain.
///
/// Implementations are loaded once and never mutated afterwards; calls take `&self`.
pub trait Network: Send + Sync {
    fn layers(&self) -> &[LayerInfo];

    /// Class probabilities for a `[1, H, W, 1]` input.
    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>>;

    /// `[H, W, C]` output of `layer`.
    fn activation(&self, input: &InputTensor, layer: &str) -> Result<Array3<f32>>;

    fn capture(&self, input: &InputTensor, layer: &str, class_index: usize) -> Result<GradientCapture>;

    fn layer(&self, name: &str) -> Option<&LayerInfo> {
        self.layers().iter().find(|l| l.matches(name))
    }
}

/// Memory order of a 4-D activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationLayout {
    Nhwc,
    Nchw,
}

impl ActivationLayout {
    /// Square spatial dims identify the layout; channels-last wins when ambiguous.
    /// Only a fallback for layers whose layout the backend does not declare.
    pub fn detect(shape: &[usize]) -> Self {
        if shape.len() == 4 && shape[1] != shape[2] && shape[2] == shape[3] {
            ActivationLayout::Nchw
        } else {
            ActivationLayout::Nhwc
        }
    }
}

/// Drops the batch axis of a 4-D activation and returns it as `[H, W, C]`.
pub fn to_hwc(tensor: ArrayD<f32>, layout: Option<ActivationLayout>) -> Result<Array3<f32>> {
    if tensor.ndim() != 4 {
        return Err(Error::LayerMismatch(format!(
            "expected a 4-D activation, got shape {:?}",
            tensor.shape()
        )));
    }
    if tensor.shape()[0] == 0 {
        return Err(Error::LayerMismatch("activation has an empty batch".to_string()));
    }

    let layout = layout.unwrap_or_else(|| ActivationLayout::detect(tensor.shape()));
    let first = tensor.index_axis_move(Axis(0), 0).into_dimensionality::<ndarray::Ix3>()?;

    Ok(match layout {
        ActivationLayout::Nhwc => first,
        ActivationLayout::Nchw => first.permuted_axes([1, 2, 0]).as_standard_layout().to_owned(),
    })
}
