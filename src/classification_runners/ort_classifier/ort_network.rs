//! [`Network`] over an ONNX Runtime session.
//!
//! ONNX Runtime does not differentiate, so explanation support is read from the exported
//! graph: a layer is observable when its output tensor is also a graph output, and its
//! gradient is available when the graph outputs `<tensor><gradient_suffix>` and accepts the
//! int64 class-selection input. The first graph output is the class-probability vector.

use std::collections::HashMap;

use ndarray::{Array, Array3, ArrayD};
use regex::Regex;

use crate::classification_runners::network::{to_hwc, ActivationLayout, GradientCapture, LayerInfo, LayerKind, Network};
use crate::classification_runners::ort_classifier::OrtEngine;
use crate::common::InputTensor;
use crate::data::ConfigOrt;
use crate::{Error, Result};

const CONV_OPS: [&str; 2] = ["Conv", "ConvInteger"];

pub struct OrtNetwork {
    engine: OrtEngine,
    layers: Vec<LayerInfo>,
    /// Layer name -> tensor it produces.
    layer_outputs: HashMap<String, String>,
    /// Activation tensor -> gradient tensor.
    gradients: HashMap<String, String>,
    image_input: String,
    class_input: Option<String>,
    probs_output: String,
}

impl OrtNetwork {
    pub fn new(config: &ConfigOrt) -> Result<Self> {
        let engine = OrtEngine::new(config).map_err(|e| Error::ModelUnavailable(format!("{e:#}")))?;
        Self::from_engine(engine, config)
    }

    pub fn from_engine(engine: OrtEngine, config: &ConfigOrt) -> Result<Self> {
        let inputs = engine.inputs();
        let outputs = engine.outputs();

        let class_input = inputs.names.iter().find(|n| **n == config.class_input).cloned();
        let image_input = match inputs.names.iter().find(|n| Some(*n) != class_input.as_ref()) {
            Some(name) => name.to_string(),
            None => return Err(Error::ModelUnavailable("model has no image input".to_string())),
        };
        let probs_output = match outputs.names.first() {
            Some(name) => name.to_string(),
            None => return Err(Error::ModelUnavailable("model has no outputs".to_string())),
        };

        let gradients = match &class_input {
            Some(_) => gradient_taps(&outputs.names, &config.gradient_suffix),
            None => HashMap::new(),
        };

        let mut layers = Vec::new();
        let mut layer_outputs = HashMap::new();
        if let Some(graph) = engine.graph() {
            let dims_by_tensor: HashMap<&str, Vec<usize>> = graph
                .value_info
                .iter()
                .chain(graph.output.iter())
                .filter_map(|v| v.tensor_info().map(|(_, dims)| (v.name.as_str(), dims)))
                .collect();

            for node in graph.node.iter() {
                let tensor = match node.output.first() {
                    Some(t) => t,
                    None => continue,
                };
                let name = if node.name.is_empty() { tensor } else { &node.name };
                // ONNX convolutions always produce NCHW.
                let mut layer = if CONV_OPS.contains(&node.op_type.as_str()) {
                    LayerInfo::new(name, LayerKind::Convolution).with_layout(ActivationLayout::Nchw)
                } else {
                    LayerInfo::new(name, LayerKind::Other)
                };
                layer.observable = outputs.contains(tensor);
                if let Some(dims) = dims_by_tensor.get(tensor.as_str()) {
                    layer.output_rank = Some(dims.len());
                    layer.channels = channels_of(dims, layer.layout);
                }
                layer_outputs.insert(name.to_string(), tensor.to_string());
                layers.push(layer);
            }
        }

        log::info!(
            "Classifier graph on {}: {} layers ({} convolutional, {} observable, {} with gradients)",
            engine.device(),
            layers.len(),
            layers.iter().filter(|l| l.is_convolution()).count(),
            layers.iter().filter(|l| l.observable).count(),
            gradients.len(),
        );

        Ok(Self {
            engine,
            layers,
            layer_outputs,
            gradients,
            image_input,
            class_input,
            probs_output,
        })
    }

    fn run(&self, input: &InputTensor, class_index: usize) -> Result<HashMap<String, ArrayD<f32>>> {
        let mut feeds = HashMap::with_capacity(2);
        feeds.insert(self.image_input.clone(), input.to_dyn());
        if let Some(name) = &self.class_input {
            feeds.insert(name.clone(), Array::from_elem(1, class_index as f32).into_dyn());
        }
        self.engine.run(&feeds).map_err(|e| Error::Inference(format!("{e:#}")))
    }

    /// The layer and the graph output carrying its activation.
    fn observed(&self, layer: &str) -> Result<(&LayerInfo, &str)> {
        let info = match self.layer(layer) {
            Some(info) => info,
            None => return Err(Error::TargetLayerNotFound(layer.to_string())),
        };
        if !info.observable {
            return Err(Error::LayerMismatch(format!("layer `{}` is not exported as a graph output", info.name)));
        }
        match self.layer_outputs.get(&info.name) {
            Some(tensor) => Ok((info, tensor.as_str())),
            None => Err(Error::TargetLayerNotFound(layer.to_string())),
        }
    }

    fn probabilities(&self, ys: &mut HashMap<String, ArrayD<f32>>) -> Result<Vec<f32>> {
        match ys.remove(&self.probs_output) {
            Some(p) => Ok(p.into_iter().collect()),
            None => Err(Error::Inference(format!("missing output `{}`", self.probs_output))),
        }
    }
}

impl Network for OrtNetwork {
    fn layers(&self) -> &[LayerInfo] {
        &self.layers
    }

    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>> {
        let mut ys = self.run(input, 0)?;
        self.probabilities(&mut ys)
    }

    fn activation(&self, input: &InputTensor, layer: &str) -> Result<Array3<f32>> {
        let (info, tensor) = self.observed(layer)?;
        let mut ys = self.run(input, 0)?;
        match ys.remove(tensor) {
            Some(y) => {
                let layout = info.layout_for(y.shape());
                to_hwc(y, Some(layout))
            }
            None => Err(Error::LayerMismatch(format!("no output for `{tensor}`"))),
        }
    }

    fn capture(&self, input: &InputTensor, layer: &str, class_index: usize) -> Result<GradientCapture> {
        let (info, tensor) = self.observed(layer)?;
        let mut ys = self.run(input, class_index)?;

        let raw = match ys.remove(tensor) {
            Some(y) => y,
            None => return Err(Error::LayerMismatch(format!("no output for `{tensor}`"))),
        };
        let layout = info.layout_for(raw.shape());
        let activation = to_hwc(raw, Some(layout))?;

        // A gradient in a different layout than its activation is not usable.
        let gradient = match self.gradients.get(tensor).and_then(|g| ys.remove(g)) {
            Some(g) if g.shape().len() == 4 => Some(to_hwc(g, Some(layout))?),
            Some(g) => {
                return Err(Error::GradientComputationFailure(format!(
                    "gradient of `{tensor}` has shape {:?}",
                    g.shape()
                )))
            }
            None => None,
        };

        Ok(GradientCapture {
            activation,
            probabilities: self.probabilities(&mut ys)?,
            gradient,
        })
    }
}

/// Maps activation tensors to their gradient outputs.
fn gradient_taps(outputs: &[String], suffix: &str) -> HashMap<String, String> {
    let pattern = format!("^(?P<act>.+){}$", regex::escape(suffix));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            log::warn!("Invalid gradient suffix `{suffix}`: {e}");
            return HashMap::new();
        }
    };

    outputs
        .iter()
        .filter_map(|name| {
            let act = re.captures(name)?.name("act")?.as_str();
            outputs.iter().any(|o| o == act).then(|| (act.to_string(), name.to_string()))
        })
        .collect()
}

fn channels_of(dims: &[usize], layout: Option<ActivationLayout>) -> Option<usize> {
    if dims.len() != 4 {
        return dims.last().copied().filter(|&c| c > 0);
    }
    let c = match layout.unwrap_or_else(|| ActivationLayout::detect(dims)) {
        ActivationLayout::Nhwc => dims[3],
        ActivationLayout::Nchw => dims[1],
    };
    (c > 0).then_some(c)
}
