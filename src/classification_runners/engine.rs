//! The classifier owner: loads the network at most once and classifies input tensors.

use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::classification_runners::inference_process::InferenceProcess;
use crate::classification_runners::network::Network;
use crate::classification_runners::ort_classifier::OrtNetwork;
use crate::common::{Classification, Inference, InputTensor, ModelConfig};
use crate::data::{ConfigOrt, TimeCalc};
use crate::{Error, Result};

pub type NetworkLoader = Box<dyn Fn(&ModelConfig) -> Result<Box<dyn Network>> + Send + Sync>;

enum ModelState {
    Ready(Box<dyn Network>),
    /// Load failed; the engine stays degraded for its whole lifetime.
    Degraded(String),
}

/// Owns the lazily-loaded classifier.
///
/// The first call that needs the network runs the loader; concurrent first calls block on
/// the same load and every later call sees its outcome. A failed load is recorded, never
/// retried, and turns every [`classify`](Self::classify) into [`Inference::Degraded`].
pub struct InferenceEngine {
    config: ModelConfig,
    loader: NetworkLoader,
    state: OnceCell<ModelState>,
    infer_time: Mutex<TimeCalc>,
}

impl InferenceEngine {
    /// Engine backed by ONNX Runtime, loading `config.weights_path` on first use.
    pub fn new(config: ModelConfig) -> Self {
        Self::with_loader(config, Box::new(load_ort_network))
    }

    pub fn with_loader(config: ModelConfig, loader: NetworkLoader) -> Self {
        Self {
            config,
            loader,
            state: OnceCell::new(),
            infer_time: Mutex::new(TimeCalc::default()),
        }
    }

    /// Engine around an already constructed network.
    pub fn with_network(config: ModelConfig, network: Box<dyn Network>) -> Self {
        let engine = Self::with_loader(
            config,
            Box::new(|_: &ModelConfig| Err(Error::ModelUnavailable("network was supplied pre-loaded".to_string()))),
        );
        let _ = engine.state.set(ModelState::Ready(network));
        engine
    }

    fn state(&self) -> &ModelState {
        self.state.get_or_init(|| match (self.loader)(&self.config) {
            Ok(network) => {
                log::info!(
                    "Classifier loaded from {} ({} layers)",
                    self.config.weights_path,
                    network.layers().len()
                );
                ModelState::Ready(network)
            }
            Err(e) => {
                log::warn!("Classifier unavailable, running degraded: {e}");
                ModelState::Degraded(e.to_string())
            }
        })
    }

    /// Forces the load. Errors with [`Error::ModelUnavailable`] when the engine is degraded.
    pub fn load(&self) -> Result<()> {
        match self.state() {
            ModelState::Ready(_) => Ok(()),
            ModelState::Degraded(reason) => Err(Error::ModelUnavailable(reason.clone())),
        }
    }

    pub fn network(&self) -> Option<&dyn Network> {
        match self.state() {
            ModelState::Ready(network) => Some(network.as_ref()),
            ModelState::Degraded(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.network().is_some()
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self.state() {
            ModelState::Ready(_) => None,
            ModelState::Degraded(reason) => Some(reason.as_str()),
        }
    }

    /// Class probabilities and the predicted class, or the degraded sentinel.
    ///
    /// Never fails: a missing model or a failed forward pass both degrade.
    pub fn classify(&self, input: &InputTensor) -> Inference {
        if let Some(reason) = self.degraded_reason() {
            return Inference::Degraded { reason: reason.to_string() };
        }

        match self.forward(input, self.config.profile) {
            Ok(classification) => Inference::Classified(classification),
            Err(e) => {
                log::warn!("Classification degraded: {e}");
                Inference::Degraded { reason: e.to_string() }
            }
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

impl InferenceProcess for InferenceEngine {
    type Input = InputTensor;
    type Output = Classification;

    fn preprocess<'a>(&self, x: &'a InputTensor) -> Result<Cow<'a, InputTensor>> {
        let side = self.config.input_size as usize;
        if x.shape() != [1, side, side, 1] {
            return Err(Error::Inference(format!(
                "input tensor has shape {:?}, expected [1, {side}, {side}, 1]",
                x.shape()
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(Error::Inference("input tensor contains non-finite values".to_string()));
        }
        Ok(Cow::Borrowed(x))
    }

    fn inference(&self, x: &InputTensor) -> Result<Vec<f32>> {
        match self.network() {
            Some(network) => network.predict(x),
            None => Err(Error::ModelUnavailable(
                self.degraded_reason().unwrap_or_default().to_string(),
            )),
        }
    }

    fn postprocess(&self, ys: Vec<f32>) -> Result<Classification> {
        Classification::from_probabilities(&ys)
            .ok_or_else(|| Error::Inference(format!("unusable probability vector {ys:?}")))
    }

    fn record_time(&self, stages: [Duration; 3]) {
        let mut t = self.infer_time.lock();
        for (i, d) in stages.into_iter().enumerate() {
            t.add_or_push(i, d);
        }
    }

    fn print_time(&self) {
        let t = self.infer_time.lock();
        log::info!(
            "Classifications: {} | align {:?} | forward {:?} | decode {:?} (avg)",
            t.n(),
            t.avg_i(0),
            t.avg_i(1),
            t.avg_i(2)
        );
    }
}

fn load_ort_network(config: &ModelConfig) -> Result<Box<dyn Network>> {
    if !Path::new(&config.weights_path).is_file() {
        return Err(Error::ModelUnavailable(format!(
            "weights file {} not found",
            config.weights_path
        )));
    }
    let network = OrtNetwork::new(&ConfigOrt::from(config))?;
    Ok(Box::new(network))
}
