use std::borrow::Cow;
use std::time::{Duration, Instant};

use crate::common::InputTensor;
use crate::utils;
use crate::Result;

/// Staged classification: input alignment, the forward pass, and decoding of the raw output.
pub trait InferenceProcess {
    type Input: ?Sized;
    type Output;

    /// Validates and aligns the input for the network. Input that is already aligned is
    /// passed through borrowed.
    fn preprocess<'a>(&self, x: &'a Self::Input) -> Result<Cow<'a, InputTensor>>;

    /// Executes the model on the aligned input.
    fn inference(&self, x: &InputTensor) -> Result<Vec<f32>>;

    /// Decodes the raw model output.
    fn postprocess(&self, ys: Vec<f32>) -> Result<Self::Output>;

    /// Records per-stage timings `[pre, inference, post]`.
    fn record_time(&self, _stages: [Duration; 3]) {}

    /// Executes the full pipeline, timing each stage.
    fn forward(&self, x: &Self::Input, profile: bool) -> Result<Self::Output> {
        let start = Instant::now();
        let mut elapsed = Duration::ZERO;

        let t_pre = Instant::now();
        let xs = self.preprocess(x)?;
        let t_pre = t_pre.elapsed();
        elapsed = utils::trace("TIME", "Input alignment", start, elapsed);

        let t_exe = Instant::now();
        let ys = self.inference(&xs)?;
        let t_exe = t_exe.elapsed();
        elapsed = utils::trace("TIME", "Classifier run", start, elapsed);

        let t_post = Instant::now();
        let ys = self.postprocess(ys)?;
        let t_post = t_post.elapsed();
        utils::trace("TIME", "Decoding", start, elapsed);

        self.record_time([t_pre, t_exe, t_post]);
        if profile {
            log::info!("> Preprocess: {t_pre:?} | Inference: {t_exe:?} | Postprocess: {t_post:?}");
        }

        Ok(ys)
    }

    fn print_time(&self) {}
}
