mod utils;
pub mod classification_runners;
pub mod common;
pub mod data;
pub mod pipeline;
pub mod screening;

use std::time::Instant;

pub use crate::common::Error;
use crate::common::{ModelConfig, XrayImage};
use crate::screening::{ScreeningReport, Screener};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Builds a screener and loads the model up front.
///
/// A missing or unusable model is not an error: the screener is returned in its degraded
/// state and every report carries the sentinel result with the synthetic overlay.
pub fn init_screener(model_details: &ModelConfig) -> Screener {
    log::info!("Initializing screener\n{model_details}");
    let screener = Screener::new(model_details.clone());

    let now = Instant::now();
    match screener.engine().load() {
        Ok(()) => log::info!("Classifier ready in {:?}", now.elapsed()),
        Err(e) => log::warn!("Screener starts degraded: {e}"),
    }
    screener
}

pub fn run_screening(screener: &Screener, image: &XrayImage) -> Result<ScreeningReport> {
    let now = Instant::now();
    let report = screener.screen(image)?;
    log::debug!("Processing time: {:?}", now.elapsed());
    Ok(report)
}
