#[cfg(feature = "opencv")]
pub mod darknet;
pub mod http;

#[cfg(feature = "opencv")]
pub use darknet::DarknetDetector;
pub use http::HttpDetector;

use crate::config::DetectorSettings;
use crate::fetcher::{redact, Fetcher};
use crate::types::{Result, SwitcherError};
use interfaces::defs::Detector;
use std::sync::Arc;
use tracing::info;

/// Builds the configured detector.
pub fn build(settings: &DetectorSettings, fetcher: Arc<Fetcher>) -> Result<Arc<dyn Detector>> {
    match settings {
        DetectorSettings::Http { endpoint } => {
            info!("Using HTTP detector at {}", redact(endpoint));
            Ok(Arc::new(HttpDetector::new(endpoint.clone(), fetcher)))
        }
        DetectorSettings::Darknet {
            config,
            weights,
            names,
            input_size,
        } => build_darknet(config, weights, names, *input_size),
    }
}

#[cfg(feature = "opencv")]
fn build_darknet(
    config: &std::path::Path,
    weights: &std::path::Path,
    names: &std::path::Path,
    input_size: i32,
) -> Result<Arc<dyn Detector>> {
    info!("Loading Darknet model from {}", weights.display());
    let detector = DarknetDetector::load(config, weights, names, input_size)
        .map_err(|e| SwitcherError::Config(format!("failed to load detector: {}", e)))?;
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "opencv"))]
fn build_darknet(
    _config: &std::path::Path,
    _weights: &std::path::Path,
    _names: &std::path::Path,
    _input_size: i32,
) -> Result<Arc<dyn Detector>> {
    Err(SwitcherError::Config(
        "the darknet detector needs a build with the opencv feature".to_string(),
    ))
}
