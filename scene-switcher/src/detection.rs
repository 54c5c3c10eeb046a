use interfaces::defs::{Detector, Frame, Observation};
use std::sync::Arc;
use tracing::{debug, warn};

/// Wraps a [`Detector`] so that a bad frame or a failed inference never
/// fails the cycle: both come back as an empty observation list.
#[derive(Clone)]
pub struct DetectorAdapter {
    detector: Arc<dyn Detector>,
}

impl DetectorAdapter {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self { detector }
    }

    pub fn detector_name(&self) -> String {
        self.detector.detector_name()
    }

    pub async fn detect(&self, source_label: &str, frame: &Frame) -> Vec<Observation> {
        if frame.is_empty() {
            debug!("Skipping detection on empty frame from {}", source_label);
            return Vec::new();
        }

        match self.detector.detect(frame).await {
            Ok(observations) => {
                debug!(
                    "{} found {} objects in frame from {}",
                    self.detector.detector_name(),
                    observations.len(),
                    source_label
                );
                observations
            }
            Err(e) => {
                warn!(
                    "Detector {} failed on frame from {}: {}",
                    self.detector.detector_name(),
                    source_label,
                    e
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::RgbImage;
    use interfaces::defs::{BoundingBox, DetectError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDetector {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Detector for CountingDetector {
        fn detector_name(&self) -> String {
            "counting".to_string()
        }

        async fn detect(&self, _frame: &Frame) -> Result<Vec<Observation>, DetectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DetectError::Inference("model not loaded".to_string()));
            }
            Ok(vec![Observation::new("cat", 0.9, BoundingBox::default())])
        }
    }

    #[tokio::test]
    async fn test_empty_frame_skips_detector() {
        let detector = Arc::new(CountingDetector { calls: AtomicUsize::new(0), fail: false });
        let adapter = DetectorAdapter::new(detector.clone());

        let observations = adapter.detect("cam", &Frame::new(RgbImage::new(0, 0))).await;

        assert!(observations.is_empty());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_detector_error_becomes_empty_list() {
        let detector = Arc::new(CountingDetector { calls: AtomicUsize::new(0), fail: true });
        let adapter = DetectorAdapter::new(detector.clone());

        let observations = adapter.detect("cam", &Frame::new(RgbImage::new(4, 4))).await;

        assert!(observations.is_empty());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_observations_pass_through() {
        let detector = Arc::new(CountingDetector { calls: AtomicUsize::new(0), fail: false });
        let adapter = DetectorAdapter::new(detector);

        let observations = adapter.detect("cam", &Frame::new(RgbImage::new(4, 4))).await;

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].class_label, "cat");
    }
}
