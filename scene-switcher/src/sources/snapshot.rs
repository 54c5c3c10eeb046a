use crate::fetcher::{redact, Fetcher};
use async_trait::async_trait;
use interfaces::defs::{Frame, FrameSource, SourceError};
use std::sync::Arc;
use tracing::debug;

/// Camera that serves a still JPEG/PNG per HTTP GET.
///
/// Every read is a fresh snapshot, so there is no buffered backlog to skip.
pub struct SnapshotSource {
    url: String,
    fetcher: Arc<Fetcher>,
}

impl SnapshotSource {
    /// Fetches one snapshot up front so an unreachable camera fails at open time.
    pub async fn open(url: &str, fetcher: Arc<Fetcher>) -> Result<Self, SourceError> {
        let source = Self {
            url: url.to_string(),
            fetcher,
        };

        source.fetch_frame().await.map_err(|e| SourceError::Open {
            address: redact(url),
            reason: e.to_string(),
        })?;

        Ok(source)
    }

    async fn fetch_frame(&self) -> Result<Frame, SourceError> {
        let body = self
            .fetcher
            .fetch_bytes(&self.url)
            .await
            .map_err(|e| SourceError::Read(e.to_string()))?;

        let image = image::load_from_memory(&body)
            .map_err(|e| SourceError::Read(format!("undecodable snapshot: {}", e)))?
            .to_rgb8();

        let frame = Frame::new(image);
        if frame.is_empty() {
            return Err(SourceError::EmptyFrame);
        }
        Ok(frame)
    }
}

#[async_trait]
impl FrameSource for SnapshotSource {
    async fn read(&mut self) -> Result<Frame, SourceError> {
        self.fetch_frame().await
    }

    async fn skip(&mut self, _frames: u32) -> Result<(), SourceError> {
        Ok(())
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        debug!("Released snapshot source {}", redact(&self.url));
        Ok(())
    }
}
