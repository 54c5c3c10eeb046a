#[cfg(feature = "opencv")]
pub mod capture;
pub mod snapshot;

#[cfg(feature = "opencv")]
pub use capture::CaptureSource;
pub use snapshot::SnapshotSource;

use crate::fetcher::Fetcher;
use async_trait::async_trait;
use interfaces::defs::{FrameSource, SourceAddress, SourceError, SourceOpener, SourceSpec};
use std::sync::Arc;

/// Picks a source implementation from the address.
///
/// `http(s)://` addresses are snapshot cameras. Device indexes and every
/// other URI go through OpenCV, which needs the `opencv` feature.
pub struct DefaultOpener {
    fetcher: Arc<Fetcher>,
}

impl DefaultOpener {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }
}

pub fn is_snapshot_address(address: &SourceAddress) -> bool {
    matches!(address.scheme().as_deref(), Some("http") | Some("https"))
}

#[async_trait]
impl SourceOpener for DefaultOpener {
    async fn open(&self, spec: &SourceSpec) -> Result<Box<dyn FrameSource>, SourceError> {
        if let SourceAddress::Uri(uri) = &spec.address {
            if is_snapshot_address(&spec.address) {
                let source = SnapshotSource::open(uri, self.fetcher.clone()).await?;
                return Ok(Box::new(source));
            }
        }
        self.open_capture(&spec.address).await
    }
}

impl DefaultOpener {
    #[cfg(feature = "opencv")]
    async fn open_capture(
        &self,
        address: &SourceAddress,
    ) -> Result<Box<dyn FrameSource>, SourceError> {
        Ok(Box::new(CaptureSource::open(address).await?))
    }

    #[cfg(not(feature = "opencv"))]
    async fn open_capture(
        &self,
        address: &SourceAddress,
    ) -> Result<Box<dyn FrameSource>, SourceError> {
        Err(SourceError::Unsupported(format!(
            "{} needs a build with the opencv feature",
            address
        )))
    }
}
