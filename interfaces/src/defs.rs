use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where a source's frames come from: a local capture device or a URI
/// (`rtsp://`, `http://`, a file path...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceAddress {
    Device(u32),
    Uri(String),
}

impl SourceAddress {
    /// URI scheme in lowercase, `None` for device indexes and bare paths.
    pub fn scheme(&self) -> Option<String> {
        match self {
            SourceAddress::Device(_) => None,
            SourceAddress::Uri(uri) => uri
                .split_once("://")
                .map(|(scheme, _)| scheme.to_ascii_lowercase()),
        }
    }
}

impl fmt::Display for SourceAddress {
    // Stream URIs routinely carry camera credentials; never print them.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceAddress::Device(index) => write!(f, "device:{}", index),
            SourceAddress::Uri(uri) => match uri.split_once("://") {
                Some((scheme, rest)) => {
                    let authority_end = rest
                        .find(|c: char| matches!(c, '/' | '?' | '#'))
                        .unwrap_or(rest.len());
                    match rest[..authority_end].rfind('@') {
                        Some(at) => write!(f, "{}://***@{}", scheme, &rest[at + 1..]),
                        None => write!(f, "{}", uri),
                    }
                }
                None => write!(f, "{}", uri),
            },
        }
    }
}

/// One configured input. The label doubles as the scene name in the
/// presentation tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub label: String,
    pub address: SourceAddress,
}

impl SourceSpec {
    pub fn new(label: impl Into<String>, address: SourceAddress) -> Self {
        Self {
            label: label.into(),
            address,
        }
    }
}

/// A decoded RGB frame. Cloning shares the pixel buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn shared_image(&self) -> Arc<RgbImage> {
        self.image.clone()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// A zero-sized frame carries nothing a detector could look at.
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}

/// Pixel-space box, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One detected object instance within one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub class_label: String,
    /// 0.0 - 1.0
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

impl Observation {
    pub fn new(class_label: impl Into<String>, confidence: f32, bounding_box: BoundingBox) -> Self {
        Self {
            class_label: class_label.into(),
            confidence,
            bounding_box,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open {address}: {reason}")]
    Open { address: String, reason: String },

    #[error("read failed: {0}")]
    Read(String),

    #[error("source returned an empty frame")]
    EmptyFrame,

    #[error("release failed: {0}")]
    Release(String),

    #[error("unsupported source address: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("detector transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControllerError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("switch failed: {0}")]
    Switch(String),

    #[error("controller unavailable")]
    Unavailable,
}

/// A live handle to one video source. Exactly one worker owns it.
#[async_trait]
pub trait FrameSource: Send {
    /// Read and decode the next frame.
    async fn read(&mut self) -> Result<Frame, SourceError>;

    /// Advance past `frames` buffered frames without decoding them.
    async fn skip(&mut self, frames: u32) -> Result<(), SourceError>;

    async fn release(&mut self) -> Result<(), SourceError>;
}

/// Turns a configured address into a live `FrameSource`.
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(&self, spec: &SourceSpec) -> Result<Box<dyn FrameSource>, SourceError>;
}

/// Object detector boundary.
#[async_trait]
pub trait Detector: Send + Sync {
    fn detector_name(&self) -> String;

    async fn detect(&self, frame: &Frame) -> Result<Vec<Observation>, DetectError>;
}

/// Presentation tool that can report and change its active scene.
#[async_trait]
pub trait SceneController: Send {
    async fn current_scene(&mut self) -> Result<String, ControllerError>;

    async fn set_current_scene(&mut self, scene: &str) -> Result<(), ControllerError>;

    async fn disconnect(&mut self) -> Result<(), ControllerError>;
}
