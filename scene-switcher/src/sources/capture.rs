use async_trait::async_trait;
use image::RgbImage;
use interfaces::defs::{Frame, FrameSource, SourceAddress, SourceError};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::debug;

/// Local capture device or network stream read through OpenCV.
///
/// OpenCV calls block, so each one runs on the blocking pool with the
/// capture handle moved in and back out.
pub struct CaptureSource {
    address: SourceAddress,
    capture: Option<VideoCapture>,
}

impl CaptureSource {
    pub async fn open(address: &SourceAddress) -> Result<Self, SourceError> {
        let target = address.clone();
        let capture = tokio::task::spawn_blocking(move || open_capture(&target))
            .await
            .map_err(|e| SourceError::Open {
                address: address.to_string(),
                reason: e.to_string(),
            })?
            .map_err(|reason| SourceError::Open {
                address: address.to_string(),
                reason,
            })?;

        Ok(Self {
            address: address.clone(),
            capture: Some(capture),
        })
    }

    async fn with_capture<T, F>(&mut self, op: F) -> Result<T, SourceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut VideoCapture) -> Result<T, SourceError> + Send + 'static,
    {
        let mut capture = self
            .capture
            .take()
            .ok_or_else(|| SourceError::Read("capture handle lost".to_string()))?;

        let (capture, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut capture);
            (capture, result)
        })
        .await
        .map_err(|e| SourceError::Read(e.to_string()))?;

        self.capture = Some(capture);
        result
    }
}

fn open_capture(address: &SourceAddress) -> Result<VideoCapture, String> {
    let capture = match address {
        SourceAddress::Device(index) => VideoCapture::new(*index as i32, videoio::CAP_ANY),
        SourceAddress::Uri(uri) => VideoCapture::from_file(uri, videoio::CAP_ANY),
    }
    .map_err(|e| e.to_string())?;

    if !capture.is_opened().map_err(|e| e.to_string())? {
        return Err("capture did not open".to_string());
    }
    Ok(capture)
}

fn read_frame(capture: &mut VideoCapture) -> Result<Frame, SourceError> {
    let mut bgr = Mat::default();
    let grabbed = capture
        .read(&mut bgr)
        .map_err(|e| SourceError::Read(e.to_string()))?;
    if !grabbed {
        return Err(SourceError::Read("no frame available".to_string()));
    }
    if bgr.empty() {
        return Err(SourceError::EmptyFrame);
    }

    let mut rgb = Mat::default();
    imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)
        .map_err(|e| SourceError::Read(e.to_string()))?;

    let width = rgb.cols() as u32;
    let height = rgb.rows() as u32;
    let data = rgb
        .data_bytes()
        .map_err(|e| SourceError::Read(e.to_string()))?
        .to_vec();
    let image = RgbImage::from_vec(width, height, data)
        .ok_or_else(|| SourceError::Read("frame buffer size mismatch".to_string()))?;

    Ok(Frame::new(image))
}

#[async_trait]
impl FrameSource for CaptureSource {
    async fn read(&mut self) -> Result<Frame, SourceError> {
        self.with_capture(read_frame).await
    }

    async fn skip(&mut self, frames: u32) -> Result<(), SourceError> {
        self.with_capture(move |capture| {
            for _ in 0..frames {
                capture.grab().map_err(|e| SourceError::Read(e.to_string()))?;
            }
            Ok(())
        })
        .await
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        self.with_capture(|capture| {
            capture
                .release()
                .map_err(|e| SourceError::Release(e.to_string()))
        })
        .await?;
        debug!("Released capture {}", self.address);
        Ok(())
    }
}
