// Webcam backend for the media capture seam, built on nokhwa

use async_trait::async_trait;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use tracing::{error, info, warn};

use crate::capture::{FacingMode, MediaCapture, MediaStream, StreamConstraints};
use crate::config::CameraConfig;
use crate::error::{BoothError, Result};
use crate::models::Frame;

/// Opens webcams by index
pub struct NokhwaCapture {
    indices: Vec<u32>,
}

impl NokhwaCapture {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            indices: config.indices.clone(),
        }
    }

    /// Lists available camera devices
    pub fn list_devices() -> Result<Vec<String>> {
        let devices = nokhwa::query(nokhwa::utils::ApiBackend::Auto)
            .map_err(|e| BoothError::CameraUnavailable(format!("Failed to query cameras: {e}")))?;

        Ok(devices
            .iter()
            .map(|info| info.human_name().to_string())
            .collect())
    }

    /// Helper to try opening a camera at a specific index
    fn try_open_camera(index: u32, requested_format: RequestedFormat) -> Result<Camera> {
        Camera::new(CameraIndex::Index(index), requested_format).map_err(BoothError::from)
    }
}

#[async_trait(?Send)]
impl MediaCapture for NokhwaCapture {
    async fn request_stream(
        &mut self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>> {
        if constraints.audio {
            warn!("audio was requested but webcam streams are video-only");
        }
        if constraints.facing != FacingMode::User {
            warn!(facing = ?constraints.facing, "facing mode is not selectable, using device order");
        }

        let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(constraints.width, constraints.height),
                FrameFormat::YUYV,
                constraints.fps,
            ),
        ));

        let mut last_error = BoothError::CameraUnavailable("no camera indices configured".into());
        for &index in &self.indices {
            match Self::try_open_camera(index, requested_format) {
                Ok(camera) => {
                    info!(index, name = %camera.info().human_name(), "camera opened");
                    return Ok(Box::new(CameraStream::new(camera)));
                }
                Err(e) => {
                    warn!(index, "failed to open camera: {}", e);
                    // Access denied wins over "not found" when reporting
                    if !matches!(last_error, BoothError::CameraAccessDenied) {
                        last_error = e;
                    }
                }
            }
        }

        error!("Failed to open any camera: {}", last_error);
        Err(last_error)
    }
}

/// A single opened webcam; its one video track stops on `stop_tracks` or drop
pub struct CameraStream {
    camera: Camera,
    live: bool,
}

impl CameraStream {
    fn new(camera: Camera) -> Self {
        Self {
            camera,
            live: false,
        }
    }

    /// Returns the negotiated camera resolution
    pub fn resolution(&self) -> (u32, u32) {
        let res = self.camera.resolution();
        (res.width(), res.height())
    }
}

impl MediaStream for CameraStream {
    fn start_playback(&mut self) -> Result<()> {
        if !self.live {
            self.camera.open_stream().map_err(|e| {
                error!("Failed to open camera stream: {}", e);
                BoothError::from(e)
            })?;
            self.live = true;
        }

        // Verify stream is working
        match self.camera.frame() {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Camera stream not working: {}", e);
                self.stop_tracks();
                Err(BoothError::CameraInit(format!(
                    "Camera stream not working: {e}. Make sure camera permissions are granted."
                )))
            }
        }
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if !self.live {
            return Err(BoothError::FrameProcessing(
                "camera stream is stopped".to_string(),
            ));
        }

        let frame_data = self
            .camera
            .frame()
            .map_err(|e| BoothError::FrameProcessing(format!("Failed to capture frame: {e}")))?;

        let buffer = frame_data
            .decode_image::<RgbFormat>()
            .map_err(|e| BoothError::FrameProcessing(format!("Failed to decode frame: {e}")))?;

        let (width, height) = (buffer.width(), buffer.height());
        Ok(Frame::new(buffer.into_raw(), width, height))
    }

    fn stop_tracks(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;

        if let Err(e) = self.camera.stop_stream() {
            error!("Error stopping camera stream: {}", e);
        }
        let (width, height) = self.resolution();
        info!(width, height, "camera stream stopped");
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.live)
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
