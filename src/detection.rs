// Detection module for running the expression detector on captured frames

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::capture::VideoSurface;
use crate::error::{BoothError, Result};
use crate::models::{DetectionResult, Frame};
use crate::render::OutputPanel;

/// External face detector plus expression classifier
#[async_trait]
pub trait ExpressionDetector: Send + Sync {
    /// Loads model weights; called once before the first detection
    async fn load_models(&self) -> Result<()>;

    /// Finds every face in the frame and scores its expressions
    async fn detect(&self, frame: &Frame) -> Result<DetectionResult>;
}

/// Runs the detector against the current frame, loading models once per process
pub struct DetectionGateway {
    detector: Arc<dyn ExpressionDetector>,
    models: OnceCell<()>,
}

impl DetectionGateway {
    pub fn new(detector: Arc<dyn ExpressionDetector>) -> Self {
        Self {
            detector,
            models: OnceCell::new(),
        }
    }

    pub fn models_loaded(&self) -> bool {
        self.models.initialized()
    }

    /// Loads models on first use. A failed load is retried on the next call.
    pub async fn ensure_models(&self) -> Result<()> {
        self.models
            .get_or_try_init(|| async {
                info!("loading expression models");
                self.detector.load_models().await.map_err(|e| {
                    error!("Model loading failed: {}", e);
                    e
                })
            })
            .await?;
        Ok(())
    }

    /// Marks the output busy and grabs the frame on screen.
    ///
    /// The surface must be playing; the frame is analyzed without drawing on it.
    pub fn prepare(
        self: &Arc<Self>,
        surface: &VideoSurface,
        output: &mut OutputPanel,
    ) -> Result<PendingCapture> {
        let frame = surface.snapshot().ok_or(BoothError::SessionInactive)??;
        output.set_busy(true);
        debug!(width = frame.width, height = frame.height, "frame captured");
        Ok(PendingCapture {
            gateway: Arc::clone(self),
            frame,
        })
    }

    /// Invokes the detector once on the frame
    pub async fn analyze(&self, frame: &Frame) -> Result<DetectionResult> {
        self.ensure_models().await?;
        let result = self.detector.detect(frame).await?;
        info!(faces = result.faces.len(), "detection finished");
        Ok(result)
    }
}

/// A captured frame waiting for analysis
pub struct PendingCapture {
    gateway: Arc<DetectionGateway>,
    frame: Frame,
}

impl PendingCapture {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub async fn run(self) -> Result<DetectionResult> {
        self.gateway.analyze(&self.frame).await
    }
}
