// Error types for the expression booth

use thiserror::Error;

/// Main error type for the expression booth
#[derive(Debug, Error)]
pub enum BoothError {
    #[error("Camera initialization failed: {0}")]
    CameraInit(String),

    #[error("Camera access denied")]
    CameraAccessDenied,

    #[error("No camera available: {0}")]
    CameraUnavailable(String),

    #[error("Frame processing failed: {0}")]
    FrameProcessing(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Face detection failed: {0}")]
    FaceDetection(String),

    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(String),

    #[error("OpenCV error: {0}")]
    OpenCV(String),

    #[error("No active camera session")]
    SessionInactive,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoothError {
    /// True for failures the user can fix by granting access or plugging in a camera
    pub fn is_camera_error(&self) -> bool {
        matches!(
            self,
            BoothError::CameraInit(_)
                | BoothError::CameraAccessDenied
                | BoothError::CameraUnavailable(_)
        )
    }
}

/// Result type alias for booth operations
pub type Result<T> = std::result::Result<T, BoothError>;

// Conversion from nokhwa errors
impl From<nokhwa::NokhwaError> for BoothError {
    fn from(err: nokhwa::NokhwaError) -> Self {
        match err {
            nokhwa::NokhwaError::OpenDeviceError(device, error) => {
                let lowered = error.to_lowercase();
                if lowered.contains("permission") || lowered.contains("denied") {
                    BoothError::CameraAccessDenied
                } else {
                    BoothError::CameraUnavailable(format!("Device {device}: {error}"))
                }
            }
            nokhwa::NokhwaError::StructureError { structure, error } => {
                BoothError::CameraInit(format!("{structure}: {error}"))
            }
            nokhwa::NokhwaError::GetPropertyError { property, error } => {
                BoothError::CameraInit(format!("Property {property}: {error}"))
            }
            _ => BoothError::CameraInit(err.to_string()),
        }
    }
}

// Conversion from OpenCV errors
impl From<opencv::Error> for BoothError {
    fn from(err: opencv::Error) -> Self {
        BoothError::OpenCV(err.to_string())
    }
}

// Conversion from ONNX Runtime errors
impl From<ort::Error> for BoothError {
    fn from(err: ort::Error) -> Self {
        BoothError::OnnxRuntime(err.to_string())
    }
}

impl From<toml::de::Error> for BoothError {
    fn from(err: toml::de::Error) -> Self {
        BoothError::Config(err.to_string())
    }
}
