// Configuration module for loading the booth settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BoothError, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "EXPRESSION_BOOTH_CONFIG";

/// Config file picked up from the working directory
pub const LOCAL_CONFIG: &str = "expression-booth.toml";

/// Every section has defaults, so a file only needs the keys it changes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub models: ModelConfig,
    pub preview: PreviewConfig,
    pub logging: LoggingConfig,
    pub window: WindowConfig,
}

/// Webcam selection and requested format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    /// Device indices tried in order (some systems start at 0, others at 1)
    pub indices: Vec<u32>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Detector and classifier model files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub face_cascade: PathBuf,
    pub expression_model: PathBuf,
    /// Smallest face edge in pixels the cascade reports
    pub min_face_size: i32,
    /// Square input edge of the expression classifier
    pub input_size: usize,
}

/// Live preview cadence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    pub fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    pub width: f32,
    pub height: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            indices: vec![0, 1],
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            face_cascade: PathBuf::from("assets/models/haarcascade_frontalface_default.xml"),
            expression_model: PathBuf::from("assets/models/emotion.onnx"),
            min_face_size: 40,
            input_size: 260,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { fps: 30 }
    }
}

impl PreviewConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: PathBuf::from("expression_booth.log"),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Expression Booth".to_string(),
            width: 1280.0,
            height: 960.0,
        }
    }
}

impl AppConfig {
    /// Loads the file named by `EXPRESSION_BOOTH_CONFIG`, else `./expression-booth.toml`
    /// when present, else defaults
    pub fn load() -> Result<Self> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match explicit {
            Some(path) => Self::load_from_file(&path),
            None => {
                let local = Path::new(LOCAL_CONFIG);
                if local.exists() {
                    Self::load_from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BoothError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config = Self::parse(&contents)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.camera.indices.is_empty() {
            return Err(BoothError::Config(
                "camera.indices must list at least one device".to_string(),
            ));
        }
        if self.models.input_size == 0 {
            return Err(BoothError::Config(
                "models.input_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
