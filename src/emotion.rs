// Expression detection backed by an OpenCV face cascade and an ONNX classifier

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::imgproc;
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use ort::session::Session;
use ort::value::Value;
use tracing::{error, info, warn};

use crate::config::ModelConfig;
use crate::detection::ExpressionDetector;
use crate::error::{BoothError, Result};
use crate::models::{DetectionResult, Expression, ExpressionScores, FaceExpressions, Frame};

/// A grayscale face crop
struct FaceCrop {
    data: Vec<u8>,
    height: u32,
}

/// Face detector using OpenCV Haar Cascade
pub struct FaceDetector {
    classifier: CascadeClassifier,
    min_face_size: i32,
}

impl FaceDetector {
    /// Creates a new FaceDetector by loading the Haar Cascade classifier
    pub fn new(cascade_path: &str, min_face_size: i32) -> Result<Self> {
        let classifier = CascadeClassifier::new(cascade_path).map_err(|e| {
            error!("Failed to load Haar Cascade: {}", e);
            BoothError::ModelLoad(format!("Haar Cascade load failed: {e}"))
        })?;

        if classifier.empty()? {
            return Err(BoothError::ModelLoad(
                "Haar Cascade classifier is empty".to_string(),
            ));
        }

        Ok(Self {
            classifier,
            min_face_size,
        })
    }

    /// Detects faces in the given frame, largest first
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<FaceCrop>> {
        let mat = Mat::from_slice(&frame.data)
            .map_err(|e| BoothError::FaceDetection(format!("Failed to create Mat: {e}")))?;

        let mat = mat
            .reshape(3, frame.height as i32)
            .map_err(|e| BoothError::FaceDetection(format!("Failed to reshape Mat: {e}")))?;

        let mut gray = Mat::default();
        imgproc::cvt_color(
            &mat,
            &mut gray,
            imgproc::COLOR_RGB2GRAY,
            0,
            opencv::core::AlgorithmHint::ALGO_HINT_DEFAULT,
        )
        .map_err(|e| {
            BoothError::FaceDetection(format!("Failed to convert to grayscale: {e}"))
        })?;

        let mut faces = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &gray,
                &mut faces,
                1.1, // scale factor
                5,   // min neighbors
                0,   // flags
                Size::new(self.min_face_size, self.min_face_size),
                Size::new(0, 0), // no upper bound
            )
            .map_err(|e| BoothError::FaceDetection(format!("Face detection failed: {e}")))?;

        let mut rects: Vec<Rect> = faces.iter().collect();
        rects.sort_by_key(|r| std::cmp::Reverse(r.width * r.height));

        let mut crops = Vec::with_capacity(rects.len());
        for rect in rects {
            match Self::extract_face_region(&gray, rect) {
                Ok(crop) => crops.push(crop),
                Err(e) => warn!("Failed to extract face region: {}", e),
            }
        }
        Ok(crops)
    }

    /// Extracts and crops a face region from the grayscale image
    fn extract_face_region(gray: &Mat, rect: Rect) -> Result<FaceCrop> {
        let face_roi = Mat::roi(gray, rect)
            .map_err(|e| BoothError::FaceDetection(format!("Failed to crop face region: {e}")))?;

        // Clone so the Mat is continuous in memory
        let face_continuous = face_roi
            .try_clone()
            .map_err(|e| BoothError::FaceDetection(format!("Failed to clone face ROI: {e}")))?;

        let data = face_continuous
            .data_bytes()
            .map_err(|e| BoothError::FaceDetection(format!("Failed to get face data: {e}")))?;

        Ok(FaceCrop {
            data: data.to_vec(),
            height: rect.height as u32,
        })
    }
}

/// Resizes a face crop to the classifier input and normalizes it to [0, 1], HWC RGB
fn preprocess_face(face: &FaceCrop, input_size: usize) -> Result<Vec<f32>> {
    let face_mat = Mat::from_slice(&face.data)
        .map_err(|e| BoothError::FrameProcessing(format!("Failed to create face Mat: {e}")))?;

    let face_mat = face_mat
        .reshape(1, face.height as i32)
        .map_err(|e| BoothError::FrameProcessing(format!("Failed to reshape face Mat: {e}")))?;

    // The classifier expects RGB
    let mut rgb_mat = Mat::default();
    imgproc::cvt_color_def(&face_mat, &mut rgb_mat, imgproc::COLOR_GRAY2RGB)
        .map_err(|e| BoothError::FrameProcessing(format!("Failed to convert to RGB: {e}")))?;

    let mut resized = Mat::default();
    imgproc::resize(
        &rgb_mat,
        &mut resized,
        Size::new(input_size as i32, input_size as i32),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )
    .map_err(|e| BoothError::FrameProcessing(format!("Failed to resize face: {e}")))?;

    let data = resized
        .data_bytes()
        .map_err(|e| BoothError::FrameProcessing(format!("Failed to get resized data: {e}")))?;

    Ok(data.iter().map(|&pixel| pixel as f32 / 255.0).collect())
}

/// Converts HWC pixel data into the CHW layout the classifier takes
fn hwc_to_chw(hwc: &[f32], size: usize, channels: usize) -> Vec<f32> {
    let mut chw = vec![0.0f32; channels * size * size];
    for h in 0..size {
        for w in 0..size {
            for c in 0..channels {
                chw[c * size * size + h * size + w] = hwc[(h * size + w) * channels + c];
            }
        }
    }
    chw
}

/// Turns classifier logits into per-expression probabilities.
///
/// Output layout: 0=angry, 1=disgust, 2=fear, 3=happy, 4=sad, 5=surprise,
/// 6=neutral, 7=contempt (optional, folded into disgusted).
fn scores_from_logits(logits: &[f32]) -> Result<ExpressionScores> {
    if logits.len() < 7 {
        return Err(BoothError::OnnxRuntime(format!(
            "Expected at least 7 outputs, got {}",
            logits.len()
        )));
    }
    if logits.len() > 8 {
        warn!(outputs = logits.len(), "ignoring extra classifier outputs");
    }

    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
    let probabilities: Vec<f64> = logits
        .iter()
        .map(|&x| f64::from((x - max_logit).exp() / exp_sum))
        .collect();
    let contempt = probabilities.get(7).copied().unwrap_or(0.0);

    Ok(Expression::ALL
        .into_iter()
        .map(|expression| {
            let score = match expression {
                Expression::Angry => probabilities[0],
                Expression::Disgusted => probabilities[1] + contempt,
                Expression::Fearful => probabilities[2],
                Expression::Happy => probabilities[3],
                Expression::Sad => probabilities[4],
                Expression::Surprised => probabilities[5],
                Expression::Neutral => probabilities[6],
            };
            (expression.label(), score)
        })
        .collect())
}

/// Expression classifier using ONNX Runtime
pub struct ExpressionClassifier {
    session: Session,
    input_size: usize,
}

impl ExpressionClassifier {
    /// Creates a new ExpressionClassifier by loading the ONNX model
    pub fn new(model_path: &str, input_size: usize) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e| BoothError::ModelLoad(format!("Failed to create session builder: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                error!("Failed to load ONNX model: {}", e);
                BoothError::ModelLoad(format!("ONNX model load failed: {e}"))
            })?;

        Ok(Self {
            session,
            input_size,
        })
    }

    /// Scores every expression for one preprocessed face
    fn classify(&mut self, preprocessed_face: &[f32]) -> Result<ExpressionScores> {
        let size = self.input_size;
        let chw_data = hwc_to_chw(preprocessed_face, size, 3);

        let input_array = ndarray::Array4::from_shape_vec((1, 3, size, size), chw_data)
            .map_err(|e| BoothError::OnnxRuntime(format!("Failed to create input array: {e}")))?;

        let input_tensor = Value::from_array(input_array)
            .map_err(|e| BoothError::OnnxRuntime(format!("Failed to create input tensor: {e}")))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| {
                error!("ONNX inference failed: {}", e);
                BoothError::OnnxRuntime(format!("Inference failed: {e}"))
            })?;

        let (_, output_value) = outputs
            .iter()
            .next()
            .ok_or_else(|| BoothError::OnnxRuntime("No output from model".to_string()))?;

        let (_, logits) = output_value.try_extract_tensor::<f32>().map_err(|e| {
            BoothError::OnnxRuntime(format!("Failed to extract output tensor: {e}"))
        })?;

        scores_from_logits(logits)
    }
}

struct Models {
    faces: FaceDetector,
    classifier: ExpressionClassifier,
}

impl Models {
    fn analyze(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let crops = self.faces.detect_faces(frame)?;
        let mut faces = Vec::with_capacity(crops.len());
        for crop in &crops {
            let preprocessed = preprocess_face(crop, self.classifier.input_size)?;
            let expressions = self.classifier.classify(&preprocessed)?;
            faces.push(FaceExpressions::new(expressions));
        }
        Ok(DetectionResult::new(faces))
    }
}

/// Cascade + ONNX detector; inference runs on the blocking pool
pub struct OnnxExpressionDetector {
    config: ModelConfig,
    models: Arc<Mutex<Option<Models>>>,
}

impl OnnxExpressionDetector {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            models: Arc::new(Mutex::new(None)),
        }
    }
}

fn poisoned<T>(_: T) -> BoothError {
    BoothError::FaceDetection("model lock poisoned".to_string())
}

#[async_trait]
impl ExpressionDetector for OnnxExpressionDetector {
    async fn load_models(&self) -> Result<()> {
        let config = self.config.clone();
        let loaded = tokio::task::spawn_blocking(move || -> Result<Models> {
            let faces = FaceDetector::new(
                &config.face_cascade.to_string_lossy(),
                config.min_face_size,
            )?;
            let classifier = ExpressionClassifier::new(
                &config.expression_model.to_string_lossy(),
                config.input_size,
            )?;
            Ok(Models { faces, classifier })
        })
        .await
        .map_err(|e| BoothError::ModelLoad(format!("Model loader stopped: {e}")))??;

        *self.models.lock().map_err(poisoned)? = Some(loaded);
        info!(
            cascade = %self.config.face_cascade.display(),
            model = %self.config.expression_model.display(),
            "expression models loaded"
        );
        Ok(())
    }

    async fn detect(&self, frame: &Frame) -> Result<DetectionResult> {
        let models = Arc::clone(&self.models);
        let frame = frame.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = models.lock().map_err(poisoned)?;
            let models = guard
                .as_mut()
                .ok_or_else(|| BoothError::ModelLoad("models are not loaded".to_string()))?;
            models.analyze(&frame)
        })
        .await
        .map_err(|e| BoothError::FaceDetection(format!("Detection worker stopped: {e}")))?
    }
}
