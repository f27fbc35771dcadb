//! The vision engine boundary and its ONNX implementation.

use crate::codec::{self, DEFAULT_FEATURE_LEN};
use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::FaceRegion;
use image::GrayImage;
use std::path::PathBuf;
use thiserror::Error;

/// Faces narrower or shorter than this, in pixels, are too small to extract.
const MIN_FACE_SIZE: f32 = 16.0;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Scores two feature blobs against each other.
pub trait FeatureComparer {
    /// Similarity in [0, 1]. Higher = more alike.
    fn compare_features(&self, a: &[u8], b: &[u8]) -> f32;
}

/// Detection, feature extraction and comparison.
pub trait VisionEngine: FeatureComparer {
    /// Faces in `image`, most confident first.
    fn detect_faces(&mut self, image: &GrayImage) -> Result<Vec<FaceRegion>, EngineError>;

    /// Feature blob for one detected face.
    ///
    /// `Ok(None)` means the engine is not confident enough in this face to
    /// produce a usable feature. That is an expected outcome, not an error.
    fn extract_feature(
        &mut self,
        image: &GrayImage,
        face: &FaceRegion,
    ) -> Result<Option<Vec<u8>>, EngineError>;

    /// Length of every blob `extract_feature` returns.
    fn feature_len(&self) -> usize;
}

/// Model locations and extraction policy for [`OnnxEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
    /// Detection confidence below which extraction reports low confidence.
    pub min_confidence: f32,
}

/// SCRFD + ArcFace on ONNX Runtime.
pub struct OnnxEngine {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    min_confidence: f32,
}

impl OnnxEngine {
    /// Load both models. Fails fast if either is missing or unloadable.
    pub fn load(config: &EngineConfig) -> Result<Self, EngineError> {
        let detector = FaceDetector::load(&config.detector_model)?;
        let recognizer = FaceRecognizer::load(&config.recognizer_model)?;
        tracing::info!(min_confidence = config.min_confidence, "vision engine ready");

        Ok(Self {
            detector,
            recognizer,
            min_confidence: config.min_confidence,
        })
    }
}

/// Whether a detection is good enough to extract a feature from.
fn extractable(face: &FaceRegion, min_confidence: f32) -> bool {
    face.confidence >= min_confidence && face.width >= MIN_FACE_SIZE && face.height >= MIN_FACE_SIZE
}

impl FeatureComparer for OnnxEngine {
    fn compare_features(&self, a: &[u8], b: &[u8]) -> f32 {
        codec::compare(a, b)
    }
}

impl VisionEngine for OnnxEngine {
    fn detect_faces(&mut self, image: &GrayImage) -> Result<Vec<FaceRegion>, EngineError> {
        Ok(self.detector.detect(image)?)
    }

    fn extract_feature(
        &mut self,
        image: &GrayImage,
        face: &FaceRegion,
    ) -> Result<Option<Vec<u8>>, EngineError> {
        if !extractable(face, self.min_confidence) {
            tracing::debug!(
                confidence = face.confidence,
                width = face.width,
                height = face.height,
                "face feature low confidence"
            );
            return Ok(None);
        }

        let embedding = self.recognizer.embed(image, face)?;
        Ok(Some(codec::encode(&embedding)))
    }

    fn feature_len(&self) -> usize {
        DEFAULT_FEATURE_LEN
    }
}
