//! ArcFace face recognizer via ONNX Runtime.
//!
//! Turns an aligned 112×112 face crop into a 512-dimensional L2-normalized
//! embedding (w600k_r50 model).

use crate::alignment::{self, ALIGNED_SIZE};
use crate::types::{Embedding, FaceRegion};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const INPUT_MEAN: f32 = 127.5;
const INPUT_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
pub const EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognizer model not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("face has no landmarks; the detector must supply them for alignment")]
    NoLandmarks,
    #[error("expected a 512-dim embedding, got {0} values")]
    BadEmbedding(usize),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Align `face` within `image` and compute its embedding.
    pub fn embed(&mut self, image: &GrayImage, face: &FaceRegion) -> Result<Embedding, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let aligned = alignment::align_face(image, landmarks);
        let input = to_tensor(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(RecognizerError::BadEmbedding(raw.len()));
        }

        Ok(Embedding { values: raw.to_vec() }.normalized())
    }
}

/// Aligned grayscale crop → NCHW float tensor, Y replicated into R, G and B.
fn to_tensor(aligned: &GrayImage) -> Array4<f32> {
    let size = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        let v = (pixel.0[0] as f32 - INPUT_MEAN) / INPUT_STD;
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = v;
        }
    }
    tensor
}
