//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the image into a 640×640 input, decodes the anchor-free
//! outputs of the three stride levels, and removes duplicates with NMS.

use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const INPUT_SIZE: u32 = 640;
const INPUT_MEAN: f32 = 127.5;
const INPUT_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("detector model has {0} outputs, expected 9 (score/bbox/kps per stride)")]
    UnexpectedOutputs(usize),
    #[error("image is empty")]
    EmptyImage,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and offset that fit a source image into the square model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
    width: u32,
    height: u32,
}

impl Letterbox {
    fn fit(src_width: u32, src_height: u32, size: u32) -> Self {
        let scale = (size as f32 / src_width as f32).min(size as f32 / src_height as f32);
        let width = ((src_width as f32 * scale).round() as u32).clamp(1, size);
        let height = ((src_height as f32 * scale).round() as u32).clamp(1, size);
        Self {
            scale,
            pad_x: (size - width) / 2,
            pad_y: (size - height) / 2,
            width,
            height,
        }
    }

    /// Model-input coordinates → source-image coordinates.
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Output tensor positions for one stride level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

pub struct FaceDetector {
    session: Session,
    outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(path = %model_path.display(), outputs = ?names, "loaded SCRFD model");

        if names.len() < 9 {
            return Err(DetectorError::UnexpectedOutputs(names.len()));
        }

        let outputs = map_outputs(&names);
        tracing::debug!(?outputs, "SCRFD output mapping");

        Ok(Self { session, outputs })
    }

    /// Detect faces, highest confidence first.
    pub fn detect(&mut self, image: &GrayImage) -> Result<Vec<FaceRegion>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectorError::EmptyImage);
        }
        let (input, letterbox) = to_tensor(image);

        let results = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in STRIDES.iter().enumerate() {
            let map = self.outputs[slot];
            let (_, scores) = results[map.score]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores/{stride}: {e}")))?;
            let (_, bboxes) = results[map.bbox]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes/{stride}: {e}")))?;
            let (_, kps) = results[map.kps]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps/{stride}: {e}")))?;

            candidates.extend(decode_stride(scores, bboxes, kps, stride, &letterbox));
        }

        let faces = suppress_overlaps(candidates, NMS_THRESHOLD);
        tracing::debug!(count = faces.len(), "faces detected");
        Ok(faces)
    }
}

/// Locate each stride's tensors by name (`score_8`, `bbox_16`, `kps_32`, ...),
/// falling back to the export order [scores 8/16/32, bboxes 8/16/32, kps 8/16/32].
fn map_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |kind: &str, stride: usize| {
        let target = format!("{kind}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputs>> = STRIDES
        .iter()
        .map(|&stride| {
            Some(StrideOutputs {
                score: find("score", stride)?,
                bbox: find("bbox", stride)?,
                kps: find("kps", stride)?,
            })
        })
        .collect();

    match named.and_then(|v| <[StrideOutputs; 3]>::try_from(v).ok()) {
        Some(outputs) => outputs,
        None => {
            tracing::info!(?names, "SCRFD output names not recognized; using positional mapping");
            std::array::from_fn(|i| StrideOutputs {
                score: i,
                bbox: i + 3,
                kps: i + 6,
            })
        }
    }
}

/// Grayscale image → letterboxed NCHW tensor. Padding is left at 0.0,
/// which is the normalized value of the mean.
fn to_tensor(image: &GrayImage) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height(), INPUT_SIZE);
    let resized = imageops::resize(image, letterbox.width, letterbox.height, FilterType::Triangle);

    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let v = (pixel.0[0] as f32 - INPUT_MEAN) / INPUT_STD;
        let tx = (x + letterbox.pad_x) as usize;
        let ty = (y + letterbox.pad_y) as usize;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = v;
        }
    }

    (tensor, letterbox)
}

/// Decode candidates above the score threshold for one stride level.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<FaceRegion> {
    let grid_w = INPUT_SIZE as usize / stride;
    let grid_h = INPUT_SIZE as usize / stride;
    let step = stride as f32;

    let mut faces = Vec::new();
    for idx in 0..grid_w * grid_h * ANCHORS_PER_CELL {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= SCORE_THRESHOLD {
            continue;
        }
        let Some(b) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / ANCHORS_PER_CELL;
        let ax = (cell % grid_w) as f32 * step;
        let ay = (cell / grid_w) as f32 * step;

        let (x1, y1) = letterbox.to_source(ax - b[0] * step, ay - b[1] * step);
        let (x2, y2) = letterbox.to_source(ax + b[2] * step, ay + b[3] * step);

        let landmarks: Option<[(f32, f32); 5]> = kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| letterbox.to_source(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step))
        });

        faces.push(FaceRegion {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }
    faces
}

/// Greedy NMS: keep the most confident region, drop anything overlapping it.
fn suppress_overlaps(mut candidates: Vec<FaceRegion>, iou_threshold: f32) -> Vec<FaceRegion> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<FaceRegion> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn region(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: w,
            height: h,
            confidence,
            landmarks: None,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let kept = suppress_overlaps(
            vec![
                region(5.0, 5.0, 100.0, 100.0, 0.8),
                region(200.0, 200.0, 50.0, 50.0, 0.7),
                region(0.0, 0.0, 100.0, 100.0, 0.9),
            ],
            NMS_THRESHOLD,
        );
        let confidences: Vec<f32> = kept.iter().map(|f| f.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn test_nms_keeps_disjoint() {
        let kept = suppress_overlaps(
            vec![region(0.0, 0.0, 10.0, 10.0, 0.6), region(50.0, 50.0, 10.0, 10.0, 0.8)],
            NMS_THRESHOLD,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.8);
        assert!(suppress_overlaps(Vec::new(), NMS_THRESHOLD).is_empty());
    }

    #[test]
    fn test_letterbox_maps_back() {
        let lb = Letterbox::fit(320, 240, INPUT_SIZE);
        assert_eq!((lb.width, lb.height), (640, 480));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 80));

        let (x, y) = lb.to_source(100.0 * lb.scale, 50.0 * lb.scale + 80.0);
        assert!((x - 100.0).abs() < 1e-3 && (y - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_tensor_padding_is_zero() {
        let image = GrayImage::from_pixel(320, 160, Luma([255]));
        let (tensor, lb) = to_tensor(&image);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(lb.pad_y, 160);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        let inside = tensor[[0, 1, 320, 320]];
        assert!((inside - (255.0 - INPUT_MEAN) / INPUT_STD).abs() < 1e-5);
    }

    #[test]
    fn test_decode_single_anchor() {
        // Stride 32 → 20×20 grid; anchor cell at row 5, column 10.
        let stride = 32;
        let anchors = 20 * 20 * ANCHORS_PER_CELL;
        let idx = (5 * 20 + 10) * ANCHORS_PER_CELL;

        let mut scores = vec![0.0f32; anchors];
        scores[idx] = 0.9;
        let mut bboxes = vec![0.0f32; anchors * 4];
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
        let kps = vec![0.0f32; anchors * 10];

        let identity = Letterbox { scale: 1.0, pad_x: 0, pad_y: 0, width: 640, height: 640 };
        let faces = decode_stride(&scores, &bboxes, &kps, stride, &identity);

        assert_eq!(faces.len(), 1);
        let f = &faces[0];
        assert_eq!((f.x, f.y, f.width, f.height), (288.0, 128.0, 64.0, 64.0));
        assert_eq!(f.landmarks.unwrap()[2], (320.0, 160.0));
    }

    #[test]
    fn test_decode_ignores_low_scores() {
        let anchors = 80 * 80 * ANCHORS_PER_CELL;
        let scores = vec![SCORE_THRESHOLD; anchors];
        let bboxes = vec![1.0f32; anchors * 4];
        let identity = Letterbox { scale: 1.0, pad_x: 0, pad_y: 0, width: 640, height: 640 };
        assert!(decode_stride(&scores, &bboxes, &[], 8, &identity).is_empty());
    }

    #[test]
    fn test_map_outputs_named() {
        let outputs = map_outputs(&names(&[
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32", "score_32",
        ]));
        assert_eq!(outputs[0], StrideOutputs { score: 2, bbox: 0, kps: 1 });
        assert_eq!(outputs[2], StrideOutputs { score: 8, bbox: 6, kps: 7 });
    }

    #[test]
    fn test_map_outputs_positional_fallback() {
        let generic: Vec<String> = (0..9).map(|i: usize| (428 + i).to_string()).collect();
        let outputs = map_outputs(&generic);
        assert_eq!(outputs[1], StrideOutputs { score: 1, bbox: 4, kps: 7 });
    }

    #[test]
    fn test_missing_model_is_reported() {
        let err = FaceDetector::load(Path::new("/nonexistent/det_10g.onnx")).err().unwrap();
        assert!(matches!(err, DetectorError::ModelNotFound(_)));
    }
}
