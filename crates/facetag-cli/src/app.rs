//! Application controller: wires the recognize and register actions to the
//! vision engine and the feature store.

use crate::annotate::{self, DisplayGeometry, PixelRect};
use facetag_core::{lookup, EngineError, FaceRegion, MatchResult, VisionEngine};
use facetag_store::{FeatureStore, StoreError, MAX_NAME_LEN};
use image::{DynamicImage, RgbImage};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("vision engine: {0}")]
    Engine(#[from] EngineError),
    #[error("feature store: {0}")]
    Store(#[from] StoreError),
}

/// Why an action stopped without producing a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ImageUnreadable,
    NoFace,
    LowConfidence,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::ImageUnreadable => "image could not be loaded",
            SkipReason::NoFace => "no face detected",
            SkipReason::LowConfidence => "face too uncertain to extract a feature",
        })
    }
}

/// One recognized (or unrecognized) face.
#[derive(Debug, Clone, Serialize)]
pub struct FaceAnnotation {
    pub index: usize,
    pub region: FaceRegion,
    /// Frame drawn on the preview; `None` if it fell outside.
    pub frame: Option<PixelRect>,
    #[serde(rename = "match")]
    pub result: MatchResult,
}

impl FaceAnnotation {
    pub fn label(&self) -> &str {
        self.result.label()
    }
}

pub enum RecognizeOutcome {
    Skipped(SkipReason),
    Annotated {
        annotations: Vec<FaceAnnotation>,
        preview: RgbImage,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Skipped(SkipReason),
    Registered { name: String },
}

pub struct App<E> {
    engine: E,
    store: Box<dyn FeatureStore>,
    threshold: f32,
    display: DisplayGeometry,
}

impl<E: VisionEngine> App<E> {
    pub fn new(engine: E, store: Box<dyn FeatureStore>, threshold: f32, display: DisplayGeometry) -> Self {
        Self {
            engine,
            store,
            threshold,
            display,
        }
    }

    pub fn store(&self) -> &dyn FeatureStore {
        self.store.as_ref()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    /// Detect every face in the image at `path` and label it.
    ///
    /// Faces are processed in detection order. After each one is drawn on
    /// the preview, `on_face` runs, so the caller can show progress before
    /// the next face is extracted.
    pub fn recognize(
        &mut self,
        path: &Path,
        mut on_face: impl FnMut(&FaceAnnotation),
    ) -> Result<RecognizeOutcome, AppError> {
        let Some(image) = load_image(path) else {
            return Ok(RecognizeOutcome::Skipped(SkipReason::ImageUnreadable));
        };

        let ratio = annotate::preview_ratio(image.width(), image.height(), &self.display);
        let mut preview = annotate::scale_preview(&image.to_rgb8(), ratio);

        let gray = image.to_luma8();
        let faces = self.engine.detect_faces(&gray)?;
        tracing::info!(path = %path.display(), faces = faces.len(), "recognize");
        if faces.is_empty() {
            return Ok(RecognizeOutcome::Skipped(SkipReason::NoFace));
        }

        let mut annotations = Vec::with_capacity(faces.len());
        for (index, face) in faces.into_iter().enumerate() {
            // Low confidence leaves an empty probe, which never matches.
            let feature = self.engine.extract_feature(&gray, &face)?.unwrap_or_default();
            let result = lookup(&self.engine, &feature, self.store.features(), self.threshold);

            let frame = annotate::draw_face_frame(
                &mut preview,
                annotate::face_rect(&face, ratio),
                result.label(),
                result.is_known(),
            );
            tracing::debug!(index, label = result.label(), similarity = result.similarity, "face labelled");

            let annotation = FaceAnnotation {
                index,
                region: face,
                frame,
                result,
            };
            on_face(&annotation);
            annotations.push(annotation);
        }

        Ok(RecognizeOutcome::Annotated {
            annotations,
            preview,
        })
    }

    /// Register the most confident face in the image at `path`.
    ///
    /// The name defaults to the file name up to its first dot, cut to
    /// [`MAX_NAME_LEN`] characters.
    pub fn register(&mut self, path: &Path, name: Option<&str>) -> Result<RegisterOutcome, AppError> {
        let Some(image) = load_image(path) else {
            return Ok(RegisterOutcome::Skipped(SkipReason::ImageUnreadable));
        };

        let gray = image.to_luma8();
        let faces = self.engine.detect_faces(&gray)?;
        let Some(face) = faces.first() else {
            tracing::info!(path = %path.display(), "register: no face detected");
            return Ok(RegisterOutcome::Skipped(SkipReason::NoFace));
        };

        let Some(feature) = self.engine.extract_feature(&gray, face)? else {
            return Ok(RegisterOutcome::Skipped(SkipReason::LowConfidence));
        };

        let name = match name {
            Some(n) => n.to_string(),
            None => name_from_path(path),
        };

        if let Err(e) = self.store.add(&name, feature) {
            tracing::warn!(name = %name, rejected = e.is_rejected(), error = %e, "registration failed");
            return Err(e.into());
        }
        tracing::info!(name = %name, total = self.store.features().len(), "registered face");
        Ok(RegisterOutcome::Registered { name })
    }
}

fn load_image(path: &Path) -> Option<DynamicImage> {
    match image::open(path) {
        Ok(image) => Some(image),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to load image");
            None
        }
    }
}

/// `photos/alice.smith.jpg` → `alice`, truncated to [`MAX_NAME_LEN`] characters.
pub fn name_from_path(path: &Path) -> String {
    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let base = file_name.split('.').next().unwrap_or_default();
    base.chars().take(MAX_NAME_LEN).collect()
}
