//! Scripted engine and fixtures shared by the controller and shell tests.

use crate::annotate::DisplayGeometry;
use crate::app::App;
use facetag_core::{EngineError, FaceRegion, FeatureComparer, VisionEngine};
use facetag_store::SqliteStore;
use image::{GrayImage, Rgb, RgbImage};
use std::path::PathBuf;
use tempfile::TempDir;

pub const LEN: usize = 4;

/// Reports one face per scripted feature and hands the features out one per
/// extraction call. Two features are similar exactly when their first bytes
/// match.
pub struct ScriptedEngine {
    pub faces: Vec<FaceRegion>,
    pub features: Vec<Option<Vec<u8>>>,
    extracted: usize,
}

impl ScriptedEngine {
    pub fn new(features: Vec<Option<Vec<u8>>>) -> Self {
        let faces = (0..features.len())
            .map(|i| FaceRegion {
                x: 4.0 + 20.0 * i as f32,
                y: 4.0,
                width: 16.0,
                height: 16.0,
                confidence: 0.9 - 0.1 * i as f32,
                landmarks: None,
            })
            .collect();
        Self {
            faces,
            features,
            extracted: 0,
        }
    }
}

impl FeatureComparer for ScriptedEngine {
    fn compare_features(&self, a: &[u8], b: &[u8]) -> f32 {
        if a.first() == b.first() {
            1.0
        } else {
            0.1
        }
    }
}

impl VisionEngine for ScriptedEngine {
    fn detect_faces(&mut self, _image: &GrayImage) -> Result<Vec<FaceRegion>, EngineError> {
        Ok(self.faces.clone())
    }

    fn extract_feature(
        &mut self,
        _image: &GrayImage,
        _face: &FaceRegion,
    ) -> Result<Option<Vec<u8>>, EngineError> {
        let feature = self.features.get(self.extracted).cloned().flatten();
        self.extracted += 1;
        Ok(feature)
    }

    fn feature_len(&self) -> usize {
        LEN
    }
}

pub fn feature(tag: u8) -> Option<Vec<u8>> {
    Some(vec![tag; LEN])
}

/// Controller over an in-memory store with threshold 0.5.
pub fn app(engine: ScriptedEngine) -> App<ScriptedEngine> {
    let store = SqliteStore::open_in_memory(LEN).unwrap();
    App::new(engine, Box::new(store), 0.5, DisplayGeometry::default())
}

/// Write a flat 64×48 PNG into `dir`.
pub fn write_image(dir: &TempDir, file: &str) -> PathBuf {
    let path = dir.path().join(file);
    RgbImage::from_pixel(64, 48, Rgb([90, 90, 90])).save(&path).unwrap();
    path
}
