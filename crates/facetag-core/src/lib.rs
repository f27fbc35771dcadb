//! facetag-core — Face detection, feature extraction and matching.
//!
//! The rest of the workspace talks to face recognition only through the
//! [`VisionEngine`] trait. The bundled implementation, [`OnnxEngine`], runs
//! SCRFD for detection and ArcFace for recognition on ONNX Runtime.

pub mod alignment;
pub mod codec;
pub mod detector;
pub mod engine;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use codec::DEFAULT_FEATURE_LEN;
pub use engine::{EngineConfig, EngineError, FeatureComparer, OnnxEngine, VisionEngine};
pub use facetag_store::FeatureRecord;
pub use matcher::{lookup, MatchResult, UNKNOWN_LABEL};
pub use types::{Embedding, FaceRegion};
