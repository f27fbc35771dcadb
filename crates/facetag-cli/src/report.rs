//! Console rendering of action results.

use crate::app::{FaceAnnotation, RegisterOutcome};
use facetag_store::FeatureStore;
use serde_json::json;

pub fn face_line(a: &FaceAnnotation) -> String {
    let r = &a.region;
    let mut line = format!(
        "face {}: {} (similarity {:.3}) at {:.0},{:.0} {:.0}x{:.0}",
        a.index,
        a.label(),
        a.result.similarity,
        r.x,
        r.y,
        r.width,
        r.height,
    );
    if let Some(roll) = r.orientation() {
        line.push_str(&format!(" roll {roll:.0}°"));
    }
    line
}

pub fn register_line(outcome: &RegisterOutcome) -> String {
    match outcome {
        RegisterOutcome::Registered { name } => format!("registered {name}"),
        RegisterOutcome::Skipped(reason) => format!("not registered: {reason}"),
    }
}

/// Registered names in insertion order, one per line.
pub fn list_lines(store: &dyn FeatureStore) -> Vec<String> {
    store
        .features()
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{i:>4}  {}", r.name))
        .collect()
}

pub fn list_json(store: &dyn FeatureStore) -> serde_json::Value {
    json!({
        "backend": store.backend(),
        "feature_len": store.feature_len(),
        "names": store.features().iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
    })
}
