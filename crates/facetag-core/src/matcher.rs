//! Nearest-match lookup over a gallery snapshot.

use crate::engine::FeatureComparer;
use facetag_store::FeatureRecord;
use serde::Serialize;

/// Label shown for a face that matched nobody.
pub const UNKNOWN_LABEL: &str = "?";

/// Result of matching a probe feature against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Name of the matched record; `None` is the unknown sentinel.
    pub name: Option<String>,
    /// Score of the match, or the best score seen when nothing matched.
    pub similarity: f32,
}

impl MatchResult {
    pub fn unknown(best_seen: f32) -> Self {
        Self {
            name: None,
            similarity: best_seen,
        }
    }

    pub fn is_known(&self) -> bool {
        self.name.is_some()
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}

/// Find the best-scoring record whose similarity reaches `threshold`.
///
/// Linear scan in gallery order. Only a strictly higher score replaces the
/// current best, so the earliest record wins ties. An empty probe or empty
/// gallery yields the unknown sentinel.
pub fn lookup<C: FeatureComparer + ?Sized>(
    comparer: &C,
    probe: &[u8],
    gallery: &[FeatureRecord],
    threshold: f32,
) -> MatchResult {
    if probe.is_empty() {
        return MatchResult::unknown(0.0);
    }

    let mut best: Option<(&FeatureRecord, f32)> = None;
    let mut best_seen = 0.0f32;

    for record in gallery {
        let similarity = comparer.compare_features(probe, &record.feature);
        best_seen = best_seen.max(similarity);

        if similarity.is_nan() || similarity < threshold {
            continue;
        }
        if best.map_or(true, |(_, s)| similarity > s) {
            tracing::debug!(name = %record.name, similarity, "candidate match");
            best = Some((record, similarity));
        }
    }

    match best {
        Some((record, similarity)) => MatchResult {
            name: Some(record.name.clone()),
            similarity,
        },
        None => MatchResult::unknown(best_seen),
    }
}
