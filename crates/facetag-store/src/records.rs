//! In-memory mirror shared by every backend: validation, skip-on-load, append.

use crate::{StoreError, MAX_NAME_LEN};

/// A registered identity and its engine-specific feature blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRecord {
    pub name: String,
    pub feature: Vec<u8>,
}

/// Ordered, append-only collection of valid records with a fixed feature length.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    records: Vec<FeatureRecord>,
    feature_len: usize,
}

impl FeatureSet {
    pub fn new(feature_len: usize) -> Self {
        Self {
            records: Vec::new(),
            feature_len,
        }
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    /// Validate a record before it is handed to a backend.
    pub fn check(&self, name: &str, feature: &[u8]) -> Result<(), StoreError> {
        if feature.is_empty() {
            return Err(StoreError::EmptyFeature);
        }
        if feature.len() != self.feature_len {
            return Err(StoreError::FeatureLength {
                expected: self.feature_len,
                actual: feature.len(),
            });
        }
        let chars = name.chars().count();
        if chars == 0 || chars > MAX_NAME_LEN {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Append a record whose write has already succeeded.
    pub fn push(&mut self, name: &str, feature: Vec<u8>) {
        self.records.push(FeatureRecord {
            name: name.to_string(),
            feature,
        });
    }

    /// Accept or skip one row read back from a backend.
    ///
    /// `None` stands for a NULL or wrongly-typed column. Returns whether the
    /// row was kept.
    pub fn load_row(&mut self, id: i64, name: Option<String>, feature: Option<Vec<u8>>) -> bool {
        let (Some(name), Some(feature)) = (name, feature) else {
            tracing::warn!(id, "skipping feature row with missing name or feature");
            return false;
        };
        if name.is_empty() || feature.len() != self.feature_len {
            tracing::warn!(
                id,
                name = %name,
                len = feature.len(),
                expected = self.feature_len,
                "skipping malformed feature row"
            );
            return false;
        }
        self.records.push(FeatureRecord { name, feature });
        true
    }

    /// Log what a freshly loaded store contains.
    pub fn log_loaded(&self, backend: &str) {
        tracing::info!(backend, count = self.records.len(), "feature store loaded");
        tracing::debug!(
            names = ?self.records.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            "registered identities"
        );
    }
}
