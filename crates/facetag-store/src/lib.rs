//! facetag-store — Persistent gallery of named face features.
//!
//! A store is a single `features` table of `(id, name, feature)` rows that is
//! loaded into memory once at construction and only ever appended to.
//! Callers scan the in-memory snapshot; every successful `add` is mirrored
//! into it after the row has been written.

mod records;
mod sqlite;

#[cfg(feature = "mysql")]
mod mysql_store;

pub use records::{FeatureRecord, FeatureSet};
pub use sqlite::SqliteStore;

#[cfg(feature = "mysql")]
pub use mysql_store::MySqlStore;

use thiserror::Error;

/// Longest accepted identity name, in characters (`VARCHAR(32)` column).
pub const MAX_NAME_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("refusing to store an empty feature")]
    EmptyFeature,
    #[error("feature is {actual} bytes, store expects {expected}")]
    FeatureLength { expected: usize, actual: usize },
    #[error("invalid name {0:?}: must be 1 to 32 characters")]
    InvalidName(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[cfg(feature = "mysql")]
    #[error("mysql: {0}")]
    MySql(#[from] mysql::Error),
}

impl StoreError {
    /// True for errors raised before anything reached the backend.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            StoreError::EmptyFeature | StoreError::FeatureLength { .. } | StoreError::InvalidName(_)
        )
    }
}

/// Append-only gallery of `(name, feature)` records.
///
/// Implementations open their backend and load every valid row at
/// construction; failing to do so is a startup error. After that, `add` is
/// the only mutation and leaves the snapshot untouched when it fails.
pub trait FeatureStore {
    /// Persist a record, then append it to the in-memory snapshot.
    fn add(&mut self, name: &str, feature: Vec<u8>) -> Result<(), StoreError>;

    /// All records in insertion order.
    fn features(&self) -> &[FeatureRecord];

    /// Byte length every stored feature must have.
    fn feature_len(&self) -> usize;

    /// Short backend name for diagnostics.
    fn backend(&self) -> &'static str;
}
