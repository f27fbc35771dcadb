//! Feature blob format for [`Embedding`]s.
//!
//! ```text
//! +---------+-------------+---------------------------+
//! | "FTv1"  | dim: u32 LE | dim x f32 LE              |
//! +---------+-------------+---------------------------+
//! ```

use crate::recognizer::EMBEDDING_DIM;
use crate::types::Embedding;
use thiserror::Error;

const MAGIC: [u8; 4] = *b"FTv1";
const HEADER_LEN: usize = 8;

/// Blob length for an embedding of `dim` values.
pub const fn feature_len(dim: usize) -> usize {
    HEADER_LEN + dim * std::mem::size_of::<f32>()
}

/// Blob length produced by the bundled ArcFace engine.
pub const DEFAULT_FEATURE_LEN: usize = feature_len(EMBEDDING_DIM);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("feature blob too short: {0} bytes")]
    Truncated(usize),
    #[error("feature blob has an unknown header")]
    BadMagic,
    #[error("feature blob is {actual} bytes, header implies {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

pub fn encode(embedding: &Embedding) -> Vec<u8> {
    let mut out = Vec::with_capacity(feature_len(embedding.values.len()));
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&(embedding.values.len() as u32).to_le_bytes());
    for v in &embedding.values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn decode(bytes: &[u8]) -> Result<Embedding, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated(bytes.len()));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    if header[..4] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let dim = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let expected = feature_len(dim);
    if bytes.len() != expected {
        return Err(CodecError::LengthMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    let values = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(Embedding { values })
}

/// Similarity of two blobs in [0, 1].
///
/// Cosine similarity with negative scores clamped to zero. Blobs that do not
/// decode, or that disagree on dimension, score 0.0.
pub fn compare(a: &[u8], b: &[u8]) -> f32 {
    match (decode(a), decode(b)) {
        (Ok(a), Ok(b)) if a.values.len() == b.values.len() => a.similarity(&b).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(values: &[f32]) -> Vec<u8> {
        encode(&Embedding { values: values.to_vec() })
    }

    #[test]
    fn test_default_length() {
        assert_eq!(DEFAULT_FEATURE_LEN, 2056);
        let e = Embedding { values: vec![0.5; EMBEDDING_DIM] };
        assert_eq!(encode(&e).len(), DEFAULT_FEATURE_LEN);
    }

    #[test]
    fn test_decode_recovers_values() {
        let decoded = decode(&blob(&[1.5, -2.0, 0.25])).unwrap();
        assert_eq!(decoded.values, vec![1.5, -2.0, 0.25]);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode(&[1, 2, 3]), Err(CodecError::Truncated(3)));

        let mut bad = blob(&[1.0]);
        bad[0] = b'X';
        assert_eq!(decode(&bad), Err(CodecError::BadMagic));

        let mut long = blob(&[1.0]);
        long.push(0);
        assert_eq!(
            decode(&long),
            Err(CodecError::LengthMismatch { expected: 12, actual: 13 })
        );
    }

    #[test]
    fn test_compare_range() {
        let a = blob(&[1.0, 0.0]);
        let b = blob(&[0.0, 1.0]);
        let c = blob(&[-1.0, 0.0]);
        assert!((compare(&a, &a) - 1.0).abs() < 1e-6);
        assert!(compare(&a, &b).abs() < 1e-6);
        assert_eq!(compare(&a, &c), 0.0);
    }

    #[test]
    fn test_compare_malformed_scores_zero() {
        let a = blob(&[1.0, 0.0]);
        assert_eq!(compare(&a, &[]), 0.0);
        assert_eq!(compare(&a, &[0u8; 16]), 0.0);
        assert_eq!(compare(&a, &blob(&[1.0, 0.0, 0.0])), 0.0);
    }
}
