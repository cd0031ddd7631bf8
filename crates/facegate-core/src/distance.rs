//! Embedding dissimilarity metrics.

use crate::types::Embedding;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Scalar dissimilarity between two embeddings: 0 for identical vectors,
/// larger for more different ones. Must be symmetric.
pub trait DistanceMetric {
    fn distance(&self, a: &Embedding, b: &Embedding) -> Result<f32, MatchError>;
}

/// Plain L2 distance, the face-distance convention the default threshold is tuned for.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl DistanceMetric for Euclidean {
    fn distance(&self, a: &Embedding, b: &Embedding) -> Result<f32, MatchError> {
        a.euclidean_distance(b)
    }
}

impl Embedding {
    /// Compute Euclidean distance between two embeddings of equal length.
    pub fn euclidean_distance(&self, other: &Embedding) -> Result<f32, MatchError> {
        check_dims(self, other)?;
        Ok(self
            .values()
            .iter()
            .zip(other.values().iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt())
    }
}

fn check_dims(a: &Embedding, b: &Embedding) -> Result<(), MatchError> {
    if a.dim() != b.dim() {
        return Err(MatchError::DimensionMismatch {
            expected: a.dim(),
            actual: b.dim(),
        });
    }
    Ok(())
}
