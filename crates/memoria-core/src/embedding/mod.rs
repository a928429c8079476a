//! Embedding provider: an external capability `embed(text[]) -> vector[]`.
//!
//! The embedding provider is treated as an out-of-scope collaborator: only
//! its contract matters here. This module defines the trait seam plus a
//! deterministic [`MockEmbedder`] so the engine is runnable and testable
//! without a network dependency; a real HTTP-backed implementation lives in
//! the daemon binary.

mod mock;

pub use mock::MockEmbedder;

use async_trait::async_trait;

use crate::error::CoreError;

/// Which side of a similarity comparison a text plays. Some providers use a
/// different internal representation for documents vs. queries (e.g. Voyage's
/// `input_type`), so the role is part of the contract rather than an
/// implementation detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedRole {
    Document,
    Query,
}

/// External embedding capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Fixed vector width this embedder produces. All memories for a
    /// deployment must share one dimension (recall rejects a mismatch as
    /// invalid input).
    fn dimension(&self) -> usize;

    /// Embed a batch of texts in one round-trip.
    async fn embed(&self, texts: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>, CoreError>;

    /// Convenience wrapper for a single text.
    async fn embed_one(&self, text: &str, role: EmbedRole) -> Result<Vec<f32>, CoreError> {
        let mut batch = self.embed(&[text.to_string()], role).await?;
        batch.pop().ok_or_else(|| CoreError::EmbedderFailed("empty embedding batch".into()))
    }
}

/// Cosine similarity between two equal-length vectors. Returns 0.0 on length
/// mismatch or a zero-norm input rather than propagating an error — callers
/// treat a mismatched/degenerate pair as "not similar" (the contradiction
/// detector's failure mode: a broken similarity call returns an empty
/// candidate list, never an error).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![0.1, 0.2, 0.3, 0.4];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_length_is_zero_not_an_error() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }
}
