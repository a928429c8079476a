//! Deterministic mock embedder for tests and mock-mode deployments
//! (`VOYAGE_MOCK=true`).
//!
//! Produces a bag-of-tokens hashed vector, L2-normalized. Identical text
//! always yields an identical vector (cosine similarity 1.0); texts sharing
//! vocabulary yield partial similarity. This is sufficient for the
//! reflection pipeline's round-trip and idempotence properties without
//! pulling in a real model.

use async_trait::async_trait;

use super::{EmbedRole, Embedder};
use crate::error::CoreError;

pub const MOCK_DIMENSION: usize = 256;

pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self { dimension: MOCK_DIMENSION }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    fn hash_token(token: &str) -> u64 {
        // FNV-1a: small, dependency-free, stable across runs.
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in token.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            let token: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
            if token.is_empty() {
                continue;
            }
            let idx = (Self::hash_token(&token) as usize) % self.dimension;
            v[idx] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String], _role: EmbedRole) -> Result<Vec<Vec<f32>>, CoreError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_is_deterministic() {
        let e = MockEmbedder::new();
        let a = e.embed_one("User prefers dark mode", EmbedRole::Document).await.unwrap();
        let b = e.embed_one("User prefers dark mode", EmbedRole::Query).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn vectors_have_configured_dimension() {
        let e = MockEmbedder::new();
        let v = e.embed_one("short", EmbedRole::Document).await.unwrap();
        assert_eq!(v.len(), MOCK_DIMENSION);
    }

    #[tokio::test]
    async fn shared_vocabulary_raises_similarity() {
        use crate::embedding::cosine_similarity;
        let e = MockEmbedder::new();
        let a = e.embed_one("the user likes dark mode themes", EmbedRole::Document).await.unwrap();
        let b = e.embed_one("what ui theme does the user like", EmbedRole::Query).await.unwrap();
        let c = e.embed_one("unrelated text about kubernetes clusters", EmbedRole::Document).await.unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }
}
