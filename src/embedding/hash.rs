//! Deterministic hash-based embedder.
//!
//! Projects a bag of token hashes into a fixed-dimension vector and
//! l2-normalizes it. Not a semantic model: texts sharing tokens land close,
//! which is enough for offline runs and deterministic tests.

use super::Embedder;
use crate::{Error, Result};
use sha2::{Digest, Sha256};

/// Offline embedder with deterministic output.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Creates a hash embedder with the given dimension.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = usize::from(digest[0]) << 8 | usize::from(digest[1]);
            let sign = if digest[2] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket % self.dimensions] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn embeddings_are_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("knowledge graphs are useful").expect("embed");
        let b = embedder.embed("knowledge graphs are useful").expect("embed");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn related_texts_score_higher_than_unrelated() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed("acme headquarters berlin").expect("embed");
        let related = embedder.embed("acme is headquartered in berlin").expect("embed");
        let unrelated = embedder.embed("soup recipe with carrots").expect("embed");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn empty_text_fails_fast() {
        let embedder = HashEmbedder::new(16);
        assert!(matches!(
            embedder.embed("   "),
            Err(Error::InvalidInput(_))
        ));
    }
}
