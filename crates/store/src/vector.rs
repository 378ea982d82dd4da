//! Vector similarity and score fusion utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Max-normalization of raw scores into [0, 1]
//! - Weighted linear fusion of dense and sparse scores

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the vectors differ in length or either is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Dense relevance of a chunk: the better of its tldr and full-text
/// similarity, clamped to [0, 1].
pub fn dense_score(query: &[f32], tldr_embedding: &[f32], full_embedding: &[f32]) -> f32 {
    cosine_similarity(query, tldr_embedding)
        .max(cosine_similarity(query, full_embedding))
        .clamp(0.0, 1.0)
}

/// Scale non-negative scores so the maximum becomes 1.0.
///
/// All-zero input is returned unchanged.
pub fn max_normalize(scores: &mut [f32]) {
    let max = scores.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        scores.iter_mut().for_each(|s| *s /= max);
    }
}

/// Weighted fusion of a dense and a sparse score, each in [0, 1].
///
/// Weights are renormalized so the result stays in [0, 1].
pub fn weighted_fusion(dense: f32, sparse: f32, vector_weight: f32, keyword_weight: f32) -> f32 {
    let total = vector_weight + keyword_weight;
    if total <= 0.0 {
        return 0.0;
    }
    ((vector_weight * dense + keyword_weight * sparse) / total).clamp(0.0, 1.0)
}
