//! Cosine-similarity ranking of candidate vectors.

use std::cmp::Ordering;

use crate::clinical::embedding::embedder::EmbeddingVector;

/// Candidate with its similarity to the query.
#[derive(Clone, Debug)]
pub struct Ranked<T> {
    /// Cosine similarity; `NaN` when undefined.
    pub score: f64,
    /// Ranked candidate.
    pub item: T,
}

/// Cosine similarity `dot(a, b) / (|a| * |b|)`.
///
/// Returns `NaN` when either magnitude is zero or the lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return f64::NAN;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b = b.iter().map(|y| y * y).sum::<f64>().sqrt();
    dot / (mag_a * mag_b)
}

/// Descending order with `NaN` after every number.
fn by_descending_score(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Rank candidates against a query and keep the best `top_k`.
///
/// The sort is stable: equal scores keep their input order.
#[must_use]
pub fn rank<T>(
    query: &EmbeddingVector,
    candidates: Vec<(T, EmbeddingVector)>,
    top_k: usize,
) -> Vec<Ranked<T>> {
    let mut ranked: Vec<Ranked<T>> = candidates
        .into_iter()
        .map(|(item, vector)| Ranked {
            score: cosine_similarity(query.as_slice(), vector.as_slice()),
            item,
        })
        .collect();

    ranked.sort_by(|a, b| by_descending_score(a.score, b.score));
    ranked.truncate(top_k);
    ranked
}
