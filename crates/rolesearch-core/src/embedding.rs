//! Hashed TF-IDF embeddings and vector utilities.
//!
//! [`EmbeddingEncoder`] maps arbitrary text to a dense vector of a fixed
//! dimension `D`:
//!
//! 1. Normalize and tokenize (see [`crate::text`]).
//! 2. For each in-vocabulary token, `weight = tf × idf` where
//!    `tf = count / total_tokens`.
//! 3. Spread the weight into three buckets, one per band of `D / 3`
//!    dimensions: `bucket = xxh64(token ++ seed) mod (D/3) + seed·(D/3)`
//!    for `seed ∈ {0, 1, 2}`.
//! 4. Add fixed [`PhraseBoost`] weights to dimensions `0, 3, 6, …` for every
//!    configured phrase found in the normalized text.
//! 5. L2-normalize (a zero vector stays zero).
//!
//! The hash is XXH64 with seed `0` over the UTF-8 bytes of the token
//! followed by the decimal seed digit, so buckets are identical across
//! processes, platforms and releases.

use std::collections::HashMap;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::text::{normalize, tokens};
use crate::vocab::Vocabulary;

/// Number of hash functions each term is spread over.
pub const HASH_FUNCTIONS: usize = 3;

/// Stride between the dimensions a phrase boost writes to.
const PHRASE_STRIDE: usize = 3;

/// A fixed keyword-phrase signal added on top of the hashed projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseBoost {
    /// Phrase matched as a substring of the normalized text.
    pub phrase: String,
    /// `weights[i]` is added to dimension `3·i`.
    pub weights: Vec<f32>,
}

impl PhraseBoost {
    pub fn new(phrase: &str, weights: &[f32]) -> Self {
        Self {
            phrase: phrase.to_string(),
            weights: weights.to_vec(),
        }
    }
}

/// The built-in HR phrase table.
pub fn default_phrase_boosts() -> Vec<PhraseBoost> {
    vec![
        PhraseBoost::new("nghỉ phép", &[0.8, 0.6, 0.4]),
        PhraseBoost::new("lương thưởng", &[0.7, 0.5, 0.3]),
        PhraseBoost::new("bảo hiểm", &[0.6, 0.4, 0.2]),
        PhraseBoost::new("giờ làm việc", &[0.5, 0.3, 0.1]),
        PhraseBoost::new("hợp đồng", &[0.4, 0.2, 0.1]),
        PhraseBoost::new("cơ cấu", &[0.3, 0.2, 0.1]),
        PhraseBoost::new("hệ thống", &[0.3, 0.2, 0.1]),
    ]
}

/// Bucket for `token` under hash function `seed` in a `dims`-wide vector.
///
/// `dims` must be at least [`HASH_FUNCTIONS`].
pub fn hash_bucket(token: &str, seed: usize, dims: usize) -> usize {
    let band = dims / HASH_FUNCTIONS;
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(token.as_bytes());
    hasher.write(seed.to_string().as_bytes());
    (hasher.finish() % band as u64) as usize + seed * band
}

/// Encodes text against a fixed vocabulary and phrase table.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingEncoder<'a> {
    vocabulary: &'a Vocabulary,
    phrase_boosts: &'a [PhraseBoost],
    dims: usize,
}

impl<'a> EmbeddingEncoder<'a> {
    pub fn new(vocabulary: &'a Vocabulary, phrase_boosts: &'a [PhraseBoost], dims: usize) -> Self {
        Self {
            vocabulary,
            phrase_boosts,
            dims,
        }
    }

    /// Encode `text` into a unit-length (or all-zero) vector of `dims` floats.
    pub fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f64; self.dims];
        let normalized = normalize(text);

        // Counts are kept in first-occurrence order so the floating-point
        // accumulation order never depends on hash map iteration.
        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in tokens(&normalized) {
            let count = counts.entry(token).or_insert(0);
            if *count == 0 {
                order.push(token);
            }
            *count += 1;
        }

        let total = counts.values().sum::<usize>();
        if total == 0 || self.dims < HASH_FUNCTIONS {
            return vec![0.0; self.dims];
        }

        for token in order {
            let Some(entry) = self.vocabulary.get(token) else {
                continue;
            };
            let tf = counts[token] as f64 / total as f64;
            let weight = tf * entry.idf;
            for seed in 0..HASH_FUNCTIONS {
                vector[hash_bucket(token, seed, self.dims)] += weight;
            }
        }

        for boost in self.phrase_boosts {
            if boost.phrase.is_empty() || !normalized.contains(boost.phrase.as_str()) {
                continue;
            }
            for (i, w) in boost.weights.iter().enumerate() {
                let dim = i * PHRASE_STRIDE;
                if dim < self.dims {
                    vector[dim] += f64::from(*w);
                }
            }
        }

        l2_normalize(&mut vector);
        vector.into_iter().map(|v| v as f32).collect()
    }
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Euclidean norm of an `f32` vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
