//! Permission-aware similarity search.
//!
//! # Algorithm
//!
//! 1. Reject malformed calls (`top_k == 0`, negative or NaN threshold).
//! 2. No permission view → an outcome carrying `error = "user not found"`.
//! 3. Encode the query with the index's vocabulary.
//! 4. For every entry the [`PermissionFilter`] admits: cosine similarity,
//!    clamped to `[0, 1]`; keep it if `similarity >= threshold`.
//! 5. Stable sort by similarity (desc); equal scores keep corpus order.
//! 6. `total_found` = kept count, then truncate to `top_k`.
//!
//! Filtering happens before the cut, so a forbidden chunk can never take a
//! result slot. Named [`SearchMode`]s only fix the threshold.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::cosine_similarity;
use crate::error::SearchError;
use crate::index::{ChunkMetadata, VectorIndex};
use crate::permission::{PermissionFilter, UserPermissionView};

pub const STANDARD_THRESHOLD: f32 = 0.1;
pub const SMART_THRESHOLD: f32 = 0.05;
pub const STRICT_THRESHOLD: f32 = 0.3;

/// Error marker used when the caller has no resolvable permissions.
pub const USER_NOT_FOUND: &str = "user not found";

/// Named threshold presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Standard,
    Smart,
    Strict,
}

impl SearchMode {
    pub fn threshold(self) -> f32 {
        match self {
            SearchMode::Standard => STANDARD_THRESHOLD,
            SearchMode::Smart => SMART_THRESHOLD,
            SearchMode::Strict => STRICT_THRESHOLD,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Standard => "standard",
            SearchMode::Smart => "smart",
            SearchMode::Strict => "strict",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(SearchMode::Standard),
            "smart" => Ok(SearchMode::Smart),
            "strict" => Ok(SearchMode::Strict),
            other => Err(SearchError::InvalidArgument(format!(
                "unknown search mode: {}. Use standard, smart, or strict.",
                other
            ))),
        }
    }
}

/// Scoring knobs that are not part of the search contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimilarityOptions {
    /// Blend in the mean of co-significant dimensions for scores above 0.3.
    pub enhanced: bool,
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Clamped cosine similarity in `[0, 1]`.
    pub similarity: f32,
}

/// Result of a single search call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// Matches that passed permission and threshold, before truncation.
    pub total_found: usize,
    pub allowed_categories: BTreeSet<String>,
    pub results: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchOutcome {
    pub fn user_not_found() -> Self {
        Self {
            total_found: 0,
            allowed_categories: BTreeSet::new(),
            results: Vec::new(),
            error: Some(USER_NOT_FOUND.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Lowest and highest returned similarity, if any results.
    pub fn similarity_range(&self) -> Option<(f32, f32)> {
        let last = self.results.last()?;
        let first = self.results.first()?;
        Some((last.similarity, first.similarity))
    }
}

/// Runs searches against one index snapshot.
///
/// `Searcher` borrows the index immutably, so any number of them can run
/// concurrently over the same `Arc<VectorIndex>`.
#[derive(Debug, Clone, Copy)]
pub struct Searcher<'a> {
    index: &'a VectorIndex,
    options: SimilarityOptions,
}

impl<'a> Searcher<'a> {
    pub fn new(index: &'a VectorIndex) -> Self {
        Self {
            index,
            options: SimilarityOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SimilarityOptions) -> Self {
        self.options = options;
        self
    }

    /// Search with an explicit similarity threshold.
    pub fn search(
        &self,
        user: Option<&UserPermissionView>,
        query: &str,
        top_k: usize,
        similarity_threshold: f32,
    ) -> Result<SearchOutcome, SearchError> {
        if top_k == 0 {
            return Err(SearchError::InvalidArgument("top_k must be >= 1".into()));
        }
        if similarity_threshold.is_nan() || similarity_threshold < 0.0 {
            return Err(SearchError::InvalidArgument(
                "similarity_threshold must be >= 0".into(),
            ));
        }

        let Some(user) = user else {
            return Ok(SearchOutcome::user_not_found());
        };

        let query_vec = self.index.encode(query);
        let filter = PermissionFilter::new(user);

        let mut kept: Vec<SearchResult> = filter
            .eligible(self.index.all_entries())
            .filter_map(|(_, entry)| {
                let similarity = self.similarity(&query_vec, &entry.embedding);
                (similarity >= similarity_threshold).then(|| SearchResult {
                    id: entry.id.clone(),
                    content: entry.content.clone(),
                    metadata: entry.metadata.clone(),
                    similarity,
                })
            })
            .collect();

        // `sort_by` is stable: ties keep corpus order.
        kept.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

        let total_found = kept.len();
        kept.truncate(top_k);

        debug!(
            user = %user.user_id,
            role = %user.role,
            total_found,
            returned = kept.len(),
            threshold = similarity_threshold,
            "search completed"
        );

        Ok(SearchOutcome {
            total_found,
            allowed_categories: user.allowed_categories.clone(),
            results: kept,
            error: None,
        })
    }

    /// Search with a named mode's threshold.
    pub fn search_mode(
        &self,
        user: Option<&UserPermissionView>,
        query: &str,
        top_k: usize,
        mode: SearchMode,
    ) -> Result<SearchOutcome, SearchError> {
        self.search(user, query, top_k, mode.threshold())
    }

    pub fn smart_search(
        &self,
        user: Option<&UserPermissionView>,
        query: &str,
        top_k: usize,
    ) -> Result<SearchOutcome, SearchError> {
        self.search_mode(user, query, top_k, SearchMode::Smart)
    }

    pub fn strict_search(
        &self,
        user: Option<&UserPermissionView>,
        query: &str,
        top_k: usize,
    ) -> Result<SearchOutcome, SearchError> {
        self.search_mode(user, query, top_k, SearchMode::Strict)
    }

    fn similarity(&self, query: &[f32], chunk: &[f32]) -> f32 {
        let raw = if self.options.enhanced {
            enhanced_similarity(query, chunk)
        } else {
            cosine_similarity(query, chunk)
        };
        clamp_similarity(raw)
    }
}

/// Clamp a raw score into `[0, 1]`; non-finite scores become `0`.
pub fn clamp_similarity(raw: f32) -> f32 {
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Cosine similarity with a heuristic lift for already-close vectors.
///
/// Above a base score of 0.3, the mean of `(a_i + b_i) / 2` over dimensions
/// where both exceed 0.1 is blended in at 30%.
pub fn enhanced_similarity(a: &[f32], b: &[f32]) -> f32 {
    let base = cosine_similarity(a, b);
    if base <= 0.3 {
        return base;
    }

    let (sum, count) = a
        .iter()
        .zip(b.iter())
        .filter(|(x, y)| **x > 0.1 && **y > 0.1)
        .fold((0.0f32, 0usize), |(s, n), (x, y)| (s + (x + y) / 2.0, n + 1));

    if count == 0 {
        return base;
    }
    0.7 * base + 0.3 * (sum / count as f32)
}
