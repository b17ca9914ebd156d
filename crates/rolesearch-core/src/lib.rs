//! # Role Search Core
//!
//! In-process semantic search over a fixed corpus of document chunks, with
//! role-based category filtering.
//!
//! The pipeline is:
//!
//! 1. [`corpus`] parses the chunk records produced by the upstream
//!    ingestion step.
//! 2. [`vocab`] scans the corpus once and assigns frequency-ranked indices
//!    and IDF weights.
//! 3. [`embedding`] turns any text into a fixed-dimension vector using
//!    TF×IDF weights spread over three hash functions, plus a small table of
//!    keyword-phrase boosts.
//! 4. [`index`] holds every chunk with its precomputed embedding.
//! 5. [`search`] scores a query against the index, applies the
//!    [`permission`] filter, thresholds, sorts and truncates.
//! 6. [`persist`] serializes the built index so it can be reloaded without
//!    the corpus.
//!
//! This crate has no tokio, sqlx or HTTP dependencies. It reads and writes
//! through `std::io` traits only; file paths are the application's concern.

pub mod corpus;
pub mod embedding;
pub mod error;
pub mod index;
pub mod permission;
pub mod persist;
pub mod search;
pub mod text;
pub mod vocab;

pub use error::{IndexError, SearchError};
pub use index::{ChunkMetadata, ChunkRecord, IndexConfig, VectorIndex};
pub use permission::{RolePermission, UserPermissionView};
pub use search::{SearchMode, SearchOutcome, SearchResult, Searcher, SimilarityOptions};
