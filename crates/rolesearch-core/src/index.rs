//! The in-memory vector index.
//!
//! A [`VectorIndex`] is built once from a corpus and never mutated
//! afterwards. Adding or changing documents means building a new index and
//! publishing it in place of the old one; the application keeps the
//! current index behind an `Arc` for that purpose.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::corpus::{self, CorpusChunk};
use crate::embedding::{default_phrase_boosts, EmbeddingEncoder, PhraseBoost, HASH_FUNCTIONS};
use crate::error::IndexError;
use crate::vocab::{Vocabulary, VocabularyBuilder};

/// Build-time parameters of an index. They travel with the persisted index
/// so queries are always encoded the same way the chunks were.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum number of vocabulary terms.
    pub vocab_size: usize,
    /// Embedding dimension `D`.
    pub vector_dim: usize,
    /// Keyword-phrase boost table.
    pub phrase_boosts: Vec<PhraseBoost>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            vocab_size: 1000,
            vector_dim: 300,
            phrase_boosts: default_phrase_boosts(),
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.vocab_size == 0 {
            return Err(IndexError::InvalidConfig("vocab_size must be > 0".into()));
        }
        if self.vector_dim < HASH_FUNCTIONS {
            return Err(IndexError::InvalidConfig(format!(
                "vector_dim must be >= {}",
                HASH_FUNCTIONS
            )));
        }
        Ok(())
    }
}

/// Non-vector fields of a chunk, returned with every search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub category: String,
    pub allowed_roles: BTreeSet<String>,
    pub title: String,
}

/// A chunk with its precomputed embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

impl ChunkRecord {
    pub fn category(&self) -> &str {
        &self.metadata.category
    }
}

/// Immutable set of embedded chunks plus the vocabulary they were encoded
/// with.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    config: IndexConfig,
    vocabulary: Vocabulary,
    entries: Vec<ChunkRecord>,
}

impl VectorIndex {
    /// Build vocabulary and embeddings from `corpus`, preserving corpus order.
    pub fn build(corpus: &[CorpusChunk], config: IndexConfig) -> Result<Self, IndexError> {
        config.validate()?;
        corpus::validate(corpus)?;

        let vocabulary =
            VocabularyBuilder::new(config.vocab_size).build(corpus.iter().map(|c| c.content.as_str()));

        let entries = {
            let encoder =
                EmbeddingEncoder::new(&vocabulary, &config.phrase_boosts, config.vector_dim);
            corpus
                .iter()
                .map(|chunk| ChunkRecord {
                    id: chunk.id.clone(),
                    content: chunk.content.clone(),
                    metadata: ChunkMetadata {
                        document_id: chunk.document_id.clone(),
                        category: chunk.category.clone(),
                        allowed_roles: chunk.allowed_roles.iter().cloned().collect(),
                        title: chunk.title.clone(),
                    },
                    embedding: encoder.encode(&chunk.content),
                })
                .collect::<Vec<_>>()
        };

        info!(
            chunks = entries.len(),
            vocabulary = vocabulary.len(),
            vector_dim = config.vector_dim,
            "built vector index"
        );

        Ok(Self {
            config,
            vocabulary,
            entries,
        })
    }

    /// An index with no entries. Every search against it finds nothing.
    pub fn empty(config: IndexConfig) -> Self {
        Self {
            config,
            vocabulary: Vocabulary::default(),
            entries: Vec::new(),
        }
    }

    /// Reassemble an index from already-validated parts.
    pub(crate) fn from_parts(
        config: IndexConfig,
        vocabulary: Vocabulary,
        entries: Vec<ChunkRecord>,
    ) -> Self {
        Self {
            config,
            vocabulary,
            entries,
        }
    }

    pub fn encoder(&self) -> EmbeddingEncoder<'_> {
        EmbeddingEncoder::new(
            &self.vocabulary,
            &self.config.phrase_boosts,
            self.config.vector_dim,
        )
    }

    /// Encode text with this index's vocabulary and phrase table.
    pub fn encode(&self, text: &str) -> Vec<f32> {
        self.encoder().encode(text)
    }

    /// All entries in corpus order.
    pub fn all_entries(&self) -> &[ChunkRecord] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&ChunkRecord> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Number of indexed chunks.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn vector_dim(&self) -> usize {
        self.config.vector_dim
    }

    /// Configured vocabulary capacity.
    pub fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Distinct categories present in the index, sorted.
    pub fn categories(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|e| e.category()).collect()
    }

    /// Distinct document ids, in first-seen order.
    pub fn document_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|e| e.metadata.document_id.as_str())
            .filter(|id| seen.insert(*id))
            .collect()
    }
}
