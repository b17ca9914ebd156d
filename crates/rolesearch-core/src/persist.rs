//! Serialized index bundle.
//!
//! The bundle is a self-contained JSON document holding everything needed
//! to answer queries without the original corpus:
//!
//! | Field | Content |
//! |-------|---------|
//! | `format_version` | Bundle layout version |
//! | `vector_dim`, `vocab_size` | Build parameters |
//! | `phrase_boosts` | Phrase table used at build time |
//! | `vocab` | `term → {index, document_frequency, frequency, idf}` |
//! | `order` | Chunk ids in corpus order |
//! | `metadata` | `id → {document_id, category, allowed_roles, title, content}` |
//! | `vectors` | `id → [f32; vector_dim]` |
//!
//! Maps are `BTreeMap`s so identical indexes serialize to identical bytes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::embedding::{default_phrase_boosts, PhraseBoost};
use crate::error::IndexError;
use crate::index::{ChunkMetadata, ChunkRecord, IndexConfig, VectorIndex};
use crate::vocab::{Vocabulary, VocabularyEntry};

pub const FORMAT_VERSION: u32 = 1;

/// Per-chunk fields stored in the bundle's `metadata` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    #[serde(default)]
    pub document_id: String,
    pub category: String,
    #[serde(default)]
    pub allowed_roles: BTreeSet<String>,
    #[serde(default)]
    pub title: String,
    pub content: String,
}

/// On-disk representation of a [`VectorIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexBundle {
    pub format_version: u32,
    pub vector_dim: usize,
    pub vocab_size: usize,
    #[serde(default = "default_phrase_boosts")]
    pub phrase_boosts: Vec<PhraseBoost>,
    pub vocab: BTreeMap<String, VocabularyEntry>,
    pub order: Vec<String>,
    pub metadata: BTreeMap<String, StoredChunk>,
    pub vectors: BTreeMap<String, Vec<f32>>,
}

impl IndexBundle {
    pub fn from_index(index: &VectorIndex) -> Self {
        let config = index.config();
        let mut metadata = BTreeMap::new();
        let mut vectors = BTreeMap::new();
        let mut order = Vec::with_capacity(index.size());

        for entry in index.all_entries() {
            order.push(entry.id.clone());
            metadata.insert(
                entry.id.clone(),
                StoredChunk {
                    document_id: entry.metadata.document_id.clone(),
                    category: entry.metadata.category.clone(),
                    allowed_roles: entry.metadata.allowed_roles.clone(),
                    title: entry.metadata.title.clone(),
                    content: entry.content.clone(),
                },
            );
            vectors.insert(entry.id.clone(), entry.embedding.clone());
        }

        Self {
            format_version: FORMAT_VERSION,
            vector_dim: config.vector_dim,
            vocab_size: config.vocab_size,
            phrase_boosts: config.phrase_boosts.clone(),
            vocab: index
                .vocabulary()
                .iter()
                .map(|(t, e)| (t.to_string(), e.clone()))
                .collect(),
            order,
            metadata,
            vectors,
        }
    }

    /// Validate the bundle and turn it back into an index.
    pub fn into_index(mut self) -> Result<VectorIndex, IndexError> {
        if self.format_version != FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion {
                found: self.format_version,
                expected: FORMAT_VERSION,
            });
        }

        let config = IndexConfig {
            vocab_size: self.vocab_size,
            vector_dim: self.vector_dim,
            phrase_boosts: self.phrase_boosts,
        };
        config
            .validate()
            .map_err(|e| IndexError::InvalidBundle(e.to_string()))?;

        if self.vocab.len() > config.vocab_size {
            return Err(IndexError::InvalidBundle(format!(
                "vocabulary has {} terms, capacity is {}",
                self.vocab.len(),
                config.vocab_size
            )));
        }
        let vocabulary = Vocabulary::from_entries(self.vocab.into_iter().collect::<HashMap<_, _>>())
            .map_err(IndexError::InvalidBundle)?;

        if self.order.len() != self.metadata.len() || self.order.len() != self.vectors.len() {
            return Err(IndexError::InvalidBundle(format!(
                "order/metadata/vectors sizes differ: {}/{}/{}",
                self.order.len(),
                self.metadata.len(),
                self.vectors.len()
            )));
        }

        let mut entries = Vec::with_capacity(self.order.len());
        for id in self.order {
            let stored = self
                .metadata
                .remove(&id)
                .ok_or_else(|| IndexError::InvalidBundle(format!("missing metadata for '{}'", id)))?;
            let embedding = self
                .vectors
                .remove(&id)
                .ok_or_else(|| IndexError::InvalidBundle(format!("missing vector for '{}'", id)))?;
            if embedding.len() != config.vector_dim {
                return Err(IndexError::InvalidBundle(format!(
                    "vector for '{}' has {} dims, expected {}",
                    id,
                    embedding.len(),
                    config.vector_dim
                )));
            }
            if embedding.iter().any(|v| !v.is_finite()) {
                return Err(IndexError::InvalidBundle(format!(
                    "vector for '{}' has non-finite values",
                    id
                )));
            }
            entries.push(ChunkRecord {
                id,
                content: stored.content,
                metadata: ChunkMetadata {
                    document_id: stored.document_id,
                    category: stored.category,
                    allowed_roles: stored.allowed_roles,
                    title: stored.title,
                },
                embedding,
            });
        }

        Ok(VectorIndex::from_parts(config, vocabulary, entries))
    }
}

/// Serialize `index` as a JSON bundle.
pub fn write_index<W: Write>(index: &VectorIndex, writer: W) -> Result<(), IndexError> {
    serde_json::to_writer(writer, &IndexBundle::from_index(index))?;
    Ok(())
}

/// Read and validate a JSON bundle.
pub fn read_index<R: Read>(reader: R) -> Result<VectorIndex, IndexError> {
    let bundle: IndexBundle = serde_json::from_reader(reader)?;
    bundle.into_index()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::parse_corpus;

    fn sample_index() -> VectorIndex {
        let corpus = parse_corpus(
            r#"[
                { "id": "c1", "content": "nghỉ phép năm", "category": "policy", "title": "Leave",
                  "allowed_roles": ["employee"], "document_id": "d1" },
                { "id": "c0", "content": "lương thưởng", "category": "salary", "title": "Pay",
                  "document_id": "d2" }
            ]"#,
        )
        .unwrap();
        VectorIndex::build(&corpus, IndexConfig::default()).unwrap()
    }

    #[test]
    fn test_bundle_restores_identical_index() {
        let index = sample_index();
        let mut buf = Vec::new();
        write_index(&index, &mut buf).unwrap();
        let restored = read_index(buf.as_slice()).unwrap();
        assert_eq!(restored.config(), index.config());
        assert_eq!(restored.vocabulary(), index.vocabulary());
        assert_eq!(restored.size(), index.size());
        for (a, b) in restored.all_entries().iter().zip(index.all_entries()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.content, b.content);
            assert_eq!(a.metadata, b.metadata);
            for (x, y) in a.embedding.iter().zip(&b.embedding) {
                assert!((x - y).abs() < 1e-7);
            }
        }
        // Corpus order, not map order.
        assert_eq!(restored.all_entries()[0].id, "c1");
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let index = sample_index();
        let mut a = Vec::new();
        let mut b = Vec::new();
        write_index(&index, &mut a).unwrap();
        write_index(&index, &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_wrong_dims() {
        let mut bundle = IndexBundle::from_index(&sample_index());
        bundle.vectors.insert("c1".into(), vec![0.0; 5]);
        assert!(matches!(bundle.into_index(), Err(IndexError::InvalidBundle(_))));
    }

    #[test]
    fn test_rejects_missing_metadata() {
        let mut bundle = IndexBundle::from_index(&sample_index());
        bundle.metadata.remove("c0");
        assert!(matches!(bundle.into_index(), Err(IndexError::InvalidBundle(_))));
    }

    #[test]
    fn test_rejects_future_version() {
        let mut bundle = IndexBundle::from_index(&sample_index());
        bundle.format_version = 99;
        assert!(matches!(
            bundle.into_index(),
            Err(IndexError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(read_index(&b"not json"[..]), Err(IndexError::Json(_))));
    }

    #[test]
    fn test_missing_phrase_table_uses_default() {
        let bundle = IndexBundle::from_index(&sample_index());
        let mut value = serde_json::to_value(&bundle).unwrap();
        value.as_object_mut().unwrap().remove("phrase_boosts");
        let restored: IndexBundle = serde_json::from_value(value).unwrap();
        assert_eq!(restored.phrase_boosts, default_phrase_boosts());
    }
}
