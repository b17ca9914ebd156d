//! Upstream corpus records.
//!
//! The ingestion step (text extraction and chunking) lives outside this
//! crate and writes a JSON document of the form
//!
//! ```json
//! { "statistics": { ... }, "chunks": [ { "id": "...", "content": "...", ... } ] }
//! ```
//!
//! A bare array of chunks is accepted as well. Only `id`, `content`,
//! `category`, `allowed_roles` and `title` feed the index; the remaining
//! fields are carried for completeness and default when absent.

use std::collections::HashSet;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// One chunk as produced by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusChunk {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub document_id: String,
    pub category: String,
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default)]
    pub total_chunks: usize,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusDocument {
    Wrapped {
        chunks: Vec<CorpusChunk>,
        #[serde(default)]
        #[allow(dead_code)]
        statistics: Option<serde_json::Value>,
    },
    Bare(Vec<CorpusChunk>),
}

/// Parse a corpus from a JSON reader, rejecting empty or duplicate ids.
pub fn read_corpus<R: Read>(reader: R) -> Result<Vec<CorpusChunk>, IndexError> {
    let doc: CorpusDocument = serde_json::from_reader(reader)?;
    let chunks = match doc {
        CorpusDocument::Wrapped { chunks, .. } => chunks,
        CorpusDocument::Bare(chunks) => chunks,
    };
    validate(&chunks)?;
    Ok(chunks)
}

/// Parse a corpus from a JSON string.
pub fn parse_corpus(json: &str) -> Result<Vec<CorpusChunk>, IndexError> {
    read_corpus(json.as_bytes())
}

pub(crate) fn validate(chunks: &[CorpusChunk]) -> Result<(), IndexError> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.id.trim().is_empty() {
            return Err(IndexError::EmptyChunkId(i));
        }
        if !seen.insert(chunk.id.as_str()) {
            return Err(IndexError::DuplicateChunkId(chunk.id.clone()));
        }
    }
    Ok(())
}
