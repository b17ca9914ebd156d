//! Index files and the live index handle.
//!
//! The index is built from the corpus file named in `[corpus].path` and
//! saved as a JSON bundle at `[index].path`. Saving writes a temporary file
//! beside it and renames it into place, so readers never see a partial file.
//!
//! At runtime the current index lives in an [`IndexHandle`]. Searches take
//! a snapshot (`Arc<VectorIndex>`) and keep using it even if a rebuild
//! publishes a new index meanwhile.

use anyhow::{Context, Result};
use rolesearch_core::corpus::read_corpus;
use rolesearch_core::persist::{read_index, write_index};
use rolesearch_core::VectorIndex;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::Config;

/// Read the corpus and build a fresh index without touching the saved one.
pub fn build_from_corpus(config: &Config) -> Result<VectorIndex> {
    let path = &config.corpus.path;
    let file =
        File::open(path).with_context(|| format!("Failed to open corpus: {}", path.display()))?;
    let chunks = read_corpus(BufReader::new(file))
        .with_context(|| format!("Failed to parse corpus: {}", path.display()))?;
    let index = VectorIndex::build(&chunks, config.index_config())?;
    Ok(index)
}

/// Build from the corpus and save the result to `[index].path`.
pub fn build_index(config: &Config) -> Result<VectorIndex> {
    let index = build_from_corpus(config)?;
    save_index(&index, &config.index.path)?;
    Ok(index)
}

/// Write `index` to `path` atomically.
///
/// The bundle goes to a uniquely named file beside `path`, which is then
/// renamed over it.
pub fn save_index(index: &VectorIndex, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write_index(index, &mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move index into place: {}", path.display()))?;

    info!(path = %path.display(), chunks = index.size(), "saved index");
    Ok(())
}

/// Read and validate a saved index.
pub fn read_index_file(path: &Path) -> Result<VectorIndex> {
    let file =
        File::open(path).with_context(|| format!("Failed to open index: {}", path.display()))?;
    let index = read_index(BufReader::new(file))
        .with_context(|| format!("Failed to load index: {}", path.display()))?;
    Ok(index)
}

/// Load the saved index, or an empty one if it is missing or unreadable.
pub fn load_index(config: &Config) -> VectorIndex {
    match read_index_file(&config.index.path) {
        Ok(index) => {
            info!(
                path = %config.index.path.display(),
                chunks = index.size(),
                vector_dim = index.vector_dim(),
                "loaded index"
            );
            index
        }
        Err(e) => {
            warn!(error = %format!("{:#}", e), "index unavailable, serving an empty index");
            VectorIndex::empty(config.index_config())
        }
    }
}

/// The index currently served. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    current: Arc<RwLock<Arc<VectorIndex>>>,
}

impl IndexHandle {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    /// The index as of now.
    pub fn snapshot(&self) -> Arc<VectorIndex> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the served index. Existing snapshots are unaffected.
    pub fn publish(&self, index: Arc<VectorIndex>) {
        let size = index.size();
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = index;
        info!(chunks = size, "published index");
    }
}

// ============ CLI commands ============

pub fn run_index_build(config: &Config) -> Result<()> {
    let index = build_index(config)?;
    println!("Index built.");
    println!("  chunks: {}", index.size());
    println!("  vocabulary terms: {}", index.vocabulary().len());
    println!("  vector dim: {}", index.vector_dim());
    println!("  saved to: {}", config.index.path.display());
    Ok(())
}

pub fn run_index_info(config: &Config) -> Result<()> {
    let index = read_index_file(&config.index.path)?;
    let categories: Vec<&str> = index.categories().into_iter().collect();
    println!("Index: {}", config.index.path.display());
    println!("  chunks: {}", index.size());
    println!("  documents: {}", index.document_ids().len());
    println!(
        "  vocabulary: {} terms (capacity {})",
        index.vocabulary().len(),
        index.vocab_size()
    );
    println!("  vector dim: {}", index.vector_dim());
    println!("  phrase boosts: {}", index.config().phrase_boosts.len());
    println!("  categories: {}", categories.join(", "));
    Ok(())
}
