//! Vocabulary construction with document-frequency and IDF weights.
//!
//! The vocabulary is the `vocab_size` most frequent normalized tokens of the
//! corpus. Indices follow descending corpus frequency; equal frequencies
//! keep the order in which the tokens were first seen while scanning the
//! corpus front to back.
//!
//! IDF uses a smoothed form: `ln(N / (df + 1)) + 1`, where `N` is the
//! number of chunks and `df` the number of chunks containing the term at
//! least once.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::text::{normalize, tokens};

/// Per-term statistics stored in a [`Vocabulary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    /// Frequency rank, 0-based.
    pub index: usize,
    /// Number of chunks containing the term.
    pub document_frequency: usize,
    /// Total occurrences across the corpus.
    #[serde(default)]
    pub frequency: usize,
    pub idf: f64,
}

/// Immutable term → [`VocabularyEntry`] mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    entries: HashMap<String, VocabularyEntry>,
}

impl Vocabulary {
    /// Wrap an existing mapping, checking that indices are unique and
    /// contiguous from zero.
    pub fn from_entries(entries: HashMap<String, VocabularyEntry>) -> Result<Self, String> {
        let mut seen = vec![false; entries.len()];
        for (term, entry) in &entries {
            match seen.get_mut(entry.index) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => return Err(format!("duplicate vocabulary index {}", entry.index)),
                None => {
                    return Err(format!(
                        "vocabulary index {} for '{}' out of range 0..{}",
                        entry.index,
                        term,
                        entries.len()
                    ))
                }
            }
            if !entry.idf.is_finite() {
                return Err(format!("non-finite idf for '{}'", term));
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, term: &str) -> Option<&VocabularyEntry> {
        self.entries.get(term)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.entries.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VocabularyEntry)> {
        self.entries.iter().map(|(t, e)| (t.as_str(), e))
    }

    /// Terms ordered by their vocabulary index.
    pub fn terms_by_index(&self) -> Vec<&str> {
        let mut terms: Vec<(&str, usize)> = self
            .entries
            .iter()
            .map(|(t, e)| (t.as_str(), e.index))
            .collect();
        terms.sort_by_key(|(_, idx)| *idx);
        terms.into_iter().map(|(t, _)| t).collect()
    }
}

/// Single-pass vocabulary builder.
#[derive(Debug, Clone, Copy)]
pub struct VocabularyBuilder {
    capacity: usize,
}

impl VocabularyBuilder {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Build the vocabulary from chunk contents, in corpus order.
    pub fn build<'a, I>(&self, contents: I) -> Vocabulary
    where
        I: IntoIterator<Item = &'a str>,
    {
        struct TermStats {
            frequency: usize,
            document_frequency: usize,
            first_seen: usize,
        }

        let mut stats: HashMap<String, TermStats> = HashMap::new();
        let mut chunk_count = 0usize;

        for content in contents {
            chunk_count += 1;
            let normalized = normalize(content);
            let mut in_chunk: HashSet<&str> = HashSet::new();

            for token in tokens(&normalized) {
                let next_order = stats.len();
                let entry = stats.entry(token.to_string()).or_insert(TermStats {
                    frequency: 0,
                    document_frequency: 0,
                    first_seen: next_order,
                });
                entry.frequency += 1;
                if in_chunk.insert(token) {
                    entry.document_frequency += 1;
                }
            }
        }

        let mut ranked: Vec<(String, TermStats)> = stats.into_iter().collect();
        ranked.sort_by(|(_, a), (_, b)| {
            b.frequency
                .cmp(&a.frequency)
                .then(a.first_seen.cmp(&b.first_seen))
        });
        ranked.truncate(self.capacity);

        let entries = ranked
            .into_iter()
            .enumerate()
            .map(|(index, (term, s))| {
                let entry = VocabularyEntry {
                    index,
                    document_frequency: s.document_frequency,
                    frequency: s.frequency,
                    idf: idf(chunk_count, s.document_frequency),
                };
                (term, entry)
            })
            .collect();

        Vocabulary { entries }
    }
}

/// Smoothed inverse document frequency.
pub fn idf(chunk_count: usize, document_frequency: usize) -> f64 {
    (chunk_count as f64 / (document_frequency as f64 + 1.0)).ln() + 1.0
}
