//! Directional context features
//!
//! For every corpus occurrence of a registered phrase, the tokens within a
//! window to its left and right become features `token_L` / `token_R`.
//! Each (phrase, feature) co-occurrence adds 1.0 to the phrase x feature
//! matrix; duplicates are summed when the matrix is assembled.
//!
//! # Concurrency
//!
//! Files are processed in parallel. Each file accumulates triplets, index
//! entries and occurrence counts locally and merges them once at the end,
//! so the shared state is touched once per file rather than once per token.
//! Feature ids come from a concurrent interner: two threads asking for the
//! same key always get the same id.

pub mod index;
pub mod reweight;

#[cfg(test)]
mod tests;

pub use index::InvertedIndex;
pub use reweight::{prune_by_count, rescale_to_pmi};

use dashmap::DashMap;
use lasso::{Key, Spur, ThreadedRodeo};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::corpus::open_lines;
use crate::error::{PropError, Result};
use crate::phrases::{extract_ngrams, tokenize, PhraseRegistry, Stopwords};
use crate::sparse::{read_market, write_market, SparseMatrix, Triplet};
use crate::ProgressCallback;

/// Which side of a phrase occurrence a context token was seen on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextSide {
    Left,
    Right,
}

impl ContextSide {
    pub fn suffix(self) -> &'static str {
        match self {
            ContextSide::Left => "L",
            ContextSide::Right => "R",
        }
    }

    /// Feature key for `token` on this side, e.g. `dog_L`
    pub fn feature_key(self, token: &str) -> String {
        format!("{}_{}", token, self.suffix())
    }
}

/// Feature key <-> id mapping with first-seen numbering.
///
/// Ids are dense and start at 0. Under parallel extraction "first seen"
/// depends on scheduling, so ids are stable within a run but not across
/// runs; the id2feature file records the mapping actually used.
#[derive(Debug)]
pub struct FeatureVocab {
    inner: ThreadedRodeo,
}

impl Default for FeatureVocab {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureVocab {
    pub fn new() -> Self {
        Self {
            inner: ThreadedRodeo::default(),
        }
    }

    /// Id of `token` on `side`, assigning the next id if unseen
    #[inline]
    pub fn intern(&self, token: &str, side: ContextSide) -> u32 {
        self.inner.get_or_intern(side.feature_key(token)).into_usize() as u32
    }

    #[inline]
    pub fn get(&self, token: &str, side: ContextSide) -> Option<u32> {
        self.inner
            .get(side.feature_key(token))
            .map(|k| k.into_usize() as u32)
    }

    /// Feature key for an id
    pub fn resolve(&self, id: u32) -> Option<&str> {
        let key = Spur::try_from_usize(id as usize)?;
        self.inner.try_resolve(&key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Write `feature\tid` lines in id order
    pub fn write_id2feature(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| PropError::io(path, e))?;
        let mut out = BufWriter::new(file);
        for id in 0..self.len() as u32 {
            if let Some(feature) = self.resolve(id) {
                writeln!(out, "{}\t{}", feature, id).map_err(|e| PropError::io(path, e))?;
            }
        }
        out.flush().map_err(|e| PropError::io(path, e))
    }
}

/// Result of a finished extraction pass
#[derive(Debug)]
pub struct FeatureSpace {
    /// Phrase x feature counts (rows = registry ids)
    pub matrix: SparseMatrix,
    pub index: InvertedIndex,
    pub vocab: FeatureVocab,
    /// Corpus occurrences per phrase id
    pub occurrences: Vec<u64>,
}

/// Accumulates context features over a corpus for a fixed phrase registry
pub struct FeatureExtractor<'a> {
    registry: &'a PhraseRegistry,
    window_size: usize,
    min_order: usize,
    max_order: usize,
    stopwords: Option<&'a Stopwords>,
    vocab: FeatureVocab,
    triplets: Mutex<Vec<Triplet>>,
    index: DashMap<u32, FxHashSet<u32>>,
    occurrences: Vec<AtomicU64>,
    lines: AtomicUsize,
    progress_callback: Option<ProgressCallback>,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(registry: &'a PhraseRegistry, window_size: usize, min_order: usize, max_order: usize) -> Self {
        Self {
            registry,
            window_size,
            min_order: min_order.max(1),
            max_order,
            stopwords: None,
            vocab: FeatureVocab::new(),
            triplets: Mutex::new(Vec::new()),
            index: DashMap::new(),
            occurrences: (0..registry.len()).map(|_| AtomicU64::new(0)).collect(),
            lines: AtomicUsize::new(0),
            progress_callback: None,
        }
    }

    /// Keep stopword features out of the inverted index
    pub fn with_stopwords(mut self, stopwords: &'a Stopwords) -> Self {
        self.stopwords = Some(stopwords);
        self
    }

    /// Called with (files done, total files)
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Process corpus files in parallel
    pub fn extract_files(&self, files: &[PathBuf]) -> Result<()> {
        let done = AtomicUsize::new(0);
        let total = files.len();
        files.par_iter().try_for_each(|file| -> Result<()> {
            let mut acc = LocalAccumulator::default();
            for line in open_lines(file)? {
                self.scan_line(&line?, &mut acc);
            }
            self.merge(acc);
            debug!("Extracted features from {}", file.display());

            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(ref callback) = self.progress_callback {
                callback(finished, total);
            }
            Ok(())
        })
    }

    /// Process in-memory lines on the calling thread
    pub fn extract_lines<'l, I>(&self, lines: I)
    where
        I: IntoIterator<Item = &'l str>,
    {
        let mut acc = LocalAccumulator::default();
        for line in lines {
            self.scan_line(line, &mut acc);
        }
        self.merge(acc);
    }

    fn scan_line(&self, line: &str, acc: &mut LocalAccumulator) {
        acc.lines += 1;
        let tokens = tokenize(line);
        for order in self.min_order..=self.max_order {
            for gram in extract_ngrams(&tokens, order) {
                let Some(phrase) = self.registry.phrase_id(&gram.text) else {
                    continue;
                };
                acc.occurrences.push(phrase);

                let left = &tokens[gram.start.saturating_sub(self.window_size)..gram.start];
                let right_end = (gram.end + self.window_size).min(tokens.len());
                let right = &tokens[gram.end..right_end];

                let contexts = left
                    .iter()
                    .map(|t| (*t, ContextSide::Left))
                    .chain(right.iter().map(|t| (*t, ContextSide::Right)));
                for (token, side) in contexts {
                    let feature = self.vocab.intern(token, side);
                    acc.triplets.push(Triplet::new(phrase, feature, 1.0));
                    let stop = self
                        .stopwords
                        .is_some_and(|s| s.is_stop_feature(token, side));
                    if !stop {
                        acc.index.push((feature, phrase));
                    }
                }
            }
        }
    }

    fn merge(&self, acc: LocalAccumulator) {
        for phrase in acc.occurrences {
            if let Some(counter) = self.occurrences.get(phrase as usize) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
        for (feature, phrase) in acc.index {
            self.index.entry(feature).or_default().insert(phrase);
        }
        self.lines.fetch_add(acc.lines, Ordering::Relaxed);
        self.triplets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(acc.triplets);
    }

    /// Assemble the count matrix. Rows cover every registered phrase, so a
    /// phrase that never occurred has an empty row.
    pub fn finish(self) -> Result<FeatureSpace> {
        let triplets = self.triplets.into_inner().unwrap_or_else(|e| e.into_inner());
        let pending = triplets.len();
        let matrix = SparseMatrix::from_triplets(self.registry.len(), self.vocab.len(), triplets)?;
        let occurrences: Vec<u64> = self.occurrences.into_iter().map(AtomicU64::into_inner).collect();

        info!(
            "Features: {} lines, {} phrases x {} features, {} co-occurrences, {} distinct",
            self.lines.into_inner(),
            matrix.rows(),
            matrix.cols(),
            pending,
            matrix.nnz()
        );
        debug!(
            "{} phrases never occurred in the corpus",
            occurrences.iter().filter(|&&c| c == 0).count()
        );

        Ok(FeatureSpace {
            matrix,
            index: InvertedIndex::from_concurrent(self.index),
            vocab: self.vocab,
            occurrences,
        })
    }
}

#[derive(Default)]
struct LocalAccumulator {
    triplets: Vec<Triplet>,
    index: Vec<(u32, u32)>,
    occurrences: Vec<u32>,
    lines: usize,
}

/// Persist a feature matrix and its inverted index
pub fn save_features(matrix: &SparseMatrix, index: &InvertedIndex, matrix_path: &Path, index_path: &Path) -> Result<()> {
    write_market(matrix, matrix_path)?;
    index.save(index_path)
}

/// Load a feature matrix and its inverted index
pub fn load_features(matrix_path: &Path, index_path: &Path) -> Result<(SparseMatrix, InvertedIndex)> {
    let matrix = read_market(matrix_path)?;
    let index = InvertedIndex::load(index_path)?;
    Ok((matrix, index))
}
