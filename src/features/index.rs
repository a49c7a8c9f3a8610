//! Inverted index: feature id -> phrases carrying that feature
//!
//! Only used to enumerate neighbor candidates. Weights always come from the
//! feature matrix, so entries pruned from the matrix may linger here.

use dashmap::DashMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{PropError, Result};
use crate::sparse::SparseRow;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvertedIndex {
    buckets: BTreeMap<u32, BTreeSet<u32>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: u32, phrase: u32) {
        self.buckets.entry(feature).or_default().insert(phrase);
    }

    /// Freeze buckets filled concurrently during extraction
    pub fn from_concurrent(buckets: DashMap<u32, FxHashSet<u32>>) -> Self {
        Self {
            buckets: buckets
                .into_iter()
                .map(|(feature, phrases)| (feature, phrases.into_iter().collect()))
                .collect(),
        }
    }

    pub fn bucket(&self, feature: u32) -> Option<&BTreeSet<u32>> {
        self.buckets.get(&feature)
    }

    /// Number of indexed features
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Phrases sharing at least one indexed feature with `row`, ascending,
    /// without `exclude`
    pub fn candidates(&self, row: &SparseRow<'_>, exclude: u32) -> BTreeSet<u32> {
        let mut out = BTreeSet::new();
        for (feature, _) in row.iter() {
            if let Some(bucket) = self.buckets.get(&feature) {
                out.extend(bucket.iter().copied().filter(|&p| p != exclude));
            }
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| PropError::io(path, e))?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| PropError::io(path, e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
