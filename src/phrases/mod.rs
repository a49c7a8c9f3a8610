//! Phrase registry
//!
//! Every phrase (labeled or not) lives in a single arena owned by
//! [`PhraseRegistry`] and is addressed by its integer id everywhere else.
//! The id doubles as the row index in the feature matrix and the
//! similarity graph.
//!
//! Labels (candidate translations) are interned separately. On the target
//! side, the registry built by [`PhraseRegistry::target_side`] uses the
//! source registry's label ids as its phrase ids, so a target similarity
//! graph is indexed by label id.

pub mod ngram;
pub mod stopwords;
pub mod table;

pub use ngram::{extract_ngrams, tokenize, NGram};
pub use stopwords::Stopwords;
pub use table::{
    add_unlabeled_from_corpus, analyze_unlabeled, load_mbest, load_phrase_table,
    read_phrase_ids, register_phrase_ids, write_expanded_table, write_phrase_ids,
    CandidateFeed, OovBreakdown, PhraseTableStats, UnlabeledSelection,
};

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;

/// Sparse label distribution: label id -> probability
pub type LabelDistribution = BTreeMap<u32, f64>;

/// Sums this close to 1.0 are treated as already normalized
const NORMALIZED_TOLERANCE: f64 = 1e-12;

/// A phrase tracked by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    id: u32,
    text: String,
    pub labeled: bool,
    pub label_distribution: LabelDistribution,
    /// Share of corpus occurrences, filled in after feature extraction
    pub marginal: f64,
}

impl Phrase {
    fn new(id: u32, text: String, labeled: bool) -> Self {
        Self {
            id,
            text,
            labeled,
            label_distribution: LabelDistribution::new(),
            marginal: 0.0,
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn is_labeled(&self) -> bool {
        self.labeled
    }

    /// Candidate label ids, ascending
    pub fn labels(&self) -> impl Iterator<Item = u32> + '_ {
        self.label_distribution.keys().copied()
    }

    /// Scale the distribution to sum to 1.
    ///
    /// Empty or zero-mass distributions are left alone, and a distribution
    /// that already sums to 1 is not touched, so calling this twice is the
    /// same as calling it once.
    pub fn normalize_distribution(&mut self) {
        let total: f64 = self.label_distribution.values().sum();
        if !total.is_finite() || total <= 0.0 || (total - 1.0).abs() < NORMALIZED_TOLERANCE {
            return;
        }
        for p in self.label_distribution.values_mut() {
            *p /= total;
        }
    }
}

/// Owner of all phrases and label strings for one side of the pipeline
#[derive(Debug, Default)]
pub struct PhraseRegistry {
    phrases: Vec<Phrase>,
    ids: FxHashMap<String, u32>,
    label_texts: Vec<String>,
    label_ids: FxHashMap<String, u32>,
    /// Tokens of registered labeled phrases
    vocab: FxHashSet<String>,
}

impl PhraseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a phrase, returning its id. An existing phrase keeps its id
    /// and flags.
    pub fn add_phrase(&mut self, text: &str, labeled: bool) -> u32 {
        if let Some(&id) = self.ids.get(text) {
            return id;
        }
        let id = self.phrases.len() as u32;
        self.phrases.push(Phrase::new(id, text.to_string(), labeled));
        self.ids.insert(text.to_string(), id);
        if labeled {
            for token in tokenize(text) {
                if !self.vocab.contains(token) {
                    self.vocab.insert(token.to_string());
                }
            }
        }
        id
    }

    /// Intern a label string, returning its id
    pub fn intern_label(&mut self, text: &str) -> u32 {
        if let Some(&id) = self.label_ids.get(text) {
            return id;
        }
        let id = self.label_texts.len() as u32;
        self.label_texts.push(text.to_string());
        self.label_ids.insert(text.to_string(), id);
        id
    }

    /// Attach a label with an (unnormalized) weight to a phrase
    pub fn add_label(&mut self, phrase_id: u32, label: &str, weight: f64) {
        let label_id = self.intern_label(label);
        if let Some(phrase) = self.phrases.get_mut(phrase_id as usize) {
            phrase.label_distribution.insert(label_id, weight);
        }
    }

    #[inline]
    pub fn phrase(&self, id: u32) -> Option<&Phrase> {
        self.phrases.get(id as usize)
    }

    #[inline]
    pub fn phrase_mut(&mut self, id: u32) -> Option<&mut Phrase> {
        self.phrases.get_mut(id as usize)
    }

    #[inline]
    pub fn phrase_id(&self, text: &str) -> Option<u32> {
        self.ids.get(text).copied()
    }

    #[inline]
    pub fn label_id(&self, text: &str) -> Option<u32> {
        self.label_ids.get(text).copied()
    }

    #[inline]
    pub fn label_text(&self, id: u32) -> Option<&str> {
        self.label_texts.get(id as usize).map(String::as_str)
    }

    pub fn num_labels(&self) -> usize {
        self.label_texts.len()
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Phrase> {
        self.phrases.iter()
    }

    pub fn unlabeled_ids(&self) -> Vec<u32> {
        self.phrases
            .iter()
            .filter(|p| !p.labeled)
            .map(|p| p.id)
            .collect()
    }

    pub fn labeled_ids(&self) -> Vec<u32> {
        self.phrases
            .iter()
            .filter(|p| p.labeled)
            .map(|p| p.id)
            .collect()
    }

    /// Whether `token` appears in any labeled phrase
    pub fn in_vocab(&self, token: &str) -> bool {
        self.vocab.contains(token)
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Normalize every phrase's distribution (see [`Phrase::normalize_distribution`])
    pub fn normalize_label_distributions(&mut self) {
        for phrase in &mut self.phrases {
            phrase.normalize_distribution();
        }
    }

    /// Set each phrase's marginal from raw occurrence counts (indexed by id)
    pub fn set_marginals(&mut self, counts: &[u64]) {
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return;
        }
        for (phrase, &count) in self.phrases.iter_mut().zip(counts) {
            phrase.marginal = count as f64 / total as f64;
        }
    }

    /// Registry over this registry's labels: phrase id == label id, every
    /// phrase unlabeled. Used for target-side features and graphs.
    pub fn target_side(&self) -> PhraseRegistry {
        let mut target = PhraseRegistry::new();
        for text in &self.label_texts {
            target.add_phrase(text, false);
            for token in tokenize(text) {
                if !target.vocab.contains(token) {
                    target.vocab.insert(token.to_string());
                }
            }
        }
        target
    }
}
