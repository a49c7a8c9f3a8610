//! Stopword lists
//!
//! A stopword file lists types from most to least frequent, one per line.
//! The first `n` entries are stopwords.

use rustc_hash::FxHashSet;
use std::path::Path;

use super::{tokenize, PhraseRegistry};
use crate::corpus::open_lines;
use crate::error::Result;
use crate::features::ContextSide;

#[derive(Debug, Clone, Default)]
pub struct Stopwords {
    tokens: FxHashSet<String>,
}

impl Stopwords {
    /// Load the `n` most frequent types from `path`
    pub fn load(path: &Path, n: usize) -> Result<Self> {
        let mut tokens = FxHashSet::default();
        for line in open_lines(path)? {
            if tokens.len() >= n {
                break;
            }
            let line = line?;
            if let Some(token) = line.split_whitespace().next() {
                tokens.insert(token.to_string());
            }
        }
        Ok(Self { tokens })
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    /// Whether the context feature (token, side) is a stopword feature.
    /// Every stopword type is a stopword on both sides.
    #[inline]
    pub fn is_stop_feature(&self, token: &str, _side: ContextSide) -> bool {
        self.tokens.contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Label ids whose text consists only of stopwords
    pub fn label_ids(&self, registry: &PhraseRegistry) -> FxHashSet<u32> {
        (0..registry.num_labels() as u32)
            .filter(|&id| {
                registry.label_text(id).is_some_and(|text| {
                    let tokens = tokenize(text);
                    !tokens.is_empty() && tokens.iter().all(|t| self.contains(t))
                })
            })
            .collect()
    }
}
