//! Lexical phrase-pair scoring
//!
//! A phrase pair is scored from a word translation table: for every target
//! word take the best `p(e|f)` over the source words (plus NULL) and
//! multiply those maxima, done in -log10 space with a floor for unknown
//! words. The backward score swaps the roles.

use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::corpus::open_lines;
use crate::error::{PropError, Result};
use crate::phrases::tokenize;

/// Word aligned to nothing
pub const NULL_WORD: &str = "NULL";

/// -log10 cost charged for a word with no translation probability
const MAX_SCORE: f64 = 99.0;

/// Scores (source, target) phrase pairs as (forward, backward) probabilities
pub trait LexicalScorer: Send + Sync {
    fn score_pairs(&self, sources: &[&str], targets: &[&str]) -> Result<Vec<(f64, f64)>>;
}

/// Word translation table read from `f e p(e|f) p(f|e)` lines
#[derive(Debug, Default)]
pub struct LexicalTable {
    /// source word -> target word -> (p(e|f), p(f|e))
    entries: FxHashMap<String, FxHashMap<String, (f64, f64)>>,
}

impl LexicalTable {
    /// Load a table. A missing file is an error; malformed lines are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let mut table = Self::default();
        let mut skipped = 0usize;
        for (idx, line) in open_lines(path)?.enumerate() {
            let line = line?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            let parsed = match fields.as_slice() {
                [f, e, egf, fge] => egf
                    .parse::<f64>()
                    .ok()
                    .zip(fge.parse::<f64>().ok())
                    .map(|probs| (*f, *e, probs)),
                _ => None,
            };
            match parsed {
                Some((f, e, (egf, fge))) => table.insert(f, e, egf, fge),
                None => {
                    if !line.trim().is_empty() {
                        debug!("{}:{}: skipping malformed lexical entry", path.display(), idx + 1);
                        skipped += 1;
                    }
                }
            }
        }
        info!(
            "Lexical table: {} source words, {} malformed lines skipped",
            table.entries.len(),
            skipped
        );
        Ok(table)
    }

    pub fn insert(&mut self, f: &str, e: &str, e_given_f: f64, f_given_e: f64) {
        self.entries
            .entry(f.to_string())
            .or_default()
            .insert(e.to_string(), (e_given_f, f_given_e));
    }

    fn lookup(&self, f: &str, e: &str) -> (f64, f64) {
        self.entries
            .get(f)
            .and_then(|row| row.get(e))
            .copied()
            .unwrap_or((0.0, 0.0))
    }

    /// (lex(e|f), lex(f|e)) for one phrase pair
    pub fn score(&self, source: &str, target: &str) -> (f64, f64) {
        let src = tokenize(source);
        let tgt = tokenize(target);

        let forward: f64 = tgt
            .iter()
            .map(|e| {
                let best = src
                    .iter()
                    .copied()
                    .chain(std::iter::once(NULL_WORD))
                    .map(|f| self.lookup(f, e).0)
                    .fold(0.0, f64::max);
                cost(best)
            })
            .sum();

        let backward: f64 = src
            .iter()
            .map(|f| {
                let best = tgt
                    .iter()
                    .copied()
                    .chain(std::iter::once(NULL_WORD))
                    .map(|e| self.lookup(f, e).1)
                    .fold(0.0, f64::max);
                cost(best)
            })
            .sum();

        (10f64.powf(-forward), 10f64.powf(-backward))
    }
}

#[inline]
fn cost(p: f64) -> f64 {
    if p > 0.0 {
        -p.log10()
    } else {
        MAX_SCORE
    }
}

impl LexicalScorer for LexicalTable {
    fn score_pairs(&self, sources: &[&str], targets: &[&str]) -> Result<Vec<(f64, f64)>> {
        if sources.len() != targets.len() {
            return Err(PropError::DimensionMismatch(format!(
                "{} source phrases for {} target phrases",
                sources.len(),
                targets.len()
            )));
        }
        Ok(sources
            .iter()
            .zip(targets)
            .map(|(s, t)| self.score(s, t))
            .collect())
    }
}
