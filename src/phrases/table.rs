//! Phrase table, phrase-id, and candidate-list files
//!
//! All formats are line-oriented with ` ||| ` as field separator:
//!
//! - phrase table: `src ||| tgt ||| p(t|s) [other scores] [||| ...]`
//! - phrase ids:   `text ||| id`
//! - m-best list:  `src ||| candidate`
//!
//! Malformed lines are skipped and counted, never fatal.

use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{extract_ngrams, tokenize, PhraseRegistry};
use crate::corpus::open_lines;
use crate::error::{PropError, Result};

pub const DELIMITER: &str = " ||| ";

/// Generated candidates per source phrase (decoder m-best list)
pub type CandidateFeed = FxHashMap<String, Vec<String>>;

/// Counts from reading a phrase table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhraseTableStats {
    pub lines: usize,
    /// Lines whose source side had the requested length
    pub registered: usize,
    pub wrong_length: usize,
    pub malformed: usize,
    /// Longest target phrase, in tokens, with its source
    pub longest_target: Option<(String, String, usize)>,
}

/// Register every source phrase of length `phrase_length` from a phrase
/// table as labeled, with its forward probability as the label weight.
pub fn load_phrase_table(
    registry: &mut PhraseRegistry,
    path: &Path,
    phrase_length: usize,
) -> Result<PhraseTableStats> {
    let mut stats = PhraseTableStats::default();

    for (idx, line) in open_lines(path)?.enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;

        let fields: Vec<&str> = line.split(DELIMITER).collect();
        let forward = fields
            .get(2)
            .and_then(|scores| scores.split_whitespace().next())
            .and_then(|s| s.parse::<f64>().ok());
        let (src, tgt, forward) = match (fields.first(), fields.get(1), forward) {
            (Some(src), Some(tgt), Some(forward)) if !src.is_empty() && !tgt.is_empty() => {
                (src.trim(), tgt.trim(), forward)
            }
            _ => {
                debug!("{}:{}: skipping malformed phrase table line", path.display(), idx + 1);
                stats.malformed += 1;
                continue;
            }
        };

        if tokenize(src).len() != phrase_length {
            stats.wrong_length += 1;
            continue;
        }

        let id = registry.add_phrase(src, true);
        registry.add_label(id, tgt, forward);
        stats.registered += 1;

        let tgt_len = tokenize(tgt).len();
        if stats.longest_target.as_ref().is_none_or(|(_, _, len)| tgt_len > *len) {
            stats.longest_target = Some((src.to_string(), tgt.to_string(), tgt_len));
        }
    }

    info!(
        "Phrase table: {} lines, {} phrases of length {}, vocabulary {}",
        stats.lines,
        registry.len(),
        phrase_length,
        registry.vocab_size()
    );
    if let Some((src, tgt, len)) = &stats.longest_target {
        debug!("Longest target phrase ({} tokens): {} ||| {}", len, src, tgt);
    }
    Ok(stats)
}

/// N-grams of the evaluation corpus that are not in the phrase table
#[derive(Debug, Clone, Default)]
pub struct UnlabeledSelection {
    /// Distinct n-grams seen in the corpus
    pub distinct_ngrams: usize,
    /// Ids of newly registered unlabeled phrases, ascending
    pub added: Vec<u32>,
    /// Corpus frequency of every n-gram
    pub counts: FxHashMap<String, usize>,
}

/// Register the `phrase_length`-grams of an evaluation corpus that the
/// registry does not know yet as unlabeled phrases. New ids follow the
/// sorted n-gram order so the numbering is reproducible.
pub fn add_unlabeled_from_corpus(
    registry: &mut PhraseRegistry,
    path: &Path,
    phrase_length: usize,
) -> Result<UnlabeledSelection> {
    let mut counts: FxHashMap<String, usize> = FxHashMap::default();
    for line in open_lines(path)? {
        let line = line?;
        let tokens = tokenize(&line);
        for gram in extract_ngrams(&tokens, phrase_length) {
            *counts.entry(gram.text).or_insert(0) += 1;
        }
    }

    let mut unseen: Vec<&String> = counts
        .keys()
        .filter(|g| registry.phrase_id(g).is_none())
        .collect();
    unseen.sort();

    let added: Vec<u32> = unseen
        .into_iter()
        .map(|g| registry.add_phrase(g, false))
        .collect();

    info!(
        "Evaluation corpus: {} distinct {}-grams, {} unlabeled",
        counts.len(),
        phrase_length,
        added.len()
    );

    Ok(UnlabeledSelection {
        distinct_ngrams: counts.len(),
        added,
        counts,
    })
}

/// Unlabeled phrases split by how many of their tokens the phrase table knows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OovBreakdown {
    pub all_known: usize,
    pub all_known_tokens: usize,
    pub some_known: usize,
    pub some_known_tokens: usize,
    pub none_known: usize,
    pub none_known_tokens: usize,
}

/// Categorize unlabeled phrases by token coverage, weighting each category
/// by corpus frequency
pub fn analyze_unlabeled(
    registry: &PhraseRegistry,
    counts: &FxHashMap<String, usize>,
) -> OovBreakdown {
    let mut breakdown = OovBreakdown::default();
    for phrase in registry.iter().filter(|p| !p.is_labeled()) {
        let freq = counts.get(phrase.text()).copied().unwrap_or(0);
        let tokens = tokenize(phrase.text());
        let known = tokens.iter().filter(|t| registry.in_vocab(t)).count();
        if known == tokens.len() {
            breakdown.all_known += 1;
            breakdown.all_known_tokens += freq;
        } else if known == 0 {
            breakdown.none_known += 1;
            breakdown.none_known_tokens += freq;
        } else {
            breakdown.some_known += 1;
            breakdown.some_known_tokens += freq;
        }
    }
    breakdown
}

/// Write `text ||| id` for each phrase in `ids`
pub fn write_phrase_ids(registry: &PhraseRegistry, ids: &[u32], path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| PropError::io(path, e))?;
    let mut out = BufWriter::new(file);
    for &id in ids {
        if let Some(phrase) = registry.phrase(id) {
            writeln!(out, "{}{}{}", phrase.text(), DELIMITER, id)
                .map_err(|e| PropError::io(path, e))?;
        }
    }
    out.flush().map_err(|e| PropError::io(path, e))
}

/// Read a phrase-id file; lines without a numeric id are skipped
pub fn read_phrase_ids(path: &Path) -> Result<Vec<(String, u32)>> {
    let mut entries = Vec::new();
    for (idx, line) in open_lines(path)?.enumerate() {
        let line = line?;
        let parsed = line
            .rsplit_once(DELIMITER.trim_end())
            .and_then(|(text, id)| Some((text.trim(), id.trim().parse::<u32>().ok()?)));
        match parsed {
            Some((text, id)) if !text.is_empty() => entries.push((text.to_string(), id)),
            _ => debug!("{}:{}: skipping malformed phrase id line", path.display(), idx + 1),
        }
    }
    Ok(entries)
}

/// Register phrase-id entries as unlabeled phrases.
///
/// Ids must continue the registry's numbering: a file written for a
/// different phrase table would silently misalign every matrix row, so a
/// gap or mismatch is a configuration error.
pub fn register_phrase_ids(registry: &mut PhraseRegistry, entries: &[(String, u32)]) -> Result<()> {
    let mut sorted: Vec<&(String, u32)> = entries.iter().collect();
    sorted.sort_by_key(|(_, id)| *id);
    for (text, id) in sorted {
        if let Some(existing) = registry.phrase_id(text) {
            if existing != *id {
                return Err(PropError::Config(format!(
                    "phrase '{}' has id {} in the phrase id file but {} in the registry",
                    text, id, existing
                )));
            }
            continue;
        }
        if *id as usize != registry.len() {
            return Err(PropError::Config(format!(
                "phrase id file expects '{}' at id {}, next free id is {}",
                text,
                id,
                registry.len()
            )));
        }
        registry.add_phrase(text, false);
    }
    Ok(())
}

/// Read an m-best candidate list into source phrase -> candidates,
/// dropping repeated candidates but keeping first-seen order
pub fn load_mbest(path: &Path) -> Result<CandidateFeed> {
    let mut feed: CandidateFeed = FxHashMap::default();
    for (idx, line) in open_lines(path)?.enumerate() {
        let line = line?;
        let mut fields = line.split(DELIMITER);
        match (fields.next().map(str::trim), fields.next().map(str::trim)) {
            (Some(src), Some(cand)) if !src.is_empty() && !cand.is_empty() => {
                let cands = feed.entry(src.to_string()).or_default();
                if !cands.iter().any(|c| c == cand) {
                    cands.push(cand.to_string());
                }
            }
            _ => debug!("{}:{}: skipping malformed m-best line", path.display(), idx + 1),
        }
    }
    Ok(feed)
}

/// Write `src ||| tgt ||| prob` for every unlabeled phrase with a
/// non-empty distribution, most probable label first. Returns the number
/// of lines written.
pub fn write_expanded_table(registry: &PhraseRegistry, path: &Path) -> Result<usize> {
    let file = File::create(path).map_err(|e| PropError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let mut written = 0;

    for phrase in registry.iter().filter(|p| !p.is_labeled()) {
        let mut labels: Vec<(u32, f64)> = phrase
            .label_distribution
            .iter()
            .map(|(&l, &p)| (l, p))
            .collect();
        labels.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (label, prob) in labels {
            let Some(tgt) = registry.label_text(label) else {
                continue;
            };
            writeln!(out, "{}{}{}{}{}", phrase.text(), DELIMITER, tgt, DELIMITER, prob)
                .map_err(|e| PropError::io(path, e))?;
            written += 1;
        }
    }

    out.flush().map_err(|e| PropError::io(path, e))?;
    Ok(written)
}
