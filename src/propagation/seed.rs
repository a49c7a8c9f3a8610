//! Initial candidate labels for unlabeled phrases

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use tracing::info;

use crate::error::Result;
use crate::graph::SimilarityGraph;
use crate::lexical::LexicalScorer;
use crate::phrases::{CandidateFeed, LabelDistribution, Phrase, PhraseRegistry};

/// Knobs for [`init_labels_with_lex_score`]
#[derive(Default)]
pub struct SeedOptions<'a> {
    /// Keep at most this many candidates per phrase
    pub max_candidates: usize,
    /// Labels never offered as candidates
    pub stop_labels: Option<&'a FxHashSet<u32>>,
    /// Target-side graph over label ids; candidates pull in their neighbors
    pub target_graph: Option<&'a SimilarityGraph>,
}

/// Seeding summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedStats {
    pub unlabeled: usize,
    /// Phrases left without any candidate
    pub empty: usize,
    pub total_candidates: usize,
}

impl SeedStats {
    pub fn mean_candidates(&self) -> f64 {
        if self.unlabeled == 0 {
            0.0
        } else {
            self.total_candidates as f64 / self.unlabeled as f64
        }
    }
}

/// Labels of labeled neighbors, generated candidates, and optionally their
/// target-side neighbors, minus stop labels
fn candidate_labels(
    registry: &PhraseRegistry,
    graph: &SimilarityGraph,
    feed: &CandidateFeed,
    options: &SeedOptions<'_>,
    phrase: &Phrase,
) -> BTreeSet<u32> {
    let mut labels = BTreeSet::new();
    for (q, _) in graph.neighbors(phrase.id()) {
        if let Some(neighbor) = registry.phrase(q).filter(|n| n.is_labeled()) {
            labels.extend(neighbor.labels());
        }
    }

    // Generated candidates outside the label vocabulary have no label id
    if let Some(generated) = feed.get(phrase.text()) {
        labels.extend(generated.iter().filter_map(|c| registry.label_id(c)));
    }

    if let Some(target) = options.target_graph {
        let num_labels = registry.num_labels() as u32;
        let expanded: Vec<u32> = labels
            .iter()
            .flat_map(|&l| target.neighbors(l).map(|(n, _)| n))
            .filter(|&n| n < num_labels)
            .collect();
        labels.extend(expanded);
    }

    if let Some(stop) = options.stop_labels {
        labels.retain(|l| !stop.contains(l));
    }
    labels
}

/// Score and truncate one phrase's candidates
fn seed_phrase(
    registry: &PhraseRegistry,
    graph: &SimilarityGraph,
    feed: &CandidateFeed,
    scorer: &dyn LexicalScorer,
    options: &SeedOptions<'_>,
    phrase: &Phrase,
) -> Result<LabelDistribution> {
    let labels: Vec<u32> = candidate_labels(registry, graph, feed, options, phrase)
        .into_iter()
        .collect();
    if labels.is_empty() {
        return Ok(LabelDistribution::new());
    }

    let targets: Vec<&str> = labels
        .iter()
        .map(|&l| registry.label_text(l).unwrap_or_default())
        .collect();
    let sources = vec![phrase.text(); targets.len()];
    let scores = scorer.score_pairs(&sources, &targets)?;

    let mut scored: Vec<(u32, f64)> = labels
        .into_iter()
        .zip(scores)
        .map(|(l, (forward, _))| (l, forward))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(options.max_candidates);
    Ok(scored.into_iter().collect())
}

/// Give every unlabeled phrase its initial candidate distribution, scored
/// by forward lexical probability, then normalize all distributions.
/// A phrase with no candidates ends up with an empty distribution.
pub fn init_labels_with_lex_score(
    registry: &mut PhraseRegistry,
    graph: &SimilarityGraph,
    feed: &CandidateFeed,
    scorer: &dyn LexicalScorer,
    options: &SeedOptions<'_>,
) -> Result<SeedStats> {
    let unlabeled = registry.unlabeled_ids();
    let snapshot: &PhraseRegistry = registry;
    let seeded: Vec<(u32, LabelDistribution)> = unlabeled
        .par_iter()
        .filter_map(|&id| snapshot.phrase(id))
        .map(|p| seed_phrase(snapshot, graph, feed, scorer, options, p).map(|d| (p.id(), d)))
        .collect::<Result<_>>()?;

    let mut stats = SeedStats {
        unlabeled: unlabeled.len(),
        ..Default::default()
    };
    for (id, dist) in seeded {
        stats.total_candidates += dist.len();
        if dist.is_empty() {
            stats.empty += 1;
        }
        if let Some(phrase) = registry.phrase_mut(id) {
            phrase.label_distribution = dist;
        }
    }
    registry.normalize_label_distributions();

    info!(
        "Seeded {} unlabeled phrases; average label set size {:.2}, {} without candidates",
        stats.unlabeled,
        stats.mean_candidates(),
        stats.empty
    );
    Ok(stats)
}
