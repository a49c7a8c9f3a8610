//! One propagation iteration
//!
//! New distributions for all unlabeled phrases are computed in parallel
//! from the registry as it stood at the start of the iteration, then
//! committed in one pass. No phrase ever sees a neighbor's value from the
//! same iteration.

use rayon::prelude::*;

use crate::graph::{SimilarityGraph, SimilarityOracle};
use crate::phrases::{LabelDistribution, Phrase, PhraseRegistry};

/// What happened to the unlabeled phrases in one iteration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationStats {
    /// Phrases that received a new distribution
    pub updated: usize,
    /// Phrases with neighbors whose accumulated mass was zero
    pub kept: usize,
    /// Phrases without neighbors
    pub isolated: usize,
    /// Mean label-set size over unlabeled phrases after the commit
    pub mean_labels: f64,
}

enum Outcome {
    Isolated,
    Kept,
    Updated(LabelDistribution),
}

/// Replace a distribution only if something with positive mass accumulated
fn settle(acc: LabelDistribution) -> Outcome {
    let mass: f64 = acc.values().sum();
    if acc.is_empty() || mass.is_nan() || mass <= 0.0 {
        Outcome::Kept
    } else {
        Outcome::Updated(acc)
    }
}

fn neighbor_phrases<'r>(
    registry: &'r PhraseRegistry,
    graph: &'r SimilarityGraph,
    id: u32,
) -> impl Iterator<Item = (&'r Phrase, f64)> + 'r {
    graph
        .neighbors(id)
        .filter_map(move |(q, w)| registry.phrase(q).map(|p| (p, w)))
}

/// Plain label propagation: a label survives only if some neighbor holds it
fn label_prop_update(registry: &PhraseRegistry, graph: &SimilarityGraph, phrase: &Phrase) -> Outcome {
    if !graph.has_neighbors(phrase.id()) {
        return Outcome::Isolated;
    }
    let mut acc = LabelDistribution::new();
    for (neighbor, weight) in neighbor_phrases(registry, graph, phrase.id()) {
        for label in phrase.labels() {
            if let Some(&p) = neighbor.label_distribution.get(&label) {
                *acc.entry(label).or_insert(0.0) += p * weight;
            }
        }
    }
    settle(acc)
}

/// Structured label propagation: every neighbor label supports every own
/// label in proportion to how similar the two labels are
fn struct_label_prop_update(
    registry: &PhraseRegistry,
    graph: &SimilarityGraph,
    labels: &dyn SimilarityOracle,
    phrase: &Phrase,
) -> Outcome {
    if !graph.has_neighbors(phrase.id()) {
        return Outcome::Isolated;
    }
    let mut acc = LabelDistribution::new();
    for (neighbor, weight) in neighbor_phrases(registry, graph, phrase.id()) {
        for (&neighbor_label, &p) in &neighbor.label_distribution {
            for own_label in phrase.labels() {
                *acc.entry(own_label).or_insert(0.0) +=
                    p * weight * labels.similarity(own_label, neighbor_label);
            }
        }
    }
    settle(acc)
}

fn step<F>(registry: &mut PhraseRegistry, update: F) -> IterationStats
where
    F: Fn(&PhraseRegistry, &Phrase) -> Outcome + Sync,
{
    let unlabeled = registry.unlabeled_ids();
    let snapshot: &PhraseRegistry = registry;
    let outcomes: Vec<(u32, Outcome)> = unlabeled
        .par_iter()
        .filter_map(|&id| snapshot.phrase(id).map(|p| (id, update(snapshot, p))))
        .collect();

    let mut stats = IterationStats::default();
    for (id, outcome) in outcomes {
        match outcome {
            Outcome::Isolated => stats.isolated += 1,
            Outcome::Kept => stats.kept += 1,
            Outcome::Updated(dist) => {
                if let Some(phrase) = registry.phrase_mut(id) {
                    phrase.label_distribution = dist;
                    phrase.normalize_distribution();
                    stats.updated += 1;
                }
            }
        }
    }

    if !unlabeled.is_empty() {
        let total: usize = unlabeled
            .iter()
            .filter_map(|&id| registry.phrase(id))
            .map(|p| p.label_distribution.len())
            .sum();
        stats.mean_labels = total as f64 / unlabeled.len() as f64;
    }
    stats
}

/// One iteration of plain label propagation over `graph`
pub fn label_prop_step(registry: &mut PhraseRegistry, graph: &SimilarityGraph) -> IterationStats {
    step(registry, |reg, phrase| label_prop_update(reg, graph, phrase))
}

/// One iteration of structured label propagation; `labels` scores pairs of
/// label ids
pub fn struct_label_prop_step(
    registry: &mut PhraseRegistry,
    graph: &SimilarityGraph,
    labels: &dyn SimilarityOracle,
) -> IterationStats {
    step(registry, |reg, phrase| struct_label_prop_update(reg, graph, labels, phrase))
}
