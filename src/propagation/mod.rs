//! Label propagation
//!
//! Seeding ([`init_labels_with_lex_score`]) fixes each unlabeled phrase's
//! candidate label set. The iterations only move probability mass between
//! those candidates: plain propagation may drop labels no neighbor shares,
//! structured propagation keeps every key and reweights it.
//!
//! There is no convergence test; the iteration count is the only stopping
//! rule.

pub mod seed;
pub mod update;


pub use seed::{init_labels_with_lex_score, SeedOptions, SeedStats};
pub use update::{label_prop_step, struct_label_prop_step, IterationStats};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PropError, Result};
use crate::graph::{SimilarityGraph, SimilarityOracle};
use crate::phrases::PhraseRegistry;

/// Propagation update rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    #[default]
    LabelProp,
    StructLabelProp,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::LabelProp => write!(f, "LabelProp"),
            Algorithm::StructLabelProp => write!(f, "StructLabelProp"),
        }
    }
}

/// Runs a fixed number of propagation iterations over a source graph
pub struct Propagator<'a> {
    graph: &'a SimilarityGraph,
    algorithm: Algorithm,
    label_oracle: Option<&'a dyn SimilarityOracle>,
}

impl<'a> Propagator<'a> {
    pub fn new(graph: &'a SimilarityGraph, algorithm: Algorithm) -> Self {
        Self {
            graph,
            algorithm,
            label_oracle: None,
        }
    }

    /// Similarity between label ids, required by [`Algorithm::StructLabelProp`]
    pub fn with_label_oracle(mut self, oracle: &'a dyn SimilarityOracle) -> Self {
        self.label_oracle = Some(oracle);
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Run one iteration
    pub fn step(&self, registry: &mut PhraseRegistry) -> Result<IterationStats> {
        match self.algorithm {
            Algorithm::LabelProp => Ok(label_prop_step(registry, self.graph)),
            Algorithm::StructLabelProp => {
                let oracle = self.label_oracle.ok_or_else(|| {
                    PropError::Config("StructLabelProp needs a label similarity graph".to_string())
                })?;
                Ok(struct_label_prop_step(registry, self.graph, oracle))
            }
        }
    }

    /// Run `iterations` iterations, returning per-iteration stats
    pub fn run(&self, registry: &mut PhraseRegistry, iterations: usize) -> Result<Vec<IterationStats>> {
        let mut history = Vec::with_capacity(iterations);
        for i in 0..iterations {
            let stats = self.step(registry)?;
            info!(
                "{} iteration {}/{}: {} updated, {} kept, {} isolated, mean label set {:.2}",
                self.algorithm,
                i + 1,
                iterations,
                stats.updated,
                stats.kept,
                stats.isolated,
                stats.mean_labels
            );
            history.push(stats);
        }
        Ok(history)
    }
}
