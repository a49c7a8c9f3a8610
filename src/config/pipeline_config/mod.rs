//! Pipeline configuration file
//!
//! # Configuration Format
//!
//! ```toml
//! phrase_table = "data/pt.txt"
//! evaluation_corpus = "data/test.de"
//! unlabeled_phrase_ids = "work/unlabeled.ids"
//!
//! source_monolingual = "data/mono.de"
//! source_feature_matrix = "work/src.features.mtx"
//! source_inverted_index = "work/src.index.json"
//! source_similarity_matrix = "work/src.sim.mtx"
//!
//! window_size = 2
//! k_nearest_neighbors = 500
//!
//! algorithm = "StructLabelProp"
//! label_graph = "Dynamic"
//! iterations = 3
//! ```
//!
//! Paths are taken as written, relative to the working directory.


use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PropError, Result};
use crate::propagation::Algorithm;

pub const DEFAULT_CONFIG_FILE: &str = "phrasegraph.toml";

/// Pipeline stage, used to decide which fields are required
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SelectUnlabeled,
    SelectCorpus,
    ExtractFeatures,
    BuildGraph,
    Propagate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SelectUnlabeled => "select-unlabeled",
            Stage::SelectCorpus => "select-corpus",
            Stage::ExtractFeatures => "extract-features",
            Stage::BuildGraph => "build-graph",
            Stage::Propagate => "propagate",
        };
        f.write_str(name)
    }
}

/// Language side a stage works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

/// Where structured propagation gets label-pair similarities from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LabelGraphKind {
    /// The saved target k-NN graph
    #[default]
    Precomputed,
    /// Cosine over the target feature matrix, computed on demand
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub phrase_table: Option<PathBuf>,
    pub evaluation_corpus: Option<PathBuf>,
    /// Source phrases have exactly this many tokens
    pub phrase_length: usize,
    #[serde(alias = "write_unlabeled")]
    pub unlabeled_phrase_ids: Option<PathBuf>,
    pub analyze_unlabeled: bool,

    pub max_target_phrase_length: usize,
    /// Stop selecting sentences for a phrase after this many hits
    pub max_target_phrase_count: usize,
    /// Corpus files handled between refreshes of the selection key set
    pub selection_batch_size: usize,

    pub source_stopwords: Option<PathBuf>,
    pub target_stopwords: Option<PathBuf>,
    pub stop_list_size: usize,
    /// Drop all-stopword labels from candidate sets
    pub filter_stopwords: bool,

    pub id2feature_source: Option<PathBuf>,
    pub id2feature_target: Option<PathBuf>,
    #[serde(alias = "target_phraseID")]
    pub target_phrase_ids: Option<PathBuf>,

    pub source_monolingual: Option<PathBuf>,
    pub target_monolingual: Option<PathBuf>,
    pub source_filtered_monolingual: Option<PathBuf>,
    pub target_filtered_monolingual: Option<PathBuf>,
    pub mbest_location: Option<PathBuf>,

    pub source_feature_matrix: Option<PathBuf>,
    pub target_feature_matrix: Option<PathBuf>,
    pub source_inverted_index: Option<PathBuf>,
    pub target_inverted_index: Option<PathBuf>,
    pub window_size: usize,
    pub minimum_feature_count: f64,

    pub k_nearest_neighbors: usize,
    pub source_similarity_matrix: Option<PathBuf>,
    pub target_similarity_matrix: Option<PathBuf>,

    pub seed_target_knn: bool,
    pub maximum_candidate_size: usize,
    pub lexical_model: Option<PathBuf>,
    pub algorithm: Algorithm,
    pub label_graph: LabelGraphKind,
    pub iterations: usize,
    pub output: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            phrase_table: None,
            evaluation_corpus: None,
            phrase_length: 2,
            unlabeled_phrase_ids: None,
            analyze_unlabeled: false,
            max_target_phrase_length: 5,
            max_target_phrase_count: 100,
            selection_batch_size: 16,
            source_stopwords: None,
            target_stopwords: None,
            stop_list_size: 20,
            filter_stopwords: false,
            id2feature_source: None,
            id2feature_target: None,
            target_phrase_ids: None,
            source_monolingual: None,
            target_monolingual: None,
            source_filtered_monolingual: None,
            target_filtered_monolingual: None,
            mbest_location: None,
            source_feature_matrix: None,
            target_feature_matrix: None,
            source_inverted_index: None,
            target_inverted_index: None,
            window_size: 2,
            minimum_feature_count: 0.0,
            k_nearest_neighbors: 500,
            source_similarity_matrix: None,
            target_similarity_matrix: None,
            seed_target_knn: false,
            maximum_candidate_size: 50,
            lexical_model: None,
            algorithm: Algorithm::LabelProp,
            label_graph: LabelGraphKind::Precomputed,
            iterations: 1,
            output: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PropError::io(path, e))?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    pub fn monolingual(&self, side: Side) -> Option<&Path> {
        match side {
            Side::Source => self.source_monolingual.as_deref(),
            Side::Target => self.target_monolingual.as_deref(),
        }
    }

    pub fn filtered_monolingual(&self, side: Side) -> Option<&Path> {
        match side {
            Side::Source => self.source_filtered_monolingual.as_deref(),
            Side::Target => self.target_filtered_monolingual.as_deref(),
        }
    }

    /// Corpus for feature extraction: the filtered corpus when configured
    pub fn feature_corpus(&self, side: Side) -> Option<&Path> {
        self.filtered_monolingual(side).or_else(|| self.monolingual(side))
    }

    pub fn stopwords(&self, side: Side) -> Option<&Path> {
        match side {
            Side::Source => self.source_stopwords.as_deref(),
            Side::Target => self.target_stopwords.as_deref(),
        }
    }

    pub fn id2feature(&self, side: Side) -> Option<&Path> {
        match side {
            Side::Source => self.id2feature_source.as_deref(),
            Side::Target => self.id2feature_target.as_deref(),
        }
    }

    pub fn feature_matrix(&self, side: Side) -> Option<&Path> {
        match side {
            Side::Source => self.source_feature_matrix.as_deref(),
            Side::Target => self.target_feature_matrix.as_deref(),
        }
    }

    pub fn inverted_index(&self, side: Side) -> Option<&Path> {
        match side {
            Side::Source => self.source_inverted_index.as_deref(),
            Side::Target => self.target_inverted_index.as_deref(),
        }
    }

    pub fn similarity_matrix(&self, side: Side) -> Option<&Path> {
        match side {
            Side::Source => self.source_similarity_matrix.as_deref(),
            Side::Target => self.target_similarity_matrix.as_deref(),
        }
    }

    /// n-gram orders that count as phrases on `side`
    pub fn order_range(&self, side: Side) -> (usize, usize) {
        match side {
            Side::Source => (self.phrase_length, self.phrase_length),
            Side::Target => (1, self.max_target_phrase_length),
        }
    }

    /// Whether propagation needs the saved target similarity matrix
    pub fn needs_target_graph(&self) -> bool {
        self.seed_target_knn
            || (self.algorithm == Algorithm::StructLabelProp
                && self.label_graph == LabelGraphKind::Precomputed)
    }

    /// Fields `stage` cannot run without, paired with whether they are set
    fn required_fields(&self, stage: Stage, side: Side) -> Vec<(String, bool)> {
        let mut fields: Vec<(String, bool)> = Vec::new();
        let mut need = |name: String, present: bool| fields.push((name, present));

        match stage {
            Stage::SelectUnlabeled => {
                need("phrase_table".into(), self.phrase_table.is_some());
                need("evaluation_corpus".into(), self.evaluation_corpus.is_some());
                need("unlabeled_phrase_ids".into(), self.unlabeled_phrase_ids.is_some());
            }
            Stage::SelectCorpus => {
                need("phrase_table".into(), self.phrase_table.is_some());
                if side == Side::Source {
                    need("unlabeled_phrase_ids".into(), self.unlabeled_phrase_ids.is_some());
                }
                need(format!("{}_monolingual", side), self.monolingual(side).is_some());
                need(
                    format!("{}_filtered_monolingual", side),
                    self.filtered_monolingual(side).is_some(),
                );
            }
            Stage::ExtractFeatures => {
                need("phrase_table".into(), self.phrase_table.is_some());
                if side == Side::Source {
                    need("unlabeled_phrase_ids".into(), self.unlabeled_phrase_ids.is_some());
                }
                need(format!("{}_monolingual", side), self.feature_corpus(side).is_some());
                need(format!("{}_feature_matrix", side), self.feature_matrix(side).is_some());
                need(format!("{}_inverted_index", side), self.inverted_index(side).is_some());
            }
            Stage::BuildGraph => {
                need("phrase_table".into(), self.phrase_table.is_some());
                if side == Side::Source {
                    need("unlabeled_phrase_ids".into(), self.unlabeled_phrase_ids.is_some());
                }
                need(format!("{}_feature_matrix", side), self.feature_matrix(side).is_some());
                need(format!("{}_inverted_index", side), self.inverted_index(side).is_some());
                need(
                    format!("{}_similarity_matrix", side),
                    self.similarity_matrix(side).is_some(),
                );
            }
            Stage::Propagate => {
                need("phrase_table".into(), self.phrase_table.is_some());
                need("unlabeled_phrase_ids".into(), self.unlabeled_phrase_ids.is_some());
                need(
                    "source_similarity_matrix".into(),
                    self.source_similarity_matrix.is_some(),
                );
                need("lexical_model".into(), self.lexical_model.is_some());
                need("output".into(), self.output.is_some());
                if self.filter_stopwords {
                    need("target_stopwords".into(), self.target_stopwords.is_some());
                }
                if self.needs_target_graph() {
                    need(
                        "target_similarity_matrix".into(),
                        self.target_similarity_matrix.is_some(),
                    );
                }
                if self.algorithm == Algorithm::StructLabelProp
                    && self.label_graph == LabelGraphKind::Dynamic
                {
                    need("target_feature_matrix".into(), self.target_feature_matrix.is_some());
                }
            }
        }
        fields
    }

    /// Check that `stage` has everything it needs before any work starts.
    /// All missing fields are reported together.
    pub fn validate(&self, stage: Stage, side: Side) -> Result<()> {
        let missing: Vec<String> = self
            .required_fields(stage, side)
            .into_iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| name)
            .collect();
        if !missing.is_empty() {
            return Err(PropError::MissingParameter {
                stage: stage.to_string(),
                field: missing.join(", "),
            });
        }

        if self.phrase_length == 0 {
            return Err(PropError::Config("phrase_length must be at least 1".into()));
        }
        if self.max_target_phrase_length == 0 {
            return Err(PropError::Config(
                "max_target_phrase_length must be at least 1".into(),
            ));
        }
        if self.k_nearest_neighbors == 0 {
            return Err(PropError::Config("k_nearest_neighbors must be at least 1".into()));
        }
        if self.maximum_candidate_size == 0 {
            return Err(PropError::Config(
                "maximum_candidate_size must be at least 1".into(),
            ));
        }
        if self.minimum_feature_count < 0.0 {
            return Err(PropError::Config(
                "minimum_feature_count cannot be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Config written by `phrasegraph init`
pub const EXAMPLE_CONFIG: &str = r#"# phrasegraph configuration
# Stages run in order:
#   select-unlabeled -> select-corpus -> extract-features -> build-graph -> propagate
# select-corpus, extract-features and build-graph take --side source|target.

# Seed phrase table: "src ||| tgt ||| p(t|s) ..."
phrase_table = "data/phrase-table.txt"
# Evaluation set whose unknown phrases get labels
evaluation_corpus = "data/eval.src"
phrase_length = 2
unlabeled_phrase_ids = "work/unlabeled.ids"
analyze_unlabeled = false

# Monolingual text, one tokenized sentence per line (file or directory)
source_monolingual = "data/mono.src"
target_monolingual = "data/mono.tgt"
source_filtered_monolingual = "work/mono.filtered.src"
target_filtered_monolingual = "work/mono.filtered.tgt"
max_target_phrase_length = 5
max_target_phrase_count = 100
# target_phrase_ids = "work/target.ids"

# Frequency-sorted vocabularies; the first stop_list_size types are stopwords
# source_stopwords = "data/vocab.src"
# target_stopwords = "data/vocab.tgt"
stop_list_size = 20
filter_stopwords = false

# Features
window_size = 2
minimum_feature_count = 0
source_feature_matrix = "work/features.src.mtx"
source_inverted_index = "work/index.src.json"
target_feature_matrix = "work/features.tgt.mtx"
target_inverted_index = "work/index.tgt.json"
# id2feature_source = "work/id2feature.src"
# id2feature_target = "work/id2feature.tgt"

# Graphs
k_nearest_neighbors = 500
source_similarity_matrix = "work/sim.src.mtx"
target_similarity_matrix = "work/sim.tgt.mtx"

# Propagation
lexical_model = "data/lex.txt"
# mbest_location = "data/mbest.txt"
seed_target_knn = false
maximum_candidate_size = 50
# LabelProp or StructLabelProp
algorithm = "LabelProp"
# Precomputed or Dynamic (StructLabelProp only)
label_graph = "Precomputed"
iterations = 1
output = "work/expanded-phrase-table.txt"
"#;
