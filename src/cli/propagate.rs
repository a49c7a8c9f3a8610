//! propagate stage

use anyhow::{bail, Context, Result};
use console::style;

use phrasegraph::config::{LabelGraphKind, PipelineConfig};
use phrasegraph::graph::{DynamicGraph, SimilarityGraph, SimilarityOracle};
use phrasegraph::lexical::LexicalTable;
use phrasegraph::phrases::{load_mbest, write_expanded_table, CandidateFeed, Stopwords};
use phrasegraph::propagation::{init_labels_with_lex_score, Algorithm, Propagator, SeedOptions};
use phrasegraph::sparse::read_market;

use super::{required, source_registry};

pub fn run(config: &PipelineConfig) -> Result<()> {
    let graph_path = required(config.source_similarity_matrix.as_deref(), "source_similarity_matrix")?;
    let lex_path = required(config.lexical_model.as_deref(), "lexical_model")?;
    let out = required(config.output.as_deref(), "output")?;

    let mut registry = source_registry(config)?;
    let graph = SimilarityGraph::load(graph_path)?;
    if graph.len() != registry.len() {
        bail!(
            "{} covers {} phrases but the registry has {}; rebuild the source graph",
            graph_path.display(),
            graph.len(),
            registry.len()
        );
    }

    let feed = match config.mbest_location.as_deref() {
        Some(path) => load_mbest(path)
            .with_context(|| format!("Failed to read m-best list {}", path.display()))?,
        None => CandidateFeed::default(),
    };
    let lexical = LexicalTable::load(lex_path)
        .with_context(|| format!("Failed to load lexical model {}", lex_path.display()))?;

    let stop_labels = if config.filter_stopwords {
        let path = required(config.target_stopwords.as_deref(), "target_stopwords")?;
        Some(Stopwords::load(path, config.stop_list_size)?.label_ids(&registry))
    } else {
        None
    };

    let target_graph = if config.needs_target_graph() {
        let path = required(config.target_similarity_matrix.as_deref(), "target_similarity_matrix")?;
        let target = SimilarityGraph::load(path)?;
        if target.len() != registry.num_labels() {
            bail!(
                "{} covers {} labels but the phrase table has {}; rebuild the target graph",
                path.display(),
                target.len(),
                registry.num_labels()
            );
        }
        Some(target)
    } else {
        None
    };

    let options = SeedOptions {
        max_candidates: config.maximum_candidate_size,
        stop_labels: stop_labels.as_ref(),
        target_graph: target_graph.as_ref().filter(|_| config.seed_target_knn),
    };
    let seed = init_labels_with_lex_score(&mut registry, &graph, &feed, &lexical, &options)?;

    let dynamic = match (config.algorithm, config.label_graph) {
        (Algorithm::StructLabelProp, LabelGraphKind::Dynamic) => {
            let path = required(config.target_feature_matrix.as_deref(), "target_feature_matrix")?;
            Some(DynamicGraph::new(read_market(path)?))
        }
        _ => None,
    };

    let mut propagator = Propagator::new(&graph, config.algorithm);
    if config.algorithm == Algorithm::StructLabelProp {
        let oracle: &dyn SimilarityOracle = match (&dynamic, &target_graph) {
            (Some(d), _) => d,
            (None, Some(t)) => t,
            (None, None) => bail!("StructLabelProp needs a target similarity graph"),
        };
        propagator = propagator.with_label_oracle(oracle);
    }
    let history = propagator.run(&mut registry, config.iterations)?;
    let written = write_expanded_table(&registry, out)?;

    println!(
        "{} seeded {} unlabeled phrases, {:.2} candidates on average ({} without any)",
        style("✓").green(),
        seed.unlabeled,
        seed.mean_candidates(),
        seed.empty
    );
    if let Some(last) = history.last() {
        println!(
            "{} {} x {}: {} updated in the last iteration, mean label set {:.2}",
            style("✓").green(),
            config.algorithm,
            history.len(),
            last.updated,
            last.mean_labels
        );
    }
    if let Some(d) = &dynamic {
        println!("  {} label pairs scored on demand", d.cached_pairs());
    }
    println!(
        "{} {} phrase pairs -> {}",
        style("✓").green(),
        style(written).bold(),
        style(out.display()).cyan()
    );
    Ok(())
}
