//! build-graph stage

use anyhow::{bail, Result};
use console::style;

use phrasegraph::config::{PipelineConfig, Side};
use phrasegraph::features::load_features;
use phrasegraph::graph::KnnBuilder;

use super::{bar_callback, progress_bar, required, side_registry};

pub fn run(config: &PipelineConfig, side: Side) -> Result<()> {
    let matrix_path = required(config.feature_matrix(side), "feature_matrix")?;
    let index_path = required(config.inverted_index(side), "inverted_index")?;
    let out = required(config.similarity_matrix(side), "similarity_matrix")?;

    let registry = side_registry(config, side)?;
    let (features, index) = load_features(matrix_path, index_path)?;
    if features.rows() != registry.len() {
        bail!(
            "{} has {} rows but the {} registry has {} phrases; rerun extract-features",
            matrix_path.display(),
            features.rows(),
            side,
            registry.len()
        );
    }

    let bar = progress_bar(features.rows(), "phrases")?;
    let builder = KnnBuilder::new(config.k_nearest_neighbors).with_progress_callback(bar_callback(&bar));
    let (graph, stats) = builder.build(&features, &index)?;
    bar.finish_and_clear();
    graph.save(out)?;

    let analysis = graph.analyze(&registry);
    println!(
        "{} {} graph: {} phrases, {} edges -> {}",
        style("✓").green(),
        side,
        analysis.rows,
        style(analysis.nnz).bold(),
        style(out.display()).cyan()
    );
    println!(
        "  {} featureless, {} with only non-positive candidates",
        stats.featureless, stats.non_positive
    );
    if let Some((id, degree)) = analysis.max_degree {
        let text = registry.phrase(id).map(|p| p.text()).unwrap_or("?");
        println!("  most connected: '{}' ({} neighbors)", text, degree);
    }
    println!(
        "  disconnected: {} labeled, {} unlabeled",
        analysis.disconnected_labeled, analysis.disconnected_unlabeled
    );
    Ok(())
}
