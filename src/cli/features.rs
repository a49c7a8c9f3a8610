//! extract-features stage

use anyhow::{Context, Result};
use console::style;
use tracing::debug;

use phrasegraph::config::{PipelineConfig, Side};
use phrasegraph::corpus::list_corpus_files;
use phrasegraph::features::{prune_by_count, rescale_to_pmi, save_features, FeatureExtractor};
use phrasegraph::phrases::Stopwords;

use super::{bar_callback, progress_bar, required, side_registry};

pub fn run(config: &PipelineConfig, side: Side) -> Result<()> {
    let corpus = required(config.feature_corpus(side), "monolingual")?;
    let matrix_path = required(config.feature_matrix(side), "feature_matrix")?;
    let index_path = required(config.inverted_index(side), "inverted_index")?;

    let mut registry = side_registry(config, side)?;
    let stopwords = match config.stopwords(side) {
        Some(path) => Stopwords::load(path, config.stop_list_size)
            .with_context(|| format!("Failed to read stopwords {}", path.display()))?,
        None => Stopwords::default(),
    };
    let files = list_corpus_files(corpus)?;
    let (min_order, max_order) = config.order_range(side);

    let bar = progress_bar(files.len(), "corpus files")?;
    let extractor = FeatureExtractor::new(&registry, config.window_size, min_order, max_order)
        .with_stopwords(&stopwords)
        .with_progress_callback(bar_callback(&bar));
    extractor.extract_files(&files)?;
    let mut space = extractor.finish()?;
    bar.finish_and_clear();

    registry.set_marginals(&space.occurrences);
    if let Some(top) = registry
        .iter()
        .max_by(|a, b| a.marginal.total_cmp(&b.marginal))
    {
        debug!("Most frequent phrase: '{}' ({:.4})", top.text(), top.marginal);
    }

    let pruned = prune_by_count(&mut space.matrix, config.minimum_feature_count);
    rescale_to_pmi(&mut space.matrix)?;
    save_features(&space.matrix, &space.index, matrix_path, index_path)?;
    if let Some(path) = config.id2feature(side) {
        space.vocab.write_id2feature(path)?;
    }

    println!(
        "{} {} features: {} phrases x {} features, {} entries ({} pruned)",
        style("✓").green(),
        side,
        space.matrix.rows(),
        style(space.matrix.cols()).bold(),
        space.matrix.nnz(),
        pruned
    );
    println!(
        "  {} indexed features, {} stopwords -> {}",
        space.index.len(),
        stopwords.len(),
        style(matrix_path.display()).cyan()
    );
    Ok(())
}
