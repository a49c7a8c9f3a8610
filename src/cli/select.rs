//! select-unlabeled and select-corpus stages

use anyhow::{Context, Result};
use console::style;

use phrasegraph::config::{PipelineConfig, Side};
use phrasegraph::corpus::{list_corpus_files, select_sentences, SelectionConfig};
use phrasegraph::phrases::{
    add_unlabeled_from_corpus, analyze_unlabeled, load_phrase_table, write_phrase_ids,
    PhraseRegistry,
};

use super::{required, side_registry};

pub fn run_unlabeled(config: &PipelineConfig) -> Result<()> {
    let pt = required(config.phrase_table.as_deref(), "phrase_table")?;
    let eval = required(config.evaluation_corpus.as_deref(), "evaluation_corpus")?;
    let out = required(config.unlabeled_phrase_ids.as_deref(), "unlabeled_phrase_ids")?;

    let mut registry = PhraseRegistry::new();
    let stats = load_phrase_table(&mut registry, pt, config.phrase_length)
        .with_context(|| format!("Failed to read phrase table {}", pt.display()))?;
    let selection = add_unlabeled_from_corpus(&mut registry, eval, config.phrase_length)
        .with_context(|| format!("Failed to read evaluation corpus {}", eval.display()))?;
    write_phrase_ids(&registry, &selection.added, out)?;

    println!(
        "{} {} labeled phrases ({} table lines, {} skipped)",
        style("✓").green(),
        style(stats.registered).bold(),
        stats.lines,
        stats.wrong_length + stats.malformed
    );
    println!(
        "{} {} unlabeled of {} distinct {}-grams -> {}",
        style("✓").green(),
        style(selection.added.len()).bold(),
        selection.distinct_ngrams,
        config.phrase_length,
        style(out.display()).cyan()
    );

    if config.analyze_unlabeled {
        let oov = analyze_unlabeled(&registry, &selection.counts);
        println!("  all tokens known:  {:>8} phrases, {:>8} occurrences", oov.all_known, oov.all_known_tokens);
        println!("  some tokens known: {:>8} phrases, {:>8} occurrences", oov.some_known, oov.some_known_tokens);
        println!("  no tokens known:   {:>8} phrases, {:>8} occurrences", oov.none_known, oov.none_known_tokens);
    }
    Ok(())
}

pub fn run_corpus(config: &PipelineConfig, side: Side) -> Result<()> {
    let corpus = required(config.monolingual(side), "monolingual")?;
    let out = required(config.filtered_monolingual(side), "filtered_monolingual")?;

    let registry = side_registry(config, side)?;
    if side == Side::Target {
        if let Some(ids_path) = config.target_phrase_ids.as_deref() {
            let all: Vec<u32> = (0..registry.len() as u32).collect();
            write_phrase_ids(&registry, &all, ids_path)?;
        }
    }

    let keys: Vec<String> = registry.iter().map(|p| p.text().to_string()).collect();
    let (min_order, max_order) = config.order_range(side);
    let selection = SelectionConfig {
        min_order,
        max_order,
        max_count: config.max_target_phrase_count,
        batch_size: config.selection_batch_size,
    };
    let files = list_corpus_files(corpus)?;
    let result = select_sentences(&files, &keys, &selection, out)?;

    println!(
        "{} {} {} sentences -> {}",
        style("✓").green(),
        side,
        style(result.sentences).bold(),
        style(out.display()).cyan()
    );
    println!(
        "  {} of {} phrases found, {} never seen",
        result.covered.len(),
        keys.len(),
        result.uncovered
    );
    Ok(())
}
