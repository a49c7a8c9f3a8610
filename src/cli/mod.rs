//! CLI command definitions and handlers

mod features;
mod graph;
mod init;
mod propagate;
mod select;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use phrasegraph::config::{PipelineConfig, Side, Stage, DEFAULT_CONFIG_FILE};
use phrasegraph::phrases::{load_phrase_table, read_phrase_ids, register_phrase_ids, PhraseRegistry};
use phrasegraph::ProgressCallback;

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// phrasegraph - graph-based phrase table expansion
#[derive(Parser, Debug)]
#[command(name = "phrasegraph")]
#[command(
    version,
    about = "Expand a phrase table by propagating translations over a phrase similarity graph",
    after_help = "\
Stages (run in order):
  phrasegraph init                               Write an example phrasegraph.toml
  phrasegraph select-unlabeled                   Find unknown phrases in the evaluation set
  phrasegraph select-corpus --side source        Keep monolingual sentences mentioning them
  phrasegraph extract-features --side source     Context features + inverted index
  phrasegraph build-graph --side source          k-NN similarity graph
  phrasegraph propagate                          Seed candidates, propagate, write the table"
)]
pub struct Cli {
    /// Pipeline configuration file
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_FILE, env = "PHRASEGRAPH_CONFIG")]
    pub config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Number of parallel workers (1-64)
    #[arg(long, global = true, default_value = "8", value_parser = parse_workers)]
    pub workers: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Register evaluation-set phrases missing from the phrase table and write their ids
    SelectUnlabeled,

    /// Copy monolingual sentences that contain phrases of interest
    SelectCorpus {
        #[arg(long, value_enum, default_value = "source")]
        side: Side,
    },

    /// Extract context features, reweight to PMI, and save the matrix and index
    ExtractFeatures {
        #[arg(long, value_enum, default_value = "source")]
        side: Side,
    },

    /// Build the k-nearest-neighbor similarity graph from saved features
    BuildGraph {
        #[arg(long, value_enum, default_value = "source")]
        side: Side,
    },

    /// Seed candidate translations, propagate, and write the expanded table
    Propagate,
}

pub fn run(cli: Cli) -> Result<()> {
    let (stage, side) = match cli.command {
        Commands::Init { force } => return init::run(&cli.config, force),
        Commands::SelectUnlabeled => (Stage::SelectUnlabeled, Side::Source),
        Commands::SelectCorpus { side } => (Stage::SelectCorpus, side),
        Commands::ExtractFeatures { side } => (Stage::ExtractFeatures, side),
        Commands::BuildGraph { side } => (Stage::BuildGraph, side),
        Commands::Propagate => (Stage::Propagate, Side::Source),
    };

    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    config.validate(stage, side)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cli.workers)
        .build()?;

    pool.install(|| match stage {
        Stage::SelectUnlabeled => select::run_unlabeled(&config),
        Stage::SelectCorpus => select::run_corpus(&config, side),
        Stage::ExtractFeatures => features::run(&config, side),
        Stage::BuildGraph => graph::run(&config, side),
        Stage::Propagate => propagate::run(&config),
    })
}

/// A path `validate` already guaranteed, as an error rather than a panic
/// if that ever stops holding
fn required<'a>(value: Option<&'a Path>, field: &str) -> Result<&'a Path> {
    value.with_context(|| format!("'{}' is not set", field))
}

/// Phrase table phrases plus the unlabeled phrases chosen by
/// `select-unlabeled`, with normalized distributions
fn source_registry(config: &PipelineConfig) -> Result<PhraseRegistry> {
    let pt = required(config.phrase_table.as_deref(), "phrase_table")?;
    let ids = required(config.unlabeled_phrase_ids.as_deref(), "unlabeled_phrase_ids")?;

    let mut registry = PhraseRegistry::new();
    load_phrase_table(&mut registry, pt, config.phrase_length)
        .with_context(|| format!("Failed to read phrase table {}", pt.display()))?;
    let entries = read_phrase_ids(ids)
        .with_context(|| format!("Failed to read phrase ids {}", ids.display()))?;
    register_phrase_ids(&mut registry, &entries)?;
    registry.normalize_label_distributions();
    Ok(registry)
}

/// Registry whose ids index the matrices of `side`
fn side_registry(config: &PipelineConfig, side: Side) -> Result<PhraseRegistry> {
    match side {
        Side::Source => source_registry(config),
        Side::Target => {
            let pt = required(config.phrase_table.as_deref(), "phrase_table")?;
            let mut registry = PhraseRegistry::new();
            load_phrase_table(&mut registry, pt, config.phrase_length)
                .with_context(|| format!("Failed to read phrase table {}", pt.display()))?;
            Ok(registry.target_side())
        }
    }
}

fn bar_style() -> Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("█▓▒░  "))
}

fn progress_bar(len: usize, msg: &'static str) -> Result<ProgressBar> {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(bar_style()?);
    bar.set_message(msg);
    Ok(bar)
}

/// Forward library progress to a bar
fn bar_callback(bar: &ProgressBar) -> ProgressCallback {
    let bar = bar.clone();
    Box::new(move |done, _total| bar.set_position(done as u64))
}
