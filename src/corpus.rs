//! Monolingual corpus access and sentence selection
//!
//! Corpora are plain text, one tokenized sentence per line. A corpus
//! location is either a single file or a directory of files.

use flate2::read::MultiGzDecoder;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::{PropError, Result};
use crate::phrases::{extract_ngrams, tokenize};

/// Line iterator over a text file; I/O errors carry the path.
///
/// Files ending in `.gz` are decompressed on the fly (concatenated gzip
/// members included).
pub fn open_lines(path: &Path) -> Result<impl Iterator<Item = Result<String>>> {
    let file = File::open(path).map_err(|e| PropError::io(path, e))?;
    let reader: Box<dyn BufRead + Send> = if is_gzip(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    let path = path.to_path_buf();
    Ok(reader
        .lines()
        .map(move |line| line.map_err(|e| PropError::io(&path, e))))
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Files making up a corpus: the path itself, or the regular files in a
/// directory in name order
pub fn list_corpus_files(path: &Path) -> Result<Vec<PathBuf>> {
    let meta = std::fs::metadata(path).map_err(|e| PropError::io(path, e))?;
    if !meta.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path).map_err(|e| PropError::io(path, e))? {
        let entry = entry.map_err(|e| PropError::io(path, e))?;
        let file_path = entry.path();
        let hidden = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if file_path.is_file() && !hidden {
            files.push(file_path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parameters for [`select_sentences`]
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    pub min_order: usize,
    pub max_order: usize,
    /// Stop looking for a key once it has been seen this many times
    pub max_count: usize,
    /// Files processed between recomputations of the active key set
    pub batch_size: usize,
}

/// Outcome of a sentence selection pass
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    pub sentences: usize,
    /// Keys that occurred at least once, sorted
    pub covered: Vec<String>,
    pub uncovered: usize,
}

/// Copy every corpus line containing at least one of `keys` (as an n-gram
/// in the configured order range) to `out`.
///
/// Files are processed in parallel within a batch. Keys that already reached
/// `max_count` are dropped from the search set at each batch boundary, so a
/// key can overshoot its cap by at most one batch worth of hits.
pub fn select_sentences(
    files: &[PathBuf],
    keys: &[String],
    config: &SelectionConfig,
    out: &Path,
) -> Result<SelectionResult> {
    let out_file = File::create(out).map_err(|e| PropError::io(out, e))?;
    let writer = Mutex::new(BufWriter::new(out_file));

    let counts: Mutex<FxHashMap<String, usize>> =
        Mutex::new(keys.iter().map(|k| (k.clone(), 0)).collect());
    let sentences = Mutex::new(0usize);
    let mut active: FxHashSet<String> = keys.iter().cloned().collect();

    info!("Selecting sentences for {} keys from {} files", keys.len(), files.len());

    for batch in files.chunks(config.batch_size.max(1)) {
        if active.is_empty() {
            break;
        }

        batch.par_iter().try_for_each(|file| -> Result<()> {
            for line in open_lines(file)? {
                let line = line?;
                let line = line.trim();
                let tokens = tokenize(line);
                let hits: FxHashSet<String> = (config.min_order..=config.max_order)
                    .flat_map(|n| extract_ngrams(&tokens, n))
                    .filter(|g| active.contains(&g.text))
                    .map(|g| g.text)
                    .collect();
                if hits.is_empty() {
                    continue;
                }

                {
                    let mut w = writer.lock().unwrap_or_else(|e| e.into_inner());
                    writeln!(w, "{}", line).map_err(|e| PropError::io(out, e))?;
                }
                *sentences.lock().unwrap_or_else(|e| e.into_inner()) += 1;
                let mut counts = counts.lock().unwrap_or_else(|e| e.into_inner());
                for hit in hits {
                    if let Some(c) = counts.get_mut(&hit) {
                        *c += 1;
                    }
                }
            }
            debug!("Finished {}", file.display());
            Ok(())
        })?;

        let counts = counts.lock().unwrap_or_else(|e| e.into_inner());
        active = counts
            .iter()
            .filter(|(_, c)| **c < config.max_count)
            .map(|(k, _)| k.clone())
            .collect();
        let uncovered = counts.values().filter(|&&c| c == 0).count();
        info!(
            "Batch complete; sentences so far: {}; uncovered keys: {} of {}",
            *sentences.lock().unwrap_or_else(|e| e.into_inner()),
            uncovered,
            counts.len()
        );
    }

    writer
        .into_inner()
        .unwrap_or_else(|e| e.into_inner())
        .flush()
        .map_err(|e| PropError::io(out, e))?;

    let counts = counts.into_inner().unwrap_or_else(|e| e.into_inner());
    let mut covered: Vec<String> = counts
        .iter()
        .filter(|(_, c)| **c > 0)
        .map(|(k, _)| k.clone())
        .collect();
    covered.sort();
    let uncovered = counts.len() - covered.len();

    Ok(SelectionResult {
        sentences: sentences.into_inner().unwrap_or_else(|e| e.into_inner()),
        covered,
        uncovered,
    })
}
