//! Init command - write an example pipeline config

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use phrasegraph::config::EXAMPLE_CONFIG;

pub fn run(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!(
            "{} {} already exists (use --force to overwrite)",
            style("!").yellow(),
            style(path.display()).cyan()
        );
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{} Created {}", style("✓").green(), style(path.display()).cyan());
    println!(
        "  Edit the paths, then run {}",
        style("phrasegraph select-unlabeled").bold()
    );
    Ok(())
}
