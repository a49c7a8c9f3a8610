//! Configuration for the expansion pipeline
//!
//! One TOML file (`phrasegraph.toml` by default) describes every stage:
//! - input and output locations per side
//! - feature extraction and graph construction parameters
//! - propagation algorithm and iteration count

mod pipeline_config;

pub use pipeline_config::{
    LabelGraphKind, PipelineConfig, Side, Stage, DEFAULT_CONFIG_FILE, EXAMPLE_CONFIG,
};
